// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only computed views over relation state, composed into the render
//! context.
//!
//! These are pure projections: host and address lists come back sorted and
//! space-joined so rendered configuration is stable regardless of the order
//! the framework delivered them in.

use crate::relations::{
    CephClientRelation, CertificatesRelation, ClusterRelation,
};

fn join_sorted<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut items: Vec<String> =
        items.into_iter().map(|s| s.as_ref().to_string()).collect();
    items.sort();
    items.join(" ")
}

/// View over the ceph-client relation.
pub struct CephClientAdapter<'a> {
    relation: &'a CephClientRelation,
}

impl<'a> CephClientAdapter<'a> {
    pub fn new(relation: &'a CephClientRelation) -> Self {
        Self { relation }
    }

    pub fn pools_available(&self) -> bool {
        self.relation.pools_available
    }

    /// Monitor hosts, sorted and space-joined.
    pub fn mon_hosts(&self) -> String {
        join_sorted(&self.relation.mon_hosts)
    }

    /// The negotiated auth mode; meaningful once pools are available.
    pub fn auth_supported(&self) -> &str {
        self.relation.auth.as_deref().unwrap_or_default()
    }

    /// The client key; meaningful once pools are available.
    pub fn key(&self) -> &str {
        self.relation.key.as_deref().unwrap_or_default()
    }
}

/// View over the peer relation.
pub struct ClusterPeerAdapter<'a> {
    relation: &'a ClusterRelation,
    allowed_ips: &'a [String],
}

impl<'a> ClusterPeerAdapter<'a> {
    pub fn new(relation: &'a ClusterRelation, allowed_ips: &'a [String]) -> Self {
        Self { relation, allowed_ips }
    }

    /// Peer addresses, sorted and space-joined.
    pub fn gw_hosts(&self) -> String {
        join_sorted(&self.relation.peer_addresses)
    }

    /// Locally allowed IPs plus peer addresses, sorted and space-joined.
    pub fn trusted_ips(&self) -> String {
        let mut ips: Vec<String> = self.allowed_ips.to_vec();
        ips.extend(self.relation.peer_addresses.iter().cloned());
        join_sorted(ips)
    }
}

/// View over the certificates relation.
pub struct TlsCertificatesAdapter<'a> {
    relation: &'a CertificatesRelation,
}

impl<'a> TlsCertificatesAdapter<'a> {
    pub fn new(relation: &'a CertificatesRelation) -> Self {
        Self { relation }
    }

    /// True iff an application certificate is currently present. A CA
    /// client that cannot answer reads as "TLS off", never as an error.
    pub fn enable_tls(&self) -> bool {
        self.relation.application_certificate().is_ok()
    }
}
