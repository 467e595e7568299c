// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Locally-observed state of the three external relations, and the outbox
//! of requests the agent issues back over them.
//!
//! The surrounding framework maintains the relation snapshot document and
//! transmits whatever lands in the outbox; this module only reads the
//! former and appends to the latter.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse {path}: {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: serde_json::Error,
    },
    #[error("Failed to write {path}: {err}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Facts delivered over the ceph-client relation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CephClientRelation {
    /// Set once the cluster has processed our broker requests.
    #[serde(default)]
    pub pools_available: bool,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub mon_hosts: Vec<String>,
}

/// Facts delivered over the peer relation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterRelation {
    #[serde(default)]
    pub peer_addresses: Vec<String>,
}

/// The certificate relation could not answer; readers degrade rather than
/// propagate this.
#[derive(Debug, thiserror::Error)]
#[error("CA relation has not provided the {0} yet")]
pub struct CaClientError(pub &'static str);

/// Facts delivered over the certificates relation, all PEM strings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CertificatesRelation {
    #[serde(default)]
    pub application_key: Option<String>,
    #[serde(default)]
    pub application_certificate: Option<String>,
    #[serde(default)]
    pub ca_certificate: Option<String>,
}

impl CertificatesRelation {
    pub fn application_key(&self) -> Result<&str, CaClientError> {
        self.application_key
            .as_deref()
            .ok_or(CaClientError("application key"))
    }

    pub fn application_certificate(&self) -> Result<&str, CaClientError> {
        self.application_certificate
            .as_deref()
            .ok_or(CaClientError("application certificate"))
    }

    pub fn ca_certificate(&self) -> Result<&str, CaClientError> {
        self.ca_certificate
            .as_deref()
            .ok_or(CaClientError("CA certificate"))
    }
}

/// Snapshot of everything currently known from the three relations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Relations {
    #[serde(default)]
    pub ceph_client: CephClientRelation,
    #[serde(default)]
    pub cluster: ClusterRelation,
    #[serde(default)]
    pub certificates: CertificatesRelation,
}

impl Relations {
    /// Loads the relation snapshot; a missing document reads as "nothing
    /// delivered yet".
    pub fn load(path: &Utf8Path) -> Result<Self, StoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Relations::default());
            }
            Err(err) => {
                return Err(StoreError::Io { path: path.into(), err });
            }
        };
        serde_json::from_str(&contents)
            .map_err(|err| StoreError::Parse { path: path.into(), err })
    }
}

/// A single request to the Ceph broker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum BrokerRequest {
    CreatePool { name: String, replicas: u8 },
    SetKeyPermissions { client: String, permissions: Vec<String> },
    SetOsdSettings { settings: BTreeMap<String, u32> },
}

/// An application certificate request to the CA.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CertificateRequest {
    pub common_name: String,
    pub sans: Vec<String>,
}

/// Requests accumulated for the framework to transmit over the relations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Outbox {
    #[serde(default)]
    pub broker_requests: Vec<BrokerRequest>,
    #[serde(default)]
    pub certificate_request: Option<CertificateRequest>,
    /// Set once configuration has rendered, telling peers this unit is
    /// ready to take part in benchmarking.
    #[serde(default)]
    pub announce_ready: bool,
}

impl Outbox {
    pub fn load(path: &Utf8Path) -> Result<Self, StoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Outbox::default());
            }
            Err(err) => {
                return Err(StoreError::Io { path: path.into(), err });
            }
        };
        serde_json::from_str(&contents)
            .map_err(|err| StoreError::Parse { path: path.into(), err })
    }

    pub fn commit(&self, path: &Utf8Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| StoreError::Write { path: path.into(), err })?;
        }
        let contents = serde_json::to_string_pretty(self)
            .expect("outbox always serializes");
        std::fs::write(path, contents)
            .map_err(|err| StoreError::Write { path: path.into(), err })
    }

    pub fn request_create_pool(&mut self, name: &str) {
        self.broker_requests.push(BrokerRequest::CreatePool {
            name: name.to_string(),
            replicas: 3,
        });
    }

    pub fn request_ceph_permissions(
        &mut self,
        client: &str,
        permissions: &[&str],
    ) {
        self.broker_requests.push(BrokerRequest::SetKeyPermissions {
            client: client.to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        });
    }

    pub fn request_osd_settings(&mut self, settings: BTreeMap<String, u32>) {
        self.broker_requests.push(BrokerRequest::SetOsdSettings { settings });
    }

    pub fn request_application_certificate(
        &mut self,
        common_name: &str,
        sans: Vec<String>,
    ) {
        self.certificate_request = Some(CertificateRequest {
            common_name: common_name.to_string(),
            sans,
        });
    }
}
