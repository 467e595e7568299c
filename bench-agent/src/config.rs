// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for working with the agent configuration.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::net::IpAddr;

/// Addresses of one named network binding.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkBinding {
    pub ingress_address: IpAddr,
    pub bind_address: IpAddr,
}

/// The two bindings whose addresses end up in the certificate request.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Bindings {
    pub public: NetworkBinding,
    pub cluster: NetworkBinding,
}

/// Configuration for the benchmarking agent.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Pool benchmarked by every action unless overridden per-invocation.
    #[serde(default = "default_pool_name")]
    pub pool_name: String,

    /// Locally configured addresses merged into the trusted IP list.
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Root of the rendered Ceph configuration.
    #[serde(default = "default_config_root")]
    pub config_root: Utf8PathBuf,

    /// Where the CA certificate lands so the system trust store picks it up.
    #[serde(default = "default_trust_store_root")]
    pub trust_store_root: Utf8PathBuf,

    /// Relation snapshot, request outbox, and persisted state live here.
    #[serde(default = "default_state_dir")]
    pub state_dir: Utf8PathBuf,

    /// Where the prepared block device is mounted for benchmarking.
    #[serde(default = "default_mount_point")]
    pub mount_point: Utf8PathBuf,

    pub bindings: Bindings,

    /// Overrides the detected hostname.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Overrides the FQDN used as the certificate common name; defaults to
    /// the hostname.
    #[serde(default)]
    pub fqdn: Option<String>,
}

fn default_pool_name() -> String {
    "bench".to_string()
}

fn default_config_root() -> Utf8PathBuf {
    Utf8PathBuf::from("/etc/ceph")
}

fn default_trust_store_root() -> Utf8PathBuf {
    Utf8PathBuf::from("/usr/local/share/ca-certificates")
}

fn default_state_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("/var/lib/bench-agent")
}

fn default_mount_point() -> Utf8PathBuf {
    Utf8PathBuf::from(ceph_utils::blockdev::DEFAULT_MOUNT_POINT)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config from {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to parse config from {path}: {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}

impl Config {
    pub fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Io { path: path.into(), err })?;
        let config = toml::from_str(&contents)
            .map_err(|err| ConfigError::Parse { path: path.into(), err })?;
        Ok(config)
    }

    pub fn ceph_conf(&self) -> Utf8PathBuf {
        self.config_root.join("ceph.conf")
    }

    pub fn keyring(&self) -> Utf8PathBuf {
        self.config_root
            .join(format!("ceph.{}.keyring", crate::agent::CLIENT_NAME))
    }

    pub fn rbd_fio(&self) -> Utf8PathBuf {
        self.config_root.join("rbd.fio")
    }

    pub fn tls_key(&self) -> Utf8PathBuf {
        self.config_root.join("ceph-benchmarking.key")
    }

    pub fn tls_pub_key(&self) -> Utf8PathBuf {
        self.config_root.join("ceph-benchmarking-pub.key")
    }

    pub fn tls_cert(&self) -> Utf8PathBuf {
        self.config_root.join("ceph-benchmarking.crt")
    }

    pub fn tls_key_and_cert(&self) -> Utf8PathBuf {
        self.config_root.join("ceph-benchmarking.pem")
    }

    pub fn tls_ca_cert(&self) -> Utf8PathBuf {
        self.trust_store_root.join("vault_ca_cert.crt")
    }

    pub fn relation_store(&self) -> Utf8PathBuf {
        self.state_dir.join("relations.json")
    }

    pub fn outbox(&self) -> Utf8PathBuf {
        self.state_dir.join("requests.json")
    }

    pub fn ledger_paths(&self) -> Vec<Utf8PathBuf> {
        vec![self.state_dir.join("state.json")]
    }
}
