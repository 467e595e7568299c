// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Agent provisioning a Ceph client benchmarking node.
//!
//! The agent reacts to framework notifications (relation data changes,
//! configuration changes) and operator actions, one at a time: each handler
//! reads current relation state, optionally re-renders configuration, and
//! optionally invokes an external benchmarking tool, reporting the result
//! back through the action interface.

pub mod actions;
pub mod adapters;
pub mod agent;
pub mod config;
pub mod relations;
pub mod render;
pub mod state;
pub mod tls;

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::config::{Bindings, Config, NetworkBinding};
    use camino::Utf8Path;
    use slog::Drain;

    /// Creates a new terminal-based logger.
    pub fn log() -> slog::Logger {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog::LevelFilter(drain, slog::Level::Info).fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(drain, slog::o!())
    }

    /// An agent configuration rooted in a scratch directory.
    pub fn config(root: &Utf8Path) -> Config {
        Config {
            pool_name: "bench".to_string(),
            allowed_ips: vec![],
            config_root: root.join("etc/ceph"),
            trust_store_root: root.join("ca-certificates"),
            state_dir: root.join("lib/bench-agent"),
            mount_point: root.join("mnt/ceph-block-device"),
            bindings: Bindings {
                public: NetworkBinding {
                    ingress_address: "10.10.0.5".parse().unwrap(),
                    bind_address: "10.10.0.5".parse().unwrap(),
                },
                cluster: NetworkBinding {
                    ingress_address: "10.20.0.5".parse().unwrap(),
                    bind_address: "10.20.0.6".parse().unwrap(),
                },
            },
            hostname: Some("benchhost".to_string()),
            fqdn: Some("benchhost.example.com".to_string()),
        }
    }
}
