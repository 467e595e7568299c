// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Renders the Ceph client configuration artifacts.
//!
//! The artifact set is static and known at startup; every render pass
//! regenerates every artifact unconditionally, so a partially written set
//! left by a crash is overwritten wholesale by the next pass.

use crate::actions::BENCH_IMAGE;
use crate::adapters::{
    CephClientAdapter, ClusterPeerAdapter, TlsCertificatesAdapter,
};
use crate::agent::client_id;
use crate::config::Config;
use crate::relations::Relations;
use camino::Utf8PathBuf;
use slog::{info, Logger};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::os::unix::fs::DirBuilderExt;

/// Operator-supplied parameters attached to the render context for the
/// duration of one action.
///
/// Keys are normalized on insert: hyphens become underscores. The resolved
/// pool name (explicit parameter or configured default) is always present.
#[derive(Clone, Debug, Default)]
pub struct ActionParams {
    values: BTreeMap<String, String>,
}

impl ActionParams {
    pub fn new(pool_name: &str) -> Self {
        let mut params = Self::default();
        params.insert("pool-name", pool_name);
        params
    }

    pub fn insert<V: Into<String>>(&mut self, key: &str, value: V) {
        self.values.insert(key.replace('-', "_"), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn pool_name(&self) -> &str {
        self.get("pool_name").expect("pool name is always resolved")
    }
}

/// The symbolic-name-to-adapter mapping templates render against, plus the
/// optional per-action parameters. Constructed fresh per render call.
pub struct RenderContext<'a> {
    pub ceph_client: CephClientAdapter<'a>,
    pub cluster: ClusterPeerAdapter<'a>,
    pub certificates: TlsCertificatesAdapter<'a>,
    pub action: Option<&'a ActionParams>,
}

impl<'a> RenderContext<'a> {
    pub fn new(relations: &'a Relations, config: &'a Config) -> Self {
        Self {
            ceph_client: CephClientAdapter::new(&relations.ceph_client),
            cluster: ClusterPeerAdapter::new(
                &relations.cluster,
                &config.allowed_ips,
            ),
            certificates: TlsCertificatesAdapter::new(&relations.certificates),
            action: None,
        }
    }

    pub fn with_action(mut self, params: &'a ActionParams) -> Self {
        self.action = Some(params);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    CephConf,
    Keyring,
    RbdFio,
}

/// One rendered file, mapped to the services which would need restarting
/// if it changed.
pub struct ConfigArtifact {
    pub kind: ArtifactKind,
    pub path: Utf8PathBuf,
    pub restart_services: &'static [&'static str],
}

// There are no services to restart, but the mapping keeps the rendering
// shape consistent with agents that do have them.
const BENCHMARK_SERVICES: &[&str] = &[];

pub fn config_artifacts(config: &Config) -> Vec<ConfigArtifact> {
    vec![
        ConfigArtifact {
            kind: ArtifactKind::CephConf,
            path: config.ceph_conf(),
            restart_services: BENCHMARK_SERVICES,
        },
        ConfigArtifact {
            kind: ArtifactKind::Keyring,
            path: config.keyring(),
            restart_services: BENCHMARK_SERVICES,
        },
        ConfigArtifact {
            kind: ArtifactKind::RbdFio,
            path: config.rbd_fio(),
            restart_services: BENCHMARK_SERVICES,
        },
    ]
}

/// Whether a render pass ran or was deferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Render {
    Rendered,
    /// The ceph-client relation has not reported pools available; nothing
    /// was written and the triggering event should be redelivered.
    Deferred,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to create config directory {path}: {err}")]
    ConfigDir {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to write {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Renders every configured artifact, or defers when pools are not yet
/// available.
pub fn render_config(
    log: &Logger,
    config: &Config,
    ctx: &RenderContext<'_>,
) -> Result<Render, RenderError> {
    if !ctx.ceph_client.pools_available() {
        info!(log, "Deferring config render; pools not available");
        return Ok(Render::Deferred);
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true).mode(0o750);
    builder.create(&config.config_root).map_err(|err| {
        RenderError::ConfigDir { path: config.config_root.clone(), err }
    })?;

    info!(log, "Rendering config");
    for artifact in config_artifacts(config) {
        let contents = match artifact.kind {
            ArtifactKind::CephConf => render_ceph_conf(config, ctx),
            ArtifactKind::Keyring => render_keyring(ctx),
            ArtifactKind::RbdFio => render_rbd_fio(config, ctx),
        };
        std::fs::write(&artifact.path, contents).map_err(|err| {
            RenderError::Io { path: artifact.path.clone(), err }
        })?;
    }
    Ok(Render::Rendered)
}

fn render_ceph_conf(config: &Config, ctx: &RenderContext<'_>) -> String {
    let mut out = String::new();
    writeln!(out, "[global]").unwrap();
    writeln!(out, "auth supported = {}", ctx.ceph_client.auth_supported())
        .unwrap();
    writeln!(out, "mon host = {}", ctx.ceph_client.mon_hosts()).unwrap();
    writeln!(
        out,
        "keyring = {}/$cluster.$name.keyring",
        config.config_root
    )
    .unwrap();
    out
}

fn render_keyring(ctx: &RenderContext<'_>) -> String {
    let mut out = String::new();
    writeln!(out, "[{}]", crate::agent::CLIENT_NAME).unwrap();
    writeln!(out, "\tkey = {}", ctx.ceph_client.key()).unwrap();
    out
}

fn render_rbd_fio<'a>(config: &'a Config, ctx: &RenderContext<'a>) -> String {
    let action = ctx.action;
    let get = |key: &str| -> Option<&'a str> {
        action.and_then(|params| params.get(key))
    };
    let operation = get("operation").unwrap_or("write");
    let block_size = get("block_size").unwrap_or("4k");
    let pool = get("pool_name").unwrap_or(&config.pool_name);

    let mut out = String::new();
    writeln!(out, "[global]").unwrap();
    if let Some(disk_dev) = get("disk_dev") {
        writeln!(out, "ioengine=libaio").unwrap();
        writeln!(out, "filename={disk_dev}").unwrap();
        writeln!(out, "direct=1").unwrap();
        writeln!(out, "rw={operation}").unwrap();
        writeln!(out, "bs={block_size}").unwrap();
        writeln!(out, "[device_iodepth32]").unwrap();
        writeln!(out, "iodepth=32").unwrap();
    } else {
        let client_name = get("client_name").unwrap_or_else(|| client_id());
        let image = get("image_name").unwrap_or(BENCH_IMAGE);
        writeln!(out, "ioengine=rbd").unwrap();
        writeln!(out, "clientname={client_name}").unwrap();
        writeln!(out, "pool={pool}").unwrap();
        writeln!(out, "rbdname={image}").unwrap();
        writeln!(out, "invalidate=0").unwrap();
        writeln!(out, "rw={operation}").unwrap();
        writeln!(out, "bs={block_size}").unwrap();
        writeln!(out, "[rbd_iodepth32]").unwrap();
        writeln!(out, "iodepth=32").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relations::CephClientRelation;
    use crate::test_utils::{config as test_config, log};
    use std::os::unix::fs::PermissionsExt;

    fn ready_relations() -> Relations {
        Relations {
            ceph_client: CephClientRelation {
                pools_available: true,
                auth: Some("cephx".to_string()),
                key: Some("AQBsvpNh==".to_string()),
                mon_hosts: vec![
                    "10.0.0.2".to_string(),
                    "10.0.0.1".to_string(),
                ],
            },
            ..Default::default()
        }
    }

    #[test]
    fn render_defers_without_pools_and_writes_nothing() {
        let log = log();
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        let relations = Relations::default();
        let ctx = RenderContext::new(&relations, &config);

        let render = render_config(&log, &config, &ctx).unwrap();
        assert_eq!(render, Render::Deferred);
        assert!(!config.config_root.exists());
        assert!(!config.ceph_conf().exists());
    }

    #[test]
    fn render_writes_every_artifact_with_config_dir_mode() {
        let log = log();
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        let relations = ready_relations();
        let ctx = RenderContext::new(&relations, &config);

        let render = render_config(&log, &config, &ctx).unwrap();
        assert_eq!(render, Render::Rendered);

        for artifact in config_artifacts(&config) {
            assert!(
                artifact.path.is_file(),
                "missing artifact {}",
                artifact.path
            );
        }
        let mode = std::fs::metadata(&config.config_root)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn ceph_conf_renders_sorted_mon_hosts() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        let relations = ready_relations();
        let ctx = RenderContext::new(&relations, &config);

        let conf = render_ceph_conf(&config, &ctx);
        assert!(conf.contains("auth supported = cephx"));
        assert!(conf.contains("mon host = 10.0.0.1 10.0.0.2"));
        assert!(conf.contains("$cluster.$name.keyring"));
    }

    #[test]
    fn keyring_renders_client_stanza() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        let relations = ready_relations();
        let ctx = RenderContext::new(&relations, &config);

        let keyring = render_keyring(&ctx);
        assert!(keyring.starts_with("[client.ceph-benchmarking]\n"));
        assert!(keyring.contains("\tkey = AQBsvpNh=="));
    }

    #[test]
    fn rbd_fio_defaults_target_the_rbd_engine() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        let relations = ready_relations();
        let ctx = RenderContext::new(&relations, &config);

        let job = render_rbd_fio(&config, &ctx);
        assert!(job.contains("ioengine=rbd"));
        assert!(job.contains("clientname=ceph-benchmarking"));
        assert!(job.contains("pool=bench"));
        assert!(job.contains("rbdname=bench-image"));
        assert!(job.contains("rw=write"));
    }

    #[test]
    fn rbd_fio_action_params_override_defaults() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        let relations = ready_relations();

        let mut params = ActionParams::new("otherpool");
        params.insert("operation", "randread");
        params.insert("block-size", "64k");
        let ctx = RenderContext::new(&relations, &config).with_action(&params);

        let job = render_rbd_fio(&config, &ctx);
        assert!(job.contains("pool=otherpool"));
        assert!(job.contains("rw=randread"));
        assert!(job.contains("bs=64k"));
    }

    #[test]
    fn rbd_fio_disk_dev_switches_to_raw_device() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        let relations = ready_relations();

        let mut params = ActionParams::new("bench");
        params.insert("disk-dev", "/dev/vdb");
        let ctx = RenderContext::new(&relations, &config).with_action(&params);

        let job = render_rbd_fio(&config, &ctx);
        assert!(job.contains("ioengine=libaio"));
        assert!(job.contains("filename=/dev/vdb"));
        assert!(!job.contains("ioengine=rbd"));
    }

    #[test]
    fn action_params_normalize_hyphens() {
        let mut params = ActionParams::new("bench");
        params.insert("image-size", "2048");
        assert_eq!(params.get("image_size"), Some("2048"));
        assert_eq!(params.pool_name(), "bench");
    }
}
