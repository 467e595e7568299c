// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Operator-invoked benchmarking actions.
//!
//! Every action resolves its effective pool name (explicit parameter over
//! configured default), optionally runs the block-device prepare sequence,
//! invokes one external tool, and reports the tool's captured output. A
//! failure anywhere is terminal for the action; the operator re-runs it.

use crate::agent::{client_id, BenchAgent};
use crate::render::ActionParams;
use camino::Utf8PathBuf;
use ceph_utils::blockdev::BlockDevice;
use ceph_utils::fio::Fio;
use ceph_utils::rados::{BenchOperation, Rados};
use ceph_utils::rbd::{CreateImageErrorVariant, Rbd};
use serde::Serialize;
use slog::info;

/// The block image every device-backed benchmark runs against.
pub const BENCH_IMAGE: &str = "bench-image";

/// Image size in megabytes, unless overridden per-invocation.
pub const DEFAULT_IMAGE_SIZE: &str = "1024";

#[derive(Clone, Debug)]
pub struct RadosBenchAction {
    pub operation: BenchOperation,
    pub seconds: u32,
    pub pool_name: Option<String>,
    pub switches: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RbdBenchAction {
    pub operation: String,
    pub pool_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct FioAction {
    pub operation: Option<String>,
    pub disk_dev: Option<String>,
    pub pool_name: Option<String>,
    pub image_size: Option<String>,
    /// Additional job-file keys, passed through with hyphen normalization.
    pub extra: Vec<(String, String)>,
}

#[derive(Debug)]
pub enum Action {
    RadosBench(RadosBenchAction),
    RbdBench(RbdBenchAction),
    Fio(FioAction),
}

/// A successful action result: the tool's captured stdout.
#[derive(Debug, Serialize)]
pub struct ActionOutput {
    pub stdout: String,
}

/// A failed action: captured stderr and a fixed error code.
#[derive(Debug, Serialize, thiserror::Error)]
#[error("action failed (code {code}): {stderr}")]
pub struct ActionFailed {
    pub stderr: String,
    pub code: String,
}

impl BenchAgent {
    /// Runs one operator action to completion.
    pub fn run_action(
        &mut self,
        action: Action,
    ) -> Result<ActionOutput, ActionFailed> {
        match action {
            Action::RadosBench(params) => self.run_rados_bench(params),
            Action::RbdBench(params) => self.run_rbd_bench(params),
            Action::Fio(params) => self.run_fio(params),
        }
    }

    fn resolve_pool(&self, pool_name: Option<String>) -> String {
        pool_name.unwrap_or_else(|| self.config.pool_name.clone())
    }

    fn run_rados_bench(
        &mut self,
        params: RadosBenchAction,
    ) -> Result<ActionOutput, ActionFailed> {
        let pool = self.resolve_pool(params.pool_name);
        let stdout = Rados::bench(
            &self.executor,
            client_id(),
            &pool,
            params.seconds,
            params.operation,
            params.switches.as_deref(),
        )
        .map_err(|err| {
            self.fail_action(format!(
                "rados bench failed: {}",
                err.err.stderr()
            ))
        })?;
        Ok(ActionOutput { stdout })
    }

    fn run_rbd_bench(
        &mut self,
        params: RbdBenchAction,
    ) -> Result<ActionOutput, ActionFailed> {
        let pool = self.resolve_pool(params.pool_name);
        self.prepare_block_device(&pool, DEFAULT_IMAGE_SIZE)?;
        let stdout = Rbd::bench(
            &self.executor,
            client_id(),
            &pool,
            BENCH_IMAGE,
            &params.operation,
        )
        .map_err(|err| {
            self.fail_action(format!(
                "rbd bench failed: {}",
                err.err.stderr()
            ))
        })?;
        Ok(ActionOutput { stdout })
    }

    fn run_fio(
        &mut self,
        params: FioAction,
    ) -> Result<ActionOutput, ActionFailed> {
        let pool = self.resolve_pool(params.pool_name);

        let mut action_params = ActionParams::new(&pool);
        action_params.insert("client-name", client_id());
        if let Some(operation) = &params.operation {
            action_params.insert("operation", operation.clone());
        }
        for (key, value) in &params.extra {
            action_params.insert(key, value.clone());
        }

        match &params.disk_dev {
            Some(disk_dev) => {
                action_params.insert("disk-dev", disk_dev.clone());
            }
            None => {
                let image_size = params
                    .image_size
                    .as_deref()
                    .unwrap_or(DEFAULT_IMAGE_SIZE);
                self.prepare_block_device(&pool, image_size)?;
                action_params.insert("image-name", BENCH_IMAGE);
            }
        }

        match self.render_config(Some(&action_params)) {
            Ok(crate::agent::Outcome::Handled) => {}
            Ok(crate::agent::Outcome::Deferred) => {
                return Err(self.fail_action(
                    "Ceph pools are not available; cannot render fio job"
                        .to_string(),
                ));
            }
            Err(err) => {
                return Err(
                    self.fail_action(format!("fio config render failed: {err}"))
                );
            }
        }

        let stdout = Fio::run(&self.executor, &self.config.rbd_fio())
            .map_err(|err| {
                self.fail_action(format!("fio failed: {}", err.err.stderr()))
            })?;
        Ok(ActionOutput { stdout })
    }

    /// The composite prepare sequence: create the image (tolerating one
    /// that already exists), map it, create a filesystem, and mount it.
    /// The first unrecovered failure aborts the whole action.
    fn prepare_block_device(
        &mut self,
        pool: &str,
        image_size: &str,
    ) -> Result<Utf8PathBuf, ActionFailed> {
        match Rbd::create_image(
            &self.executor,
            client_id(),
            pool,
            BENCH_IMAGE,
            image_size,
        ) {
            Ok(()) => {}
            Err(err) => match err.err {
                CreateImageErrorVariant::AlreadyExists => {
                    info!(
                        self.log,
                        "Image already exists; continuing";
                        "image" => BENCH_IMAGE
                    );
                }
                CreateImageErrorVariant::Other(exec_err) => {
                    return Err(self.fail_action(format!(
                        "create image failed: {}",
                        exec_err.stderr()
                    )));
                }
            },
        }

        let device = Rbd::map_image(
            &self.executor,
            client_id(),
            pool,
            BENCH_IMAGE,
        )
        .map_err(|err| {
            self.fail_action(format!(
                "map image failed: {}",
                err.err.stderr()
            ))
        })?;

        BlockDevice::make_filesystem(&self.executor, &device).map_err(
            |err| {
                self.fail_action(format!(
                    "mkfs failed: {}",
                    err.err.stderr()
                ))
            },
        )?;

        let mount_point = self.config.mount_point.clone();
        BlockDevice::mount(&self.executor, &device, &mount_point).map_err(
            |err| self.fail_action(format!("mount failed: {err}")),
        )?;

        if !self.ledger.data().target_created {
            self.ledger.data_mut().target_created = true;
            self.ledger.commit().map_err(|err| {
                self.fail_action(format!(
                    "failed to record target creation: {err}"
                ))
            })?;
        }
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::relations::{CephClientRelation, Relations};
    use crate::test_utils::{config as test_config, log};
    use ceph_utils::executor::{
        FakeExecutor, Input, Output, OutputExt, StaticHandler,
    };
    use ceph_utils::{FIO, MKFS_XFS, MOUNT, RADOS, RBD, SYSTEMD_DETECT_VIRT};

    fn write_relations(config: &Config, relations: &Relations) {
        let path = config.relation_store();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string(relations).unwrap())
            .unwrap();
    }

    fn ready_relations() -> Relations {
        Relations {
            ceph_client: CephClientRelation {
                pools_available: true,
                auth: Some("cephx".to_string()),
                key: Some("AQBsvpNh==".to_string()),
                mon_hosts: vec!["10.0.0.1".to_string()],
            },
            ..Default::default()
        }
    }

    fn agent_with_handler(
        config: &Config,
        handler: StaticHandler,
    ) -> BenchAgent {
        let executor = FakeExecutor::new(ceph_utils::testing::log());
        handler.register(&executor);
        BenchAgent::new(log(), config.clone(), executor.as_executor()).unwrap()
    }

    #[test]
    fn rados_bench_action_returns_tool_output() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        write_relations(&config, &ready_relations());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell(format!(
                "{RADOS} --id ceph-benchmarking -p bench bench 30 write"
            )),
            Output::success().set_stdout("Total time run: 30.01"),
        );
        let mut agent = agent_with_handler(&config, handler);

        let result = agent
            .run_action(Action::RadosBench(RadosBenchAction {
                operation: BenchOperation::Write,
                seconds: 30,
                pool_name: None,
                switches: None,
            }))
            .expect("action should succeed");
        assert_eq!(result.stdout, "Total time run: 30.01");
    }

    #[test]
    fn rados_bench_failure_surfaces_stderr_and_code() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        write_relations(&config, &ready_relations());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell(format!(
                "{RADOS} --id ceph-benchmarking -p bench bench 30 write"
            )),
            Output::failure().set_stderr("couldn't connect to cluster"),
        );
        let mut agent = agent_with_handler(&config, handler);

        let err = agent
            .run_action(Action::RadosBench(RadosBenchAction {
                operation: BenchOperation::Write,
                seconds: 30,
                pool_name: None,
                switches: None,
            }))
            .expect_err("action should fail");
        assert_eq!(err.code, "1");
        assert!(err.stderr.contains("couldn't connect to cluster"));
    }

    #[test]
    fn explicit_pool_name_overrides_configured_default() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        write_relations(&config, &ready_relations());

        let mut handler = StaticHandler::new();
        handler.expect_ok(format!(
            "{RADOS} --id ceph-benchmarking -p otherpool bench 10 seq"
        ));
        let mut agent = agent_with_handler(&config, handler);

        agent
            .run_action(Action::RadosBench(RadosBenchAction {
                operation: BenchOperation::Seq,
                seconds: 10,
                pool_name: Some("otherpool".to_string()),
                switches: None,
            }))
            .expect("action should succeed");
    }

    #[test]
    fn rbd_bench_tolerates_existing_image() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        write_relations(&config, &ready_relations());

        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking -p bench create --size 1024 {BENCH_IMAGE}"
            )),
            Output::failure().set_stderr("rbd: image already exists"),
        );
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking -p bench map {BENCH_IMAGE}"
            )),
            Output::success().set_stdout("/dev/rbd0\n"),
        );
        handler.expect_ok(format!("{MKFS_XFS} -f /dev/rbd0"));
        handler.expect_ok(format!(
            "{MOUNT} /dev/rbd0 {}",
            config.mount_point
        ));
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking bench bench/{BENCH_IMAGE} --io-type write"
            )),
            Output::success().set_stdout("elapsed: 10"),
        );
        let mut agent = agent_with_handler(&config, handler);

        let result = agent
            .run_action(Action::RbdBench(RbdBenchAction {
                operation: "write".to_string(),
                pool_name: None,
            }))
            .expect("action should succeed");
        assert_eq!(result.stdout, "elapsed: 10");
        assert!(agent.ledger.data().target_created);
    }

    #[test]
    fn prepare_aborts_before_mapping_on_other_create_failure() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        write_relations(&config, &ready_relations());

        // Only the create is expected; the handler panics on any further
        // command, proving the sequence aborted before the map step.
        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking -p bench create --size 1024 {BENCH_IMAGE}"
            )),
            Output::failure().set_stderr("rbd: error opening pool 'bench'"),
        );
        let mut agent = agent_with_handler(&config, handler);

        let err = agent
            .run_action(Action::RbdBench(RbdBenchAction {
                operation: "write".to_string(),
                pool_name: None,
            }))
            .expect_err("action should fail");
        assert!(err.stderr.contains("error opening pool"));
        assert!(!agent.ledger.data().target_created);
    }

    #[test]
    fn fio_without_disk_prepares_renders_and_runs_in_order() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        write_relations(&config, &ready_relations());

        let mut handler = StaticHandler::new();
        handler.expect_ok(format!(
            "{RBD} --id ceph-benchmarking -p bench create --size 2048 {BENCH_IMAGE}"
        ));
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking -p bench map {BENCH_IMAGE}"
            )),
            Output::success().set_stdout("/dev/rbd0\n"),
        );
        handler.expect_ok(format!("{MKFS_XFS} -f /dev/rbd0"));
        handler.expect_ok(format!(
            "{MOUNT} /dev/rbd0 {}",
            config.mount_point
        ));
        // Post-render status probe.
        handler.expect_fail(format!(
            "{SYSTEMD_DETECT_VIRT} --quiet --container"
        ));
        handler.expect(
            Input::shell(format!("{FIO} {}", config.rbd_fio())),
            Output::success().set_stdout("rbd_iodepth32: io=1024MB"),
        );
        let mut agent = agent_with_handler(&config, handler);

        let result = agent
            .run_action(Action::Fio(FioAction {
                operation: Some("randwrite".to_string()),
                image_size: Some("2048".to_string()),
                ..Default::default()
            }))
            .expect("action should succeed");
        assert_eq!(result.stdout, "rbd_iodepth32: io=1024MB");

        let job = std::fs::read_to_string(config.rbd_fio()).unwrap();
        assert!(job.contains("ioengine=rbd"));
        assert!(job.contains(&format!("rbdname={BENCH_IMAGE}")));
        assert!(job.contains("clientname=ceph-benchmarking"));
        assert!(job.contains("rw=randwrite"));
    }

    #[test]
    fn fio_with_disk_dev_skips_prepare() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        write_relations(&config, &ready_relations());

        let mut handler = StaticHandler::new();
        handler.expect_fail(format!(
            "{SYSTEMD_DETECT_VIRT} --quiet --container"
        ));
        handler.expect(
            Input::shell(format!("{FIO} {}", config.rbd_fio())),
            Output::success().set_stdout("device_iodepth32: io=512MB"),
        );
        let mut agent = agent_with_handler(&config, handler);

        let result = agent
            .run_action(Action::Fio(FioAction {
                disk_dev: Some("/dev/vdb".to_string()),
                ..Default::default()
            }))
            .expect("action should succeed");
        assert_eq!(result.stdout, "device_iodepth32: io=512MB");

        let job = std::fs::read_to_string(config.rbd_fio()).unwrap();
        assert!(job.contains("ioengine=libaio"));
        assert!(job.contains("filename=/dev/vdb"));
        assert!(!agent.ledger.data().target_created);
    }

    #[test]
    fn fio_fails_cleanly_when_pools_unavailable() {
        let scratch = camino_tempfile::tempdir().unwrap();
        let config = test_config(scratch.path());
        // No relation data at all: pools are unavailable.

        let handler = StaticHandler::new();
        let mut agent = agent_with_handler(&config, handler);

        let err = agent
            .run_action(Action::Fio(FioAction {
                disk_dev: Some("/dev/vdb".to_string()),
                ..Default::default()
            }))
            .expect_err("action should fail");
        assert_eq!(err.code, "1");
        assert!(err.stderr.contains("pools are not available"));
    }
}
