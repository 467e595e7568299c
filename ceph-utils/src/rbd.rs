// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities for managing and benchmarking RBD images.

use crate::executor::BoxedExecutor;
use crate::{stdout_string, ExecutionError, RBD};
use camino::Utf8PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CreateImageErrorVariant {
    /// The image is already present in the pool. Callers treat this as
    /// success-equivalent and continue.
    #[error("Image already exists")]
    AlreadyExists,
    #[error(transparent)]
    Other(ExecutionError),
}

/// Error returned by [Rbd::create_image].
#[derive(thiserror::Error, Debug)]
#[error("Could not create image {pool}/{image}: {err}")]
pub struct CreateImageError {
    pub pool: String,
    pub image: String,
    #[source]
    pub err: CreateImageErrorVariant,
}

/// Error returned by [Rbd::map_image].
#[derive(thiserror::Error, Debug)]
#[error("Could not map image {pool}/{image}: {err}")]
pub struct MapImageError {
    pub pool: String,
    pub image: String,
    #[source]
    pub err: ExecutionError,
}

/// Error returned by [Rbd::bench].
#[derive(thiserror::Error, Debug)]
#[error("Failed to run rbd bench against {pool}/{image}: {err}")]
pub struct BenchError {
    pub pool: String,
    pub image: String,
    #[source]
    pub err: ExecutionError,
}

/// Wraps commands issued through the `rbd` tool.
pub struct Rbd {}

impl Rbd {
    /// Creates an image in `pool`, sized in megabytes.
    ///
    /// Creation of an image which already exists is reported as
    /// [CreateImageErrorVariant::AlreadyExists]; the match is on the exact
    /// substring "already exists" in the tool's stderr.
    pub fn create_image(
        executor: &BoxedExecutor,
        client_id: &str,
        pool: &str,
        image: &str,
        size: &str,
    ) -> Result<(), CreateImageError> {
        let mut command = std::process::Command::new(RBD);
        let cmd = command
            .args(["--id", client_id, "-p", pool, "create", "--size", size, image]);
        executor.execute(cmd).map_err(|err| {
            let variant = match err {
                ExecutionError::CommandFailure(ref info)
                    if info.stderr.contains("already exists") =>
                {
                    CreateImageErrorVariant::AlreadyExists
                }
                _ => CreateImageErrorVariant::Other(err),
            };
            CreateImageError {
                pool: pool.to_string(),
                image: image.to_string(),
                err: variant,
            }
        })?;
        Ok(())
    }

    /// Maps an image to a local block device, returning the device path
    /// reported by the tool.
    pub fn map_image(
        executor: &BoxedExecutor,
        client_id: &str,
        pool: &str,
        image: &str,
    ) -> Result<Utf8PathBuf, MapImageError> {
        let mut command = std::process::Command::new(RBD);
        let cmd = command.args(["--id", client_id, "-p", pool, "map", image]);
        let output = executor.execute(cmd).map_err(|err| MapImageError {
            pool: pool.to_string(),
            image: image.to_string(),
            err,
        })?;
        let device = stdout_string(&output);
        if device.is_empty() {
            // Older tool versions print nothing; the kernel udev rules still
            // create the well-known alias.
            return Ok(Utf8PathBuf::from(format!("/dev/rbd/{pool}/{image}")));
        }
        Ok(Utf8PathBuf::from(device))
    }

    /// Runs `rbd bench` against a mapped image, returning captured stdout.
    pub fn bench(
        executor: &BoxedExecutor,
        client_id: &str,
        pool: &str,
        image: &str,
        io_type: &str,
    ) -> Result<String, BenchError> {
        let mut command = std::process::Command::new(RBD);
        let cmd = command.args([
            "--id",
            client_id,
            "bench",
            &format!("{pool}/{image}"),
            "--io-type",
            io_type,
        ]);
        let output = executor.execute(cmd).map_err(|err| BenchError {
            pool: pool.to_string(),
            image: image.to_string(),
            err,
        })?;
        Ok(stdout_string(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FakeExecutor, Input, Output, OutputExt, StaticHandler};
    use crate::testing::log;

    #[test]
    fn create_image_maps_already_exists() {
        let executor = FakeExecutor::new(log());
        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking -p bench create --size 1024 bench-image"
            )),
            Output::failure()
                .set_stderr("rbd: create error: (17) File exists: image already exists"),
        );
        handler.register(&executor);

        let err = Rbd::create_image(
            &(executor.as_executor()),
            "ceph-benchmarking",
            "bench",
            "bench-image",
            "1024",
        )
        .expect_err("create should fail");
        assert!(matches!(err.err, CreateImageErrorVariant::AlreadyExists));
    }

    #[test]
    fn create_image_other_failures_are_not_already_exists() {
        let executor = FakeExecutor::new(log());
        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking -p bench create --size 1024 bench-image"
            )),
            Output::failure().set_stderr("rbd: error opening pool 'bench'"),
        );
        handler.register(&executor);

        let err = Rbd::create_image(
            &(executor.as_executor()),
            "ceph-benchmarking",
            "bench",
            "bench-image",
            "1024",
        )
        .expect_err("create should fail");
        assert!(matches!(err.err, CreateImageErrorVariant::Other(_)));
    }

    #[test]
    fn map_image_returns_reported_device() {
        let executor = FakeExecutor::new(log());
        let mut handler = StaticHandler::new();
        handler.expect(
            Input::shell(format!(
                "{RBD} --id ceph-benchmarking -p bench map bench-image"
            )),
            Output::success().set_stdout("/dev/rbd0\n"),
        );
        handler.register(&executor);

        let device = Rbd::map_image(
            &(executor.as_executor()),
            "ceph-benchmarking",
            "bench",
            "bench-image",
        )
        .expect("map should succeed");
        assert_eq!(device, Utf8PathBuf::from("/dev/rbd0"));
    }

    #[test]
    fn map_image_falls_back_to_udev_alias() {
        let executor = FakeExecutor::new(log());
        let mut handler = StaticHandler::new();
        handler.expect_ok(format!(
            "{RBD} --id ceph-benchmarking -p bench map bench-image"
        ));
        handler.register(&executor);

        let device = Rbd::map_image(
            &(executor.as_executor()),
            "ceph-benchmarking",
            "bench",
            "bench-image",
        )
        .expect("map should succeed");
        assert_eq!(device, Utf8PathBuf::from("/dev/rbd/bench/bench-image"));
    }
}
