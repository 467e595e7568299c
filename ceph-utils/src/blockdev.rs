// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Filesystem and mount lifecycle for a mapped block device.

use crate::executor::BoxedExecutor;
use crate::{ExecutionError, MKFS_XFS, MOUNT};
use camino::{Utf8Path, Utf8PathBuf};

/// Where a prepared block device is mounted for benchmarking.
pub const DEFAULT_MOUNT_POINT: &str = "/mnt/ceph-block-device";

/// Error returned by [BlockDevice::make_filesystem].
#[derive(thiserror::Error, Debug)]
#[error("Could not create filesystem on {device}: {err}")]
pub struct MakeFilesystemError {
    pub device: Utf8PathBuf,
    #[source]
    pub err: ExecutionError,
}

#[derive(thiserror::Error, Debug)]
pub enum MountErrorVariant {
    #[error("Failed to create mount point: {0}")]
    MountPoint(std::io::Error),
    #[error(transparent)]
    Execution(ExecutionError),
}

/// Error returned by [BlockDevice::mount].
#[derive(thiserror::Error, Debug)]
#[error("Could not mount {device} at {mount_point}: {err}")]
pub struct MountError {
    pub device: Utf8PathBuf,
    pub mount_point: Utf8PathBuf,
    #[source]
    pub err: MountErrorVariant,
}

/// Wraps the block-device lifecycle commands.
pub struct BlockDevice {}

impl BlockDevice {
    /// Creates an XFS filesystem on `device`, clobbering any existing one.
    pub fn make_filesystem(
        executor: &BoxedExecutor,
        device: &Utf8Path,
    ) -> Result<(), MakeFilesystemError> {
        let mut command = std::process::Command::new(MKFS_XFS);
        let cmd = command.args(["-f", device.as_str()]);
        executor.execute(cmd).map_err(|err| MakeFilesystemError {
            device: device.to_path_buf(),
            err,
        })?;
        Ok(())
    }

    /// Creates the mount point if needed and mounts `device` on it.
    pub fn mount(
        executor: &BoxedExecutor,
        device: &Utf8Path,
        mount_point: &Utf8Path,
    ) -> Result<(), MountError> {
        std::fs::create_dir_all(mount_point).map_err(|err| MountError {
            device: device.to_path_buf(),
            mount_point: mount_point.to_path_buf(),
            err: MountErrorVariant::MountPoint(err),
        })?;
        let mut command = std::process::Command::new(MOUNT);
        let cmd = command.args([device.as_str(), mount_point.as_str()]);
        executor.execute(cmd).map_err(|err| MountError {
            device: device.to_path_buf(),
            mount_point: mount_point.to_path_buf(),
            err: MountErrorVariant::Execution(err),
        })?;
        Ok(())
    }
}
