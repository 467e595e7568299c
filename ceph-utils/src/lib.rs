// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wrappers around the Ceph client and benchmarking command-line tools.
//!
//! Every invocation is synchronous and blocking with no caller-side
//! timeout; a hung tool hangs the caller until it exits.

pub mod blockdev;
pub mod executor;
pub mod fio;
pub mod host;
pub mod rados;
pub mod rbd;

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use slog::{o, Discard, Logger};

    /// A logger which throws everything away; command traffic in tests is
    /// asserted through the fake executor, not the log.
    pub fn log() -> Logger {
        Logger::root(Discard, o!())
    }
}

pub use executor::{BoxedExecutor, Executor, HostExecutor};

pub const RADOS: &str = "/usr/bin/rados";
pub const RBD: &str = "/usr/bin/rbd";
pub const FIO: &str = "/usr/bin/fio";
pub const MKFS_XFS: &str = "/usr/sbin/mkfs.xfs";
pub const MOUNT: &str = "/usr/bin/mount";
pub const APT_GET: &str = "/usr/bin/apt-get";
pub const UPDATE_CA_CERTIFICATES: &str = "/usr/sbin/update-ca-certificates";
pub const SYSTEMD_DETECT_VIRT: &str = "/usr/bin/systemd-detect-virt";

#[derive(Debug)]
pub struct CommandFailureInfo {
    command: String,
    status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl std::fmt::Display for CommandFailureInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Command [{}] executed and failed with status: {}",
            self.command, self.status
        )?;
        write!(f, "  stdout: {}", self.stdout)?;
        write!(f, "  stderr: {}", self.stderr)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to start execution of [{command}]: {err}")]
    ExecutionStart { command: String, err: std::io::Error },

    #[error("{0}")]
    CommandFailure(Box<CommandFailureInfo>),
}

impl ExecutionError {
    /// Captured standard error of the failed command, if it ran at all.
    pub fn stderr(&self) -> &str {
        match self {
            ExecutionError::ExecutionStart { .. } => "",
            ExecutionError::CommandFailure(info) => &info.stderr,
        }
    }
}

pub fn command_to_string(command: &std::process::Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|s| s.to_string_lossy().into())
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn output_to_exec_error(
    command: String,
    output: &std::process::Output,
) -> ExecutionError {
    ExecutionError::CommandFailure(Box::new(CommandFailureInfo {
        command,
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }))
}

/// Decodes the stdout of a completed command, trimming trailing whitespace.
pub fn stdout_string(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}
