// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs the flexible I/O tester against a rendered job file.

use crate::executor::BoxedExecutor;
use crate::{stdout_string, ExecutionError, FIO};
use camino::{Utf8Path, Utf8PathBuf};

/// Error returned by [Fio::run].
#[derive(thiserror::Error, Debug)]
#[error("Failed to run fio job {job_file}: {err}")]
pub struct RunJobError {
    pub job_file: Utf8PathBuf,
    #[source]
    pub err: ExecutionError,
}

pub struct Fio {}

impl Fio {
    /// Runs `fio` with the given job file, returning captured stdout.
    pub fn run(
        executor: &BoxedExecutor,
        job_file: &Utf8Path,
    ) -> Result<String, RunJobError> {
        let mut command = std::process::Command::new(FIO);
        let cmd = command.arg(job_file.as_str());
        let output = executor.execute(cmd).map_err(|err| RunJobError {
            job_file: job_file.to_path_buf(),
            err,
        })?;
        Ok(stdout_string(&output))
    }
}
