// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Utilities for running `rados bench`.

use crate::executor::BoxedExecutor;
use crate::{stdout_string, ExecutionError, RADOS};
use std::fmt;
use std::str::FromStr;

/// The I/O pattern driven by `rados bench`.
///
/// `seq` and `rand` read back objects written by a previous `write` run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BenchOperation {
    Write,
    Seq,
    Rand,
}

impl fmt::Display for BenchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BenchOperation::Write => "write",
            BenchOperation::Seq => "seq",
            BenchOperation::Rand => "rand",
        };
        write!(f, "{s}")
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Unknown bench operation {0:?} (expected write, seq, or rand)")]
pub struct ParseBenchOperationError(String);

impl FromStr for BenchOperation {
    type Err = ParseBenchOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(BenchOperation::Write),
            "seq" => Ok(BenchOperation::Seq),
            "rand" => Ok(BenchOperation::Rand),
            other => Err(ParseBenchOperationError(other.to_string())),
        }
    }
}

/// Error returned by [Rados::bench].
#[derive(thiserror::Error, Debug)]
#[error("Failed to run rados bench against pool {pool}: {err}")]
pub struct BenchError {
    pub pool: String,
    #[source]
    pub err: ExecutionError,
}

/// Wraps commands issued through the `rados` tool.
pub struct Rados {}

impl Rados {
    /// Runs `rados bench` for `seconds` against `pool`, returning the tool's
    /// captured stdout.
    ///
    /// `switches` is split on whitespace and appended verbatim to the fixed
    /// argument template.
    pub fn bench(
        executor: &BoxedExecutor,
        client_id: &str,
        pool: &str,
        seconds: u32,
        operation: BenchOperation,
        switches: Option<&str>,
    ) -> Result<String, BenchError> {
        let mut command = std::process::Command::new(RADOS);
        let cmd = command.args([
            "--id",
            client_id,
            "-p",
            pool,
            "bench",
            &seconds.to_string(),
            &operation.to_string(),
        ]);
        if let Some(switches) = switches {
            cmd.args(switches.split_whitespace());
        }
        let output = executor
            .execute(cmd)
            .map_err(|err| BenchError { pool: pool.to_string(), err })?;
        Ok(stdout_string(&output))
    }
}
