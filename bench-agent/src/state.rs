// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Durable agent state, surviving restarts via a generation-numbered
//! ledger.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use slog::{info, warn, Logger};

/// Records which may be stored on the ledger.
pub trait Ledgerable:
    Clone + serde::de::DeserializeOwned + Serialize
{
    /// Returns true if this record should be preferred over `other` when
    /// multiple copies are found on disk.
    fn is_newer_than(&self, other: &Self) -> bool;

    /// Increments the generation number before a commit.
    fn generation_bump(&mut self);
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to write ledger to {path}: {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("Failed to write ledger to any of the requested paths")]
    FailedToWrite,
}

/// A record committed to one or more paths; on load, the newest copy wins.
///
/// Writes are not transactional. A crash mid-commit can leave paths at
/// different generations, which the next load resolves in favor of the
/// newest.
pub struct Ledger<T> {
    log: Logger,
    paths: Vec<Utf8PathBuf>,
    data: T,
}

impl<T: Ledgerable> Ledger<T> {
    /// Reads the newest ledger copy from `paths`, or `None` if no copy
    /// could be read.
    pub fn new(log: &Logger, paths: Vec<Utf8PathBuf>) -> Option<Self> {
        let mut best: Option<T> = None;
        for path in &paths {
            let Ok(contents) = std::fs::read_to_string(path) else {
                continue;
            };
            let data: T = match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    warn!(
                        log,
                        "Ignoring unparseable ledger copy";
                        "path" => %path,
                        "err" => %err,
                    );
                    continue;
                }
            };
            best = match best {
                Some(prior) if prior.is_newer_than(&data) => Some(prior),
                _ => Some(data),
            };
        }
        best.map(|data| Self { log: log.clone(), paths, data })
    }

    /// Like [Self::new], but default-fills when no copy exists on disk.
    pub fn new_with(log: &Logger, paths: Vec<Utf8PathBuf>, default: T) -> Self {
        Self::new(log, paths.clone()).unwrap_or_else(|| {
            info!(log, "No ledger found; starting from defaults");
            Self { log: log.clone(), paths, data: default }
        })
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Bumps the generation and writes the record to every path; fails only
    /// if no path could be written.
    pub fn commit(&mut self) -> Result<(), LedgerError> {
        self.data.generation_bump();
        let contents = serde_json::to_string_pretty(&self.data)
            .expect("ledger records always serialize");
        let mut wrote_any = false;
        for path in &self.paths {
            if let Some(parent) = path.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    warn!(
                        self.log,
                        "Failed to create ledger directory";
                        "path" => %path,
                        "err" => %err,
                    );
                    continue;
                }
            }
            match std::fs::write(path, &contents) {
                Ok(()) => wrote_any = true,
                Err(err) => {
                    warn!(
                        self.log,
                        "Failed to write ledger copy";
                        "path" => %path,
                        "err" => %err,
                    );
                }
            }
        }
        if !wrote_any {
            return Err(LedgerError::FailedToWrite);
        }
        Ok(())
    }
}

/// The agent's durable milestone flags.
///
/// Each flag is set when the corresponding milestone completes and never
/// unset during normal operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PersistedState {
    pub generation: u64,
    /// The benchmarking block image has been created.
    #[serde(default)]
    pub target_created: bool,
    /// TLS materials have been written and the trust store refreshed.
    #[serde(default)]
    pub enable_tls: bool,
    /// Configuration has rendered at least once.
    #[serde(default)]
    pub is_started: bool,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            generation: 0,
            target_created: false,
            enable_tls: false,
            is_started: false,
        }
    }
}

impl Ledgerable for PersistedState {
    fn is_newer_than(&self, other: &Self) -> bool {
        self.generation > other.generation
    }

    fn generation_bump(&mut self) {
        self.generation += 1;
    }
}
