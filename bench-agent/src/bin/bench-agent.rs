// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable entry point for the benchmarking agent.
//!
//! `dispatch <event>` handles one framework notification; a deferred event
//! exits with code 2 so the framework redelivers it. `action <name> ...`
//! runs one operator action, printing the result payload as JSON.

use anyhow::Context;
use bench_agent::actions::{
    Action, FioAction, RadosBenchAction, RbdBenchAction,
};
use bench_agent::agent::{BenchAgent, Event, Outcome};
use bench_agent::config::Config;
use camino::Utf8PathBuf;
use ceph_utils::HostExecutor;
use clap::{Parser, Subcommand};
use slog::Drain;

/// Exit code asking the framework to redeliver the event.
const EXIT_DEFERRED: i32 = 2;

#[derive(Parser, Debug)]
struct Args {
    #[clap(long, action)]
    config_file: Utf8PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle one framework notification.
    Dispatch {
        /// Event name, e.g. "pools-available".
        event: String,
    },
    /// Run one operator action.
    #[clap(subcommand)]
    Action(ActionCommand),
}

#[derive(Subcommand, Debug)]
enum ActionCommand {
    /// Run `rados bench` against a pool.
    RadosBench {
        /// One of: write, seq, rand.
        #[clap(long)]
        operation: String,
        #[clap(long)]
        seconds: u32,
        #[clap(long)]
        pool_name: Option<String>,
        /// Extra switches appended to the rados invocation.
        #[clap(long)]
        switches: Option<String>,
    },
    /// Prepare the block device, then run `rbd bench`.
    RbdBench {
        #[clap(long)]
        operation: String,
        #[clap(long)]
        pool_name: Option<String>,
    },
    /// Render and run a fio job.
    Fio {
        #[clap(long)]
        operation: Option<String>,
        /// Benchmark this raw device instead of preparing a block image.
        #[clap(long)]
        disk_dev: Option<String>,
        #[clap(long)]
        pool_name: Option<String>,
        #[clap(long)]
        image_size: Option<String>,
        /// Additional job keys as key=value, repeatable.
        #[clap(long = "set", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected key=value, got {s:?}")),
    }
}

fn make_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let log = make_logger();

    let config = Config::from_file(&args.config_file).with_context(|| {
        format!("read config file {:?}", args.config_file)
    })?;

    let executor = HostExecutor::new(log.clone()).as_executor();
    let mut agent = BenchAgent::new(log, config, executor)
        .context("initializing agent")?;

    match args.command {
        Command::Dispatch { event } => {
            let event: Event =
                event.parse().context("parsing event name")?;
            match agent.dispatch(event)? {
                Outcome::Handled => Ok(()),
                Outcome::Deferred => std::process::exit(EXIT_DEFERRED),
            }
        }
        Command::Action(action) => {
            let action = match action {
                ActionCommand::RadosBench {
                    operation,
                    seconds,
                    pool_name,
                    switches,
                } => Action::RadosBench(RadosBenchAction {
                    operation: operation
                        .parse()
                        .context("parsing bench operation")?,
                    seconds,
                    pool_name,
                    switches,
                }),
                ActionCommand::RbdBench { operation, pool_name } => {
                    Action::RbdBench(RbdBenchAction { operation, pool_name })
                }
                ActionCommand::Fio {
                    operation,
                    disk_dev,
                    pool_name,
                    image_size,
                    set,
                } => Action::Fio(FioAction {
                    operation,
                    disk_dev,
                    pool_name,
                    image_size,
                    extra: set,
                }),
            };
            match agent.run_action(action) {
                Ok(output) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&output)
                            .expect("results always serialize")
                    );
                    Ok(())
                }
                Err(failed) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&failed)
                            .expect("results always serialize")
                    );
                    std::process::exit(1);
                }
            }
        }
    }
}
