// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pluggable execution of external commands.
//!
//! - In production this is a [HostExecutor], which launches real processes.
//! - Under test a [FakeExecutor] may be used to script inputs and outputs.

use crate::{command_to_string, output_to_exec_error, ExecutionError};

use slog::{debug, error, info, Logger};
use std::process::Command;
pub use std::process::Output;
use std::str::from_utf8;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;

/// The commonly-used "safe-to-reference" type describing the executor as a
/// trait object.
pub type BoxedExecutor = Arc<dyn Executor>;

/// Runs [Command]s and returns their output.
///
/// All execution is synchronous; the caller blocks until the command exits.
pub trait Executor: Send + Sync {
    /// Executes a command, waiting for it to complete, and returning output.
    fn execute(&self, command: &mut Command) -> Result<Output, ExecutionError>;
}

fn log_input(log: &Logger, id: u64, command: &Command) {
    info!(
        log,
        "running command via executor";
        "id" => id,
        "command" => command_to_string(command),
    );
}

fn log_output(log: &Logger, id: u64, output: &Output) {
    info!(
        log,
        "finished running command via executor";
        "id" => id,
        "result" => if output.status.success() { "OK" } else { "ERROR" },
        "status" => output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string()),
    );
    if !output.stdout.is_empty() {
        debug!(
            log,
            "finished command stdout";
            "id" => id,
            "stdout" => from_utf8(&output.stdout).unwrap_or("<Not valid UTF-8>"),
        );
    }
    if !output.stderr.is_empty() {
        debug!(
            log,
            "finished command stderr";
            "id" => id,
            "stderr" => from_utf8(&output.stderr).unwrap_or("<Not valid UTF-8>"),
        );
    }
}

/// An executor which launches real host processes.
pub struct HostExecutor {
    log: Logger,
    counter: AtomicU64,
}

impl HostExecutor {
    pub fn new(log: Logger) -> Arc<Self> {
        Arc::new(Self { log, counter: AtomicU64::new(0) })
    }

    /// Perform some type coercion to access a commonly-used trait object.
    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }
}

impl Executor for HostExecutor {
    fn execute(&self, command: &mut Command) -> Result<Output, ExecutionError> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        log_input(&self.log, id, command);
        let output = command.output().map_err(|err| {
            error!(self.log, "Could not start program!"; "id" => id);
            ExecutionError::ExecutionStart {
                command: command_to_string(command),
                err,
            }
        })?;
        log_output(&self.log, id, &output);
        if !output.status.success() {
            return Err(output_to_exec_error(command_to_string(command), &output));
        }
        Ok(output)
    }
}

/// A parsed command invocation, used to compare observed commands against
/// expectations in tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Input {
    pub program: String,
    pub args: Vec<String>,
}

#[cfg(any(test, feature = "testing"))]
impl Input {
    /// Parses a whitespace-separated string as "program arg1 arg2 ...".
    pub fn shell<S: AsRef<str>>(s: S) -> Self {
        let mut words = s.as_ref().split_whitespace().map(String::from);
        let program = words.next().expect("Needs at least a program");
        Input { program, args: words.collect() }
    }
}

#[cfg(any(test, feature = "testing"))]
impl std::fmt::Display for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
impl From<&Command> for Input {
    fn from(command: &Command) -> Self {
        Input {
            program: command.get_program().to_string_lossy().to_string(),
            args: command
                .get_args()
                .map(|a| a.to_string_lossy().to_string())
                .collect(),
        }
    }
}

/// Convenience constructors for scripted [Output]s.
#[cfg(any(test, feature = "testing"))]
pub trait OutputExt: Sized {
    fn success() -> Self;
    fn failure() -> Self;
    fn set_stdout<S: AsRef<str>>(self, stdout: S) -> Self;
    fn set_stderr<S: AsRef<str>>(self, stderr: S) -> Self;
}

#[cfg(any(test, feature = "testing"))]
impl OutputExt for Output {
    fn success() -> Self {
        use std::os::unix::process::ExitStatusExt;
        Output {
            status: std::process::ExitStatus::from_raw(0),
            stdout: vec![],
            stderr: vec![],
        }
    }

    fn failure() -> Self {
        use std::os::unix::process::ExitStatusExt;
        // Wait status encoding; exit code 1.
        Output {
            status: std::process::ExitStatus::from_raw(1 << 8),
            stdout: vec![],
            stderr: vec![],
        }
    }

    fn set_stdout<S: AsRef<str>>(mut self, stdout: S) -> Self {
        self.stdout = stdout.as_ref().as_bytes().to_vec();
        self
    }

    fn set_stderr<S: AsRef<str>>(mut self, stderr: S) -> Self {
        self.stderr = stderr.as_ref().as_bytes().to_vec();
        self
    }
}

/// Handler invoked for each command the fake executor is asked to run.
#[cfg(any(test, feature = "testing"))]
pub type BoxedHandler = Box<dyn FnMut(&Command) -> Output + Send>;

/// An executor which can expect certain inputs, and respond with specific
/// outputs, without launching any real process.
#[cfg(any(test, feature = "testing"))]
pub struct FakeExecutor {
    log: Logger,
    counter: AtomicU64,
    handler: Mutex<BoxedHandler>,
}

#[cfg(any(test, feature = "testing"))]
impl FakeExecutor {
    pub fn new(log: Logger) -> Arc<FakeExecutor> {
        Arc::new(Self {
            log,
            counter: AtomicU64::new(0),
            handler: Mutex::new(Box::new(|_cmd| Output::success())),
        })
    }

    /// Set the handler to an arbitrary function.
    pub fn set_handler(&self, f: BoxedHandler) {
        *self.handler.lock().unwrap() = f;
    }

    /// Perform some type coercion to access a commonly-used trait object.
    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }
}

#[cfg(any(test, feature = "testing"))]
impl Executor for FakeExecutor {
    fn execute(&self, command: &mut Command) -> Result<Output, ExecutionError> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        log_input(&self.log, id, command);
        let output = self.handler.lock().unwrap()(command);
        log_output(&self.log, id, &output);
        if !output.status.success() {
            return Err(output_to_exec_error(command_to_string(command), &output));
        }
        Ok(output)
    }
}

#[cfg(any(test, feature = "testing"))]
type DynamicHandler = Box<dyn FnMut(Input) -> Output + Send>;

#[cfg(any(test, feature = "testing"))]
enum HandledCommand {
    Static { input: Input, output: Output },
    Dynamic { handler: DynamicHandler },
}

/// A handler for setting inputs/outputs to the executor when these commands
/// are known ahead-of-time.
///
/// Expectations are consumed in order; an unexpected or missing command
/// fails the test. See [Self::register] for integration with a
/// [FakeExecutor].
#[cfg(any(test, feature = "testing"))]
pub struct StaticHandler {
    expected: Vec<HandledCommand>,
    index: usize,
}

#[cfg(any(test, feature = "testing"))]
impl StaticHandler {
    pub fn new() -> Self {
        Self { expected: Vec::new(), index: 0 }
    }

    /// Convenience function to register the handler with a [FakeExecutor].
    pub fn register(mut self, executor: &FakeExecutor) {
        executor.set_handler(Box::new(move |command| -> Output {
            self.execute(command)
        }));
    }

    /// Expects a static "input" to exactly produce some "output".
    pub fn expect(&mut self, input: Input, output: Output) {
        self.expected.push(HandledCommand::Static { input, output });
    }

    /// A helper for [Self::expect] which quietly succeeds.
    pub fn expect_ok<S: AsRef<str>>(&mut self, input: S) {
        self.expect(Input::shell(input), Output::success())
    }

    /// A helper for [Self::expect] which quietly fails.
    pub fn expect_fail<S: AsRef<str>>(&mut self, input: S) {
        self.expect(Input::shell(input), Output::failure())
    }

    /// Expects a dynamic handler to be invoked to determine the output of
    /// this call.
    pub fn expect_dynamic(&mut self, handler: DynamicHandler) {
        self.expected.push(HandledCommand::Dynamic { handler });
    }

    fn execute(&mut self, command: &Command) -> Output {
        let observed_input = Input::from(command);
        let expected = self
            .expected
            .get_mut(self.index)
            .unwrap_or_else(|| panic!("Unexpected command: {observed_input}"));
        self.index += 1;

        match expected {
            HandledCommand::Static { input, output } => {
                assert_eq!(&observed_input, input, "Unexpected input command");
                output.clone()
            }
            HandledCommand::Dynamic { ref mut handler } => {
                handler(observed_input)
            }
        }
    }
}

#[cfg(any(test, feature = "testing"))]
impl Drop for StaticHandler {
    fn drop(&mut self) {
        let expected = self.expected.len();
        let actual = self.index;
        if actual < expected {
            let next = &self.expected[actual];
            let tip = match next {
                HandledCommand::Static { input, .. } => input.to_string(),
                HandledCommand::Dynamic { .. } => {
                    "<dynamic handler>".to_string()
                }
            };
            let errmsg = format!(
                "Only saw {actual} calls, expected {expected}\nNext would have been: {tip}"
            );
            if !std::thread::panicking() {
                panic!("{errmsg}");
            } else {
                eprintln!("{errmsg}");
            }
        }
    }
}
