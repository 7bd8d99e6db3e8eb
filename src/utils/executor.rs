//! Command execution abstraction for testability
//!
//! Every external process (engine clients, transports, the snapshot store) is
//! described by a [`CommandSpec`] and run through a [`CommandRunner`], so the
//! pipelines can be exercised against [`mock::MockRunner`].

use std::path::PathBuf;
use std::time::Duration;

/// Where a child's stdin comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    Null,
    File(PathBuf),
    /// Decompressed on the fly while feeding the child
    GzipFile(PathBuf),
}

/// Where a child's stdout goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutSink {
    Capture,
    File(PathBuf),
    /// Compressed on the fly while reading the child
    GzipFile(PathBuf),
}

const REDACTED: &str = "****";

/// A fully described external invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment; values are never logged
    pub env: Vec<(String, String)>,
    pub stdin: StdinSource,
    pub stdout: StdoutSink,
    pub timeout: Option<Duration>,
    pub working_dir: Option<PathBuf>,
    secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: StdinSource::Null,
            stdout: StdoutSink::Capture,
            timeout: None,
            working_dir: None,
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Mark a value that must be masked wherever this command is displayed
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    pub fn stdin(mut self, source: StdinSource) -> Self {
        self.stdin = source;
        self
    }

    pub fn stdout(mut self, sink: StdoutSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Command line suitable for logs: secrets masked, environment values omitted
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&self.redact(arg));
        }
        line
    }

    /// Mask every registered secret inside `text`
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            out = out.replace(secret.as_str(), REDACTED);
        }
        out
    }
}

/// Result of a process that ran to completion (successfully or not)
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Captured stdout; empty when stdout went to a file sink
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// The process could not be run to completion
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("I/O error while running {program}: {source}")]
    Io {
        program: String,
        source: std::io::Error,
    },
}

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError>;

    /// Whether a program can be found on PATH
    fn tool_available(&self, tool: &str) -> bool;
}

/// Runs real subprocesses on a private current-thread runtime
pub struct RealRunner {
    runtime: tokio::runtime::Runtime,
}

impl RealRunner {
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }
}

impl CommandRunner for RealRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        self.runtime.block_on(super::command::run(spec))
    }

    fn tool_available(&self, tool: &str) -> bool {
        which::which(tool).is_ok()
    }
}

/// A mock runner for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::{HashSet, VecDeque};
    use std::io::{Read, Write};
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct RecordedCall {
        pub program: String,
        pub args: Vec<String>,
        pub env_keys: Vec<String>,
        pub stdin: StdinSource,
        pub stdout: StdoutSink,
        /// Bytes the child would have read on stdin (decompressed)
        pub stdin_data: Option<Vec<u8>>,
    }

    impl RecordedCall {
        pub fn command_line(&self) -> String {
            std::iter::once(self.program.as_str())
                .chain(self.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        }
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String },
        Failure { exit_code: i32, stderr: String },
        Timeout,
        /// Succeeds and writes `contents` to the last argument, like the local side of `cp`
        WritesFile { contents: Vec<u8> },
    }

    impl MockResponse {
        pub fn ok(stdout: &str) -> Self {
            MockResponse::Success {
                stdout: stdout.to_string(),
            }
        }

        pub fn writes_file(contents: &[u8]) -> Self {
            MockResponse::WritesFile {
                contents: contents.to_vec(),
            }
        }

        pub fn fail(exit_code: i32, stderr: &str) -> Self {
            MockResponse::Failure {
                exit_code,
                stderr: stderr.to_string(),
            }
        }
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
            }
        }
    }

    /// Mock runner for testing
    ///
    /// Responses are matched by substring against the full command line, first
    /// registered pattern wins. Each pattern holds a queue; the last response
    /// in a queue repeats once the others are used up.
    #[derive(Clone, Default)]
    pub struct MockRunner {
        pub calls: Arc<Mutex<Vec<RecordedCall>>>,
        responses: Arc<Mutex<Vec<(String, VecDeque<MockResponse>)>>>,
        default_response: Arc<Mutex<MockResponse>>,
        missing_tools: Arc<Mutex<HashSet<String>>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for commands whose line contains `pattern`
        pub fn expect(self, pattern: &str, response: MockResponse) -> Self {
            {
                let mut responses = self.responses.lock().unwrap();
                match responses.iter_mut().find(|(p, _)| p == pattern) {
                    Some((_, queue)) => queue.push_back(response),
                    None => responses.push((pattern.to_string(), VecDeque::from([response]))),
                }
            }
            self
        }

        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Pretend a program is not installed
        pub fn without_tool(self, tool: &str) -> Self {
            self.missing_tools.lock().unwrap().insert(tool.to_string());
            self
        }

        pub fn get_calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Calls whose command line contains `pattern`
        pub fn calls_matching(&self, pattern: &str) -> Vec<RecordedCall> {
            self.get_calls()
                .into_iter()
                .filter(|c| c.command_line().contains(pattern))
                .collect()
        }

        pub fn was_called(&self, pattern: &str) -> bool {
            !self.calls_matching(pattern).is_empty()
        }

        pub fn call_count(&self, pattern: &str) -> usize {
            self.calls_matching(pattern).len()
        }

        fn next_response(&self, line: &str) -> MockResponse {
            let mut responses = self.responses.lock().unwrap();
            for (pattern, queue) in responses.iter_mut() {
                if line.contains(pattern.as_str()) {
                    if queue.len() > 1 {
                        if let Some(response) = queue.pop_front() {
                            return response;
                        }
                    }
                    if let Some(response) = queue.front() {
                        return response.clone();
                    }
                }
            }
            self.default_response.lock().unwrap().clone()
        }

        fn read_stdin(source: &StdinSource, program: &str) -> Result<Option<Vec<u8>>, RunError> {
            let io_err = |source| RunError::Io {
                program: program.to_string(),
                source,
            };
            let mut data = Vec::new();
            match source {
                StdinSource::Null => return Ok(None),
                StdinSource::File(path) => {
                    data = std::fs::read(path).map_err(io_err)?;
                }
                StdinSource::GzipFile(path) => {
                    let file = std::fs::File::open(path).map_err(io_err)?;
                    GzDecoder::new(file).read_to_end(&mut data).map_err(io_err)?;
                }
            }
            Ok(Some(data))
        }

        fn write_stdout(sink: &StdoutSink, bytes: &[u8], program: &str) -> Result<Vec<u8>, RunError> {
            let io_err = |source| RunError::Io {
                program: program.to_string(),
                source,
            };
            match sink {
                StdoutSink::Capture => Ok(bytes.to_vec()),
                StdoutSink::File(path) => {
                    std::fs::write(path, bytes).map_err(io_err)?;
                    Ok(Vec::new())
                }
                StdoutSink::GzipFile(path) => {
                    let file = std::fs::File::create(path).map_err(io_err)?;
                    let mut encoder = GzEncoder::new(file, Compression::default());
                    encoder.write_all(bytes).map_err(io_err)?;
                    encoder.finish().map_err(io_err)?;
                    Ok(Vec::new())
                }
            }
        }
    }

    impl CommandRunner for MockRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
            let stdin_data = Self::read_stdin(&spec.stdin, &spec.program)?;
            let call = RecordedCall {
                program: spec.program.clone(),
                args: spec.args.clone(),
                env_keys: spec.env.iter().map(|(k, _)| k.clone()).collect(),
                stdin: spec.stdin.clone(),
                stdout: spec.stdout.clone(),
                stdin_data,
            };
            let line = call.command_line();
            self.calls.lock().unwrap().push(call);

            match self.next_response(&line) {
                MockResponse::Success { stdout } => Ok(CommandOutput {
                    exit_code: Some(0),
                    stdout: Self::write_stdout(&spec.stdout, stdout.as_bytes(), &spec.program)?,
                    stderr: String::new(),
                }),
                MockResponse::Failure { exit_code, stderr } => Ok(CommandOutput {
                    exit_code: Some(exit_code),
                    stdout: Vec::new(),
                    stderr,
                }),
                MockResponse::Timeout => Err(RunError::TimedOut {
                    program: spec.program.clone(),
                    timeout: spec.timeout.unwrap_or_default(),
                }),
                MockResponse::WritesFile { contents } => {
                    if let Some(dest) = spec.args.last() {
                        std::fs::write(dest, contents).map_err(|source| RunError::Io {
                            program: spec.program.clone(),
                            source,
                        })?;
                    }
                    Ok(CommandOutput {
                        exit_code: Some(0),
                        ..Default::default()
                    })
                }
            }
        }

        fn tool_available(&self, tool: &str) -> bool {
            !self.missing_tools.lock().unwrap().contains(tool)
        }
    }
}
