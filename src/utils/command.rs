//! Running subprocesses with streaming stdin/stdout and timeouts

use super::executor::{CommandOutput, CommandSpec, RunError, StdinSource, StdoutSink};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, error};

const CHUNK: usize = 64 * 1024;

/// Run a command to completion. A non-zero exit is returned as output, not as an error.
///
/// On timeout the child is killed (`kill_on_drop`) and [`RunError::TimedOut`] returned.
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    debug!("Running command: {}", spec.display());

    let output = match spec.timeout {
        Some(limit) => tokio::time::timeout(limit, drive(spec))
            .await
            .map_err(|_| RunError::TimedOut {
                program: spec.program.clone(),
                timeout: limit,
            })?,
        None => drive(spec).await,
    }?;

    if !output.success() {
        error!("Command failed: {}", spec.display());
        error!("Stderr: {}", spec.redact(output.stderr.trim()));
    }

    Ok(output)
}

async fn drive(spec: &CommandSpec) -> Result<CommandOutput, RunError> {
    let io_err = |source| RunError::Io {
        program: spec.program.clone(),
        source,
    };

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(match spec.stdin {
            StdinSource::Null => Stdio::null(),
            _ => Stdio::piped(),
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(ref dir) = spec.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (fed, drained, errors) = tokio::join!(
        feed_stdin(stdin, &spec.stdin),
        drain_stdout(stdout, &spec.stdout),
        read_stderr(stderr),
    );
    let status = child.wait().await.map_err(io_err)?;

    fed.map_err(io_err)?;
    let stdout = drained.map_err(io_err)?;
    let stderr = errors.map_err(io_err)?;

    Ok(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

async fn feed_stdin(stdin: Option<ChildStdin>, source: &StdinSource) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };

    let mut reader: Box<dyn Read> = match source {
        StdinSource::Null => return Ok(()),
        StdinSource::File(path) => Box::new(std::fs::File::open(path)?),
        StdinSource::GzipFile(path) => Box::new(GzDecoder::new(std::fs::File::open(path)?)),
    };

    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        match stdin.write_all(&buf[..n]).await {
            Ok(()) => {}
            // The child stopped reading; its exit status tells the rest
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
            Err(e) => return Err(e),
        }
    }

    match stdin.shutdown().await {
        Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
        _ => Ok(()),
    }
}

async fn drain_stdout(stdout: Option<ChildStdout>, sink: &StdoutSink) -> std::io::Result<Vec<u8>> {
    let Some(mut stdout) = stdout else {
        return Ok(Vec::new());
    };

    let mut writer = match sink {
        StdoutSink::Capture => {
            let mut captured = Vec::new();
            stdout.read_to_end(&mut captured).await?;
            return Ok(captured);
        }
        StdoutSink::File(path) => FileSink::Plain(std::fs::File::create(path)?),
        StdoutSink::GzipFile(path) => FileSink::Gzip(GzEncoder::new(
            std::fs::File::create(path)?,
            Compression::default(),
        )),
    };

    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    writer.finish()?;

    Ok(Vec::new())
}

enum FileSink {
    Plain(std::fs::File),
    Gzip(GzEncoder<std::fs::File>),
}

impl FileSink {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            FileSink::Plain(file) => file.write_all(bytes),
            FileSink::Gzip(encoder) => encoder.write_all(bytes),
        }
    }

    fn finish(self) -> std::io::Result<()> {
        let file = match self {
            FileSink::Plain(file) => file,
            FileSink::Gzip(encoder) => encoder.finish()?,
        };
        file.sync_all()
    }
}

async fn read_stderr(stderr: Option<ChildStderr>) -> std::io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    if let Some(mut stderr) = stderr {
        stderr.read_to_end(&mut captured).await?;
    }
    Ok(captured)
}
