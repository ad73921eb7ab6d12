//! Running shell commands with merged output, optional live echo and a
//! hard timeout.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed while waiting on `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Echo output to stdout as it arrives (it is buffered either way)
    pub stream: bool,
    /// Kill the whole process group once this elapses
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn captured() -> Self {
        Self::default()
    }

    pub fn streamed(timeout: Option<Duration>) -> Self {
        Self {
            stream: true,
            timeout,
        }
    }
}

/// Exit code and combined stdout/stderr of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Something that can run a shell command line.
pub trait CommandRunner {
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ProcessError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ProcessError> {
        (**self).run(command, options)
    }
}

/// Runs command lines through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: PathBuf,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

impl ShellRunner {
    pub fn new(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, options: &RunOptions) -> Result<CommandOutput, ProcessError> {
        let spawn_error = |source: io::Error| ProcessError::Spawn {
            command: command.to_string(),
            source,
        };
        let wait_error = |source: io::Error| ProcessError::Wait {
            command: command.to_string(),
            source,
        };

        // One pipe for both streams so trace lines and program output keep
        // their relative order.
        let (reader, writer) = nix::unistd::pipe().map_err(|e| spawn_error(e.into()))?;
        let stderr_writer = writer.try_clone().map_err(spawn_error)?;

        debug!(command, stream = options.stream, timeout = ?options.timeout, "spawning");
        let mut child = {
            let mut cmd = Command::new(&self.shell);
            cmd.arg("-c")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(stderr_writer))
                .process_group(0);
            cmd.spawn().map_err(spawn_error)?
            // `cmd` drops here, closing the parent's copies of the write end
        };

        let collector = spawn_output_collector(File::from(reader), options.stream);
        let (status, timed_out) =
            wait_with_deadline(&mut child, options.timeout).map_err(wait_error)?;

        let buffer = match collector.join() {
            Ok(result) => result.map_err(wait_error)?,
            Err(_) => {
                return Err(wait_error(io::Error::new(
                    io::ErrorKind::Other,
                    "output collector panicked",
                )))
            }
        };

        let exit_code = exit_code_from(status);
        debug!(command, exit_code, timed_out, bytes = buffer.len(), "command finished");

        Ok(CommandOutput {
            exit_code,
            output: String::from_utf8_lossy(&buffer).into_owned(),
            timed_out,
        })
    }
}

/// Quote a word for inclusion in a shell command line.
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:,@%=".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Run `command` through `/bin/sh -c`.
pub fn run(command: &str, options: &RunOptions) -> Result<CommandOutput, ProcessError> {
    ShellRunner::default().run(command, options)
}

fn spawn_output_collector(source: File, stream: bool) -> thread::JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buffer = Vec::new();
        let mut line = Vec::new();
        let mut stdout = io::stdout();

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            if stream {
                // A closed stdout must not cost us the captured trace.
                let _ = stdout.write_all(&line);
                let _ = stdout.flush();
            }
            buffer.extend_from_slice(&line);
        }

        Ok(buffer)
    })
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> io::Result<(ExitStatus, bool)> {
    let Some(limit) = timeout else {
        return Ok((child.wait()?, false));
    };

    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        if Instant::now() >= deadline {
            warn!(pid = child.id(), ?limit, "command timed out, killing process group");
            kill_process_group(child);
            return Ok((child.wait()?, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_process_group(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(errno) = killpg(pgid, Signal::SIGKILL) {
        debug!(%errno, "killpg failed, killing child only");
        let _ = child.kill();
    }
}

/// Unix signal exit status parity: 128 + signal for terminated processes
fn exit_code_from(status: ExitStatus) -> i32 {
    if let Some(signal) = status.signal() {
        return 128 + signal;
    }
    status.code().unwrap_or(1)
}
