//! The "run a shell command, give me its stdout" capability samplers use.

use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};

/// `ENOMEM` has the same value on every platform the samplers support.
const ENOMEM: i32 = 12;

/// Failure to execute an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The system could not allocate memory to run the command.
    #[error("out of memory: {0}")]
    ResourceExhausted(String),

    /// The command did not finish before the runner's deadline and was killed.
    #[error("`{command}` did not finish within {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    /// Any other I/O failure while spawning or reaping the command.
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for CommandError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::OutOfMemory || err.raw_os_error() == Some(ENOMEM) {
            CommandError::ResourceExhausted(err.to_string())
        } else {
            CommandError::Io(err)
        }
    }
}

/// Executes a command line and returns its captured standard output.
pub trait CommandRunner: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the command cannot be spawned, waited on, or
    /// does not finish in time. A command that runs and exits non-zero is
    /// not an error; its (possibly empty) stdout is returned.
    fn run(&self, command: &str) -> Result<String, CommandError>;
}

/// Runs commands through `sh -c`, each in its own process group.
///
/// With a timeout, the deadline covers the whole call: the shell exiting
/// and every process holding its stdout closing the pipe. On expiry the
/// entire process group is killed, so pipelines and background jobs go
/// down with the shell.
///
/// Inside a tokio runtime, call [`CommandRunner::run`] from
/// `block_in_place` or a blocking task; the command is driven on that
/// runtime. Outside one, a throwaway current-thread runtime is used.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner {
    timeout: Option<Duration>,
}

impl ShellCommandRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn execute(&self, command: &str) -> Result<String, CommandError> {
        let mut shell = Command::new("sh");
        shell
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        shell.process_group(0);

        let child = shell.spawn()?;
        let pgid = child.id();

        let output = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    // Dropping the future killed the shell; the rest of its
                    // group may still hold the pipe open.
                    if let Some(pgid) = pgid {
                        kill_process_group(pgid);
                    }
                    return Err(CommandError::TimedOut {
                        command: command.to_string(),
                        timeout,
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            tracing::debug!(command, status = %output.status, "Command exited unsuccessfully");
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, command: &str) -> Result<String, CommandError> {
        match Handle::try_current() {
            Ok(handle) => handle.block_on(self.execute(command)),
            Err(_) => Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(self.execute(command)),
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) takes no pointers. The group still has members (they
    // are what kept us waiting), so its id cannot have been reused.
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        tracing::debug!(
            pgid,
            error = %io::Error::last_os_error(),
            "Failed to kill command process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
