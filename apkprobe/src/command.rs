use std::borrow::Cow;
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::Level::Debug;
use log::{debug, log_enabled};
use wait_timeout::ChildExt;

pub struct CmdOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CmdOutput {
    /// Converts to a `Result` object that is `Ok` only if the [ExitStatus] is
    /// success.
    pub fn err_on_status(self) -> crate::Result<Self> {
        if self.status.success() {
            return Ok(self);
        }

        // Killed by a signal if there is no code
        let code = self.status.code().unwrap_or(-1);

        Err(crate::Error::CommandError(
            code,
            self.stderr_utf8_lossy().trim().to_string(),
        ))
    }

    #[inline]
    pub fn ok(&self) -> bool {
        self.status.success()
    }

    #[inline]
    pub fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr_utf8_lossy().contains(needle)
    }

    #[inline]
    pub fn stdout_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    #[inline]
    pub fn stderr_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

impl From<Output> for CmdOutput {
    fn from(output: Output) -> Self {
        Self {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Run a command capturing stdout and stderr, killing it if it runs longer
/// than `timeout`.
///
/// Both pipes are drained on their own threads while waiting so a chatty
/// child (a full `logcat -d` for instance) can't block on a full pipe.
pub fn run_cmd_timeout<C, S>(
    cmd: C,
    args: &[S],
    timeout: Option<Duration>,
) -> crate::Result<CmdOutput>
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    if log_enabled!(Debug) {
        log_cmd(&cmd, args);
    }

    let mut child = Command::new(&cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| crate::Error::ProcessSpawn {
            cmd: cmd_string(&cmd, args),
            source,
        })?;

    let out = drain(child.stdout.take());
    let err = drain(child.stderr.take());

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => match child.wait_timeout(limit)? {
            Some(status) => status,
            None => {
                if let Err(e) = child.kill() {
                    log::error!("failed to kill child: {}", e);
                }
                let _ = child.wait();
                // The reader threads are left to finish on their own
                return Err(crate::Error::ProcessTimeout {
                    cmd: cmd_string(&cmd, args),
                    timeout: limit,
                });
            }
        },
    };

    Ok(CmdOutput {
        status,
        stdout: collect(out),
        stderr: collect(err),
    })
}

/// Spawns a long lived process that is not waited on. All stdio is sent to
/// /dev/null.
pub fn spawn_detached<C, S>(cmd: C, args: &[S]) -> crate::Result<Child>
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    if log_enabled!(Debug) {
        log_cmd(&cmd, args);
    }
    Command::new(&cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| crate::Error::ProcessSpawn {
            cmd: cmd_string(&cmd, args),
            source,
        })
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = p.read_to_end(&mut buf) {
                log::warn!("error reading child output: {}", e);
            }
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Renders the command the way it would be typed into a shell
pub fn cmd_string<C, S>(cmd: &C, args: &[S]) -> String
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    let mut s = cmd.as_ref().to_string_lossy().into_owned();
    for a in args {
        s.push(' ');
        s.push_str(&a.as_ref().to_string_lossy());
    }
    s
}

pub fn log_cmd<C, S>(cmd: &C, args: &[S])
where
    C: AsRef<OsStr>,
    S: AsRef<OsStr>,
{
    debug!("Running command: `{}`", cmd_string(cmd, args));
}
