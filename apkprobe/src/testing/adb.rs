use std::io;
use std::process::ExitStatus;
use std::sync::Mutex;
use std::time::Duration;

use crate::adb::Adb;
use crate::command::CmdOutput;
use crate::device::DeviceIdentity;

/// What a [ScriptedAdb] does when it sees a matching command
#[derive(Debug, Clone)]
pub enum Scripted {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    Timeout,
    SpawnFailure,
}

impl Scripted {
    /// Exit zero with the given stdout
    pub fn stdout(out: &str) -> Self {
        Self::Exit {
            code: 0,
            stdout: out.into(),
            stderr: String::new(),
        }
    }

    fn respond(&self, args: &[&str], timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        let cmd = format!("adb {}", args.join(" "));
        match self {
            Self::Exit {
                code,
                stdout,
                stderr,
            } => Ok(CmdOutput {
                status: exit_status(*code),
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            }),
            Self::Timeout => Err(crate::Error::ProcessTimeout {
                cmd,
                timeout: timeout.unwrap_or_default(),
            }),
            Self::SpawnFailure => Err(crate::Error::ProcessSpawn {
                cmd,
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
        }
    }
}

#[cfg(unix)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

/// An [Adb] that answers from a script instead of running anything.
///
/// Responses are picked by the longest registered argument prefix; commands
/// without a match exit zero with no output. Every call is recorded, minus
/// the serial selector.
pub struct ScriptedAdb {
    device: DeviceIdentity,
    script: Vec<(Vec<String>, Scripted)>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedAdb {
    pub fn new() -> Self {
        Self {
            device: DeviceIdentity::default(),
            script: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_device(mut self, device: DeviceIdentity) -> Self {
        self.device = device;
        self
    }

    pub fn on(mut self, prefix: &[&str], response: Scripted) -> Self {
        self.script
            .push((prefix.iter().map(|s| s.to_string()).collect(), response));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("poisoned").clone()
    }

    /// Whether any recorded call starts with `prefix`
    pub fn called(&self, prefix: &[&str]) -> bool {
        self.calls
            .lock()
            .expect("poisoned")
            .iter()
            .any(|c| c.len() >= prefix.len() && c.iter().zip(prefix).all(|(a, b)| a == b))
    }

    fn lookup(&self, args: &[&str]) -> Option<&Scripted> {
        self.script
            .iter()
            .filter(|(prefix, _)| {
                prefix.len() <= args.len() && prefix.iter().zip(args).all(|(a, b)| a == b)
            })
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, resp)| resp)
    }
}

impl Adb for ScriptedAdb {
    fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    fn run(&self, args: &[&str], timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.calls
            .lock()
            .expect("poisoned")
            .push(args.iter().map(|s| s.to_string()).collect());
        match self.lookup(args) {
            Some(resp) => resp.respond(args, timeout),
            None => Scripted::stdout("").respond(args, timeout),
        }
    }
}
