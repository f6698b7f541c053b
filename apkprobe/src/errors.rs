use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::utils::path_str;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("required binary `{0}` not available to context")]
    MissingBin(String),
    #[error("missing required env var: {0}")]
    MissingEnv(String),

    #[error("{0}")]
    IO(io::Error),

    #[error("invalid env var {0} ({1})")]
    InvalidEnv(String, String),

    #[error("command failed with status {0}: {1}")]
    CommandError(i32, String),

    #[error("failed to spawn `{cmd}`: {source}")]
    ProcessSpawn {
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("`{cmd}` timed out after {timeout:?}")]
    ProcessTimeout { cmd: String, timeout: Duration },

    #[error("device bridge `{0}` is not available")]
    ToolUnavailable(String),

    #[error("target not found: {0:?}")]
    TargetNotFound(PathBuf),

    #[error("device {serial} did not connect within {timeout:?}")]
    EmulatorBootTimeout { serial: String, timeout: Duration },

    #[error("install failed: {0}")]
    InstallFailure(String),

    #[error("could not extract package identifier from {0:?}")]
    IdentifierExtractionFailure(PathBuf),

    #[error("telemetry dump timed out after {0:?}")]
    TelemetryDumpTimeout(Duration),

    #[error("device {0} is already leased by another session")]
    DeviceBusy(String),

    #[error("invalid config {0}: {1}")]
    InvalidConfig(String, String),

    #[error("generic error: {0}")]
    Generic(String),
}

impl Error {
    pub fn new_generic<S: ToString + ?Sized>(s: &S) -> Self {
        Self::Generic(s.to_string())
    }

    pub fn new_cfg<S: ToString + ?Sized>(path: &Path, s: &S) -> Self {
        let as_str = path_str(path);
        Self::InvalidConfig(as_str.into(), s.to_string())
    }

    /// True for any error that came from a process exceeding its deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ProcessTimeout { .. } | Self::TelemetryDumpTimeout(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::IO(err)
    }
}
