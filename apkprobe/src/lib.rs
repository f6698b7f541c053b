pub mod context;
pub use context::{Context, DefaultContext};

pub mod config;
pub use config::{AnalysisConfig, Timeouts};

pub mod errors;
pub use errors::{Error, Result};

pub mod command;
pub use command::run_cmd_timeout;

pub mod adb;
pub mod device;
pub use device::{DeviceIdentity, DeviceLease};

pub mod events;

pub mod emulator;
pub mod package;
pub use package::PackageIdentifier;

pub mod install;
pub mod fuzz;
pub mod telemetry;

pub mod behavior;
pub use behavior::{BehaviorProfile, Signal};

pub mod analysis;
pub use analysis::{AnalysisResult, Orchestrator};

pub mod utils;

#[cfg(test)]
pub mod testing;
