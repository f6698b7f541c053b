//! One dynamic analysis session, start to finish.
//!
//! The pipeline is strictly sequential:
//!
//! `Idle -> ToolCheck -> DeviceReady -> Installed -> Inspected -> Fuzzed ->
//! Monitored -> Extracted -> Cleaned -> Done`
//!
//! with `Failed` reachable from any non-terminal state. Whether a stage error
//! ends the session or is swallowed is decided by [Stage::policy], not by the
//! stage itself.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::adb::{Adb, ExecAdb};
use crate::behavior::{self, BehaviorProfile};
use crate::config::AnalysisConfig;
use crate::device::{DeviceIdentity, DeviceLease};
use crate::emulator::{EmulatorController, Emulator, ExecEmulator, SettlePolicy};
use crate::events::{AnalysisEvent, EventMonitor, NoopMonitor};
use crate::fuzz::FuzzDriver;
use crate::install::InstallManager;
use crate::package::{ExecAapt, PackageIdentifier, PackageInspector};
use crate::telemetry::{TelemetryBuffer, TelemetryCollector};
use crate::utils::file_name_lossy;
use crate::Context;

/// A unit of work in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Lease,
    ToolCheck,
    TargetCheck,
    DeviceReady,
    Install,
    Inspect,
    ClearTelemetry,
    Fuzz,
    Monitor,
    Uninstall,
}

/// What happens to the session when a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePolicy {
    /// The session ends in `Failed`
    Abort,
    /// The error is logged and the pipeline continues with degraded output
    Degrade,
}

impl Stage {
    pub fn policy(&self) -> StagePolicy {
        match self {
            Self::Lease
            | Self::ToolCheck
            | Self::TargetCheck
            | Self::DeviceReady
            | Self::Install
            | Self::Inspect => StagePolicy::Abort,
            Self::ClearTelemetry | Self::Fuzz | Self::Monitor | Self::Uninstall => {
                StagePolicy::Degrade
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lease => "lease",
            Self::ToolCheck => "tool-check",
            Self::TargetCheck => "target-check",
            Self::DeviceReady => "device-ready",
            Self::Install => "install",
            Self::Inspect => "inspect",
            Self::ClearTelemetry => "clear-telemetry",
            Self::Fuzz => "fuzz",
            Self::Monitor => "monitor",
            Self::Uninstall => "uninstall",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ToolCheck,
    DeviceReady,
    Installed,
    Inspected,
    Fuzzed,
    Monitored,
    Extracted,
    Cleaned,
    Done,
    Failed(Stage),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::ToolCheck => f.write_str("tool-check"),
            Self::DeviceReady => f.write_str("device-ready"),
            Self::Installed => f.write_str("installed"),
            Self::Inspected => f.write_str("inspected"),
            Self::Fuzzed => f.write_str("fuzzed"),
            Self::Monitored => f.write_str("monitored"),
            Self::Extracted => f.write_str("extracted"),
            Self::Cleaned => f.write_str("cleaned"),
            Self::Done => f.write_str("done"),
            Self::Failed(stage) => write!(f, "failed({})", stage),
        }
    }
}

/// Parameters of one `analyze` call. Lives only as long as the call.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    pub device: DeviceIdentity,
    pub target: PathBuf,
    pub event_count: u32,
    pub duration: Duration,
}

/// Per call overrides of the configured session values
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOverrides {
    pub duration: Option<Duration>,
    pub event_count: Option<u32>,
}

/// The only thing callers of [Orchestrator::analyze] ever see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisResult {
    Success {
        package_name: PackageIdentifier,
        apk_file: String,
        /// Monitor window in seconds
        duration: u64,
        behavior: BehaviorProfile,
        stage_log: Vec<String>,
    },
    Failed {
        stage: Stage,
        error: String,
        stage_log: Vec<String>,
    },
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Self::Failed { stage, .. } => Some(*stage),
            Self::Success { .. } => None,
        }
    }

    pub fn behavior(&self) -> Option<&BehaviorProfile> {
        match self {
            Self::Success { behavior, .. } => Some(behavior),
            Self::Failed { .. } => None,
        }
    }

    pub fn stage_log(&self) -> &[String] {
        match self {
            Self::Success { stage_log, .. } | Self::Failed { stage_log, .. } => stage_log,
        }
    }
}

struct StageFailure {
    stage: Stage,
    error: crate::Error,
}

/// Forwards events to the caller's monitor while keeping the stage log and
/// current state for the result.
struct SessionRun<'m> {
    outer: &'m dyn EventMonitor<AnalysisEvent>,
    log: Mutex<Vec<String>>,
    state: Mutex<SessionState>,
}

impl<'m> SessionRun<'m> {
    fn new(outer: &'m dyn EventMonitor<AnalysisEvent>) -> Self {
        Self {
            outer,
            log: Mutex::new(Vec::new()),
            state: Mutex::new(SessionState::Idle),
        }
    }

    fn advance(&self, next: SessionState) {
        if let Ok(mut state) = self.state.lock() {
            log::info!("session {} -> {}", *state, next);
            *state = next;
        }
        self.on_event(AnalysisEvent::StateChanged(next));
    }

    fn into_log(self) -> Vec<String> {
        self.log.into_inner().unwrap_or_default()
    }

    /// Run a stage, applying its [StagePolicy] to any error. `Ok(None)` means
    /// the stage failed and was degraded.
    fn stage<T>(
        &self,
        stage: Stage,
        f: impl FnOnce() -> crate::Result<T>,
    ) -> Result<Option<T>, StageFailure> {
        match f() {
            Ok(v) => Ok(Some(v)),
            Err(error) => match stage.policy() {
                StagePolicy::Abort => Err(StageFailure { stage, error }),
                StagePolicy::Degrade => {
                    log::warn!("{} degraded: {}", stage, error);
                    self.on_event(AnalysisEvent::Degraded {
                        stage,
                        reason: error.to_string(),
                    });
                    Ok(None)
                }
            },
        }
    }

    /// Run a stage whose output the rest of the pipeline depends on
    fn required<T>(
        &self,
        stage: Stage,
        f: impl FnOnce() -> crate::Result<T>,
    ) -> Result<T, StageFailure> {
        debug_assert_eq!(stage.policy(), StagePolicy::Abort);
        f().map_err(|error| StageFailure { stage, error })
    }
}

impl<'m> EventMonitor<AnalysisEvent> for SessionRun<'m> {
    fn on_event(&self, evt: AnalysisEvent) {
        // State changes are bookkeeping, keep them out of the stage log
        if !matches!(evt, AnalysisEvent::StateChanged(_)) {
            if let Ok(mut log) = self.log.lock() {
                log.push(evt.to_string());
            }
        }
        self.outer.on_event(evt);
    }
}

struct SessionOutput {
    package: PackageIdentifier,
    behavior: BehaviorProfile,
}

/// Composes the pipeline components into analysis sessions against one device.
///
/// The device is whatever the [Adb] implementation is bound to. Sessions on
/// the same device are serialized by a [DeviceLease]; a concurrent second
/// session fails at the lease stage.
pub struct Orchestrator {
    adb: Box<dyn Adb>,
    emulator: Box<dyn Emulator>,
    inspector: Box<dyn PackageInspector>,
    config: AnalysisConfig,
    monitor: Box<dyn EventMonitor<AnalysisEvent>>,
}

impl Orchestrator {
    pub fn new(
        adb: Box<dyn Adb>,
        emulator: Box<dyn Emulator>,
        inspector: Box<dyn PackageInspector>,
        config: AnalysisConfig,
    ) -> Self {
        if adb.device() != &config.serial {
            log::warn!(
                "configured serial {} differs from adb device {}, using the latter",
                config.serial,
                adb.device()
            );
        }
        Self {
            adb,
            emulator,
            inspector,
            config,
            monitor: Box::new(NoopMonitor::new()),
        }
    }

    /// Wire up the external tools found through the context. Missing
    /// binaries are not an error here; the session reports them.
    pub fn from_context(ctx: &dyn Context, config: AnalysisConfig) -> Self {
        let adb = ExecAdb::builder(ctx)
            .with_device(config.serial.clone())
            .build();
        let emulator = ExecEmulator::new(ctx);
        let inspector = ExecAapt::new(ctx, config.timeouts.inspect);
        Self::new(
            Box::new(adb),
            Box::new(emulator),
            Box::new(inspector),
            config,
        )
    }

    pub fn with_monitor(mut self, monitor: Box<dyn EventMonitor<AnalysisEvent>>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn device(&self) -> &DeviceIdentity {
        self.adb.device()
    }

    /// Controller for the device on its own, outside any session
    pub fn emulator_controller(&self) -> EmulatorController<'_> {
        EmulatorController::new(
            self.adb.as_ref(),
            self.emulator.as_ref(),
            &self.config.emulator_name,
            &self.config.timeouts,
            SettlePolicy::from_config(&self.config),
            self.monitor.as_ref(),
        )
    }

    pub fn inspector(&self) -> &dyn PackageInspector {
        self.inspector.as_ref()
    }

    /// Run one session with the configured duration and event count
    pub fn analyze(&self, apk: &Path) -> AnalysisResult {
        self.analyze_with(apk, SessionOverrides::default())
    }

    pub fn analyze_with(&self, apk: &Path, overrides: SessionOverrides) -> AnalysisResult {
        let session = AnalysisSession {
            device: self.adb.device().clone(),
            target: apk.to_path_buf(),
            event_count: overrides.event_count.unwrap_or(self.config.event_count),
            duration: overrides.duration.unwrap_or(self.config.duration),
        };
        let run = SessionRun::new(self.monitor.as_ref());
        run.on_event(AnalysisEvent::SessionStarted {
            apk: file_name_lossy(apk),
            device: session.device.clone(),
        });

        match self.run_pipeline(&session, &run) {
            Ok(out) => {
                run.advance(SessionState::Done);
                AnalysisResult::Success {
                    package_name: out.package,
                    apk_file: file_name_lossy(&session.target),
                    duration: session.duration.as_secs(),
                    behavior: out.behavior,
                    stage_log: run.into_log(),
                }
            }
            Err(StageFailure { stage, error }) => {
                log::error!("{} failed: {}", stage, error);
                let reason = error.to_string();
                run.on_event(AnalysisEvent::Failed {
                    stage,
                    reason: reason.clone(),
                });
                run.advance(SessionState::Failed(stage));
                AnalysisResult::Failed {
                    stage,
                    error: reason,
                    stage_log: run.into_log(),
                }
            }
        }
    }

    fn run_pipeline(
        &self,
        session: &AnalysisSession,
        run: &SessionRun,
    ) -> Result<SessionOutput, StageFailure> {
        let adb = self.adb.as_ref();
        let timeouts = &self.config.timeouts;
        let controller = EmulatorController::new(
            adb,
            self.emulator.as_ref(),
            &self.config.emulator_name,
            timeouts,
            SettlePolicy::from_config(&self.config),
            run,
        );

        // Held until the session returns
        let _lease = run.required(Stage::Lease, || DeviceLease::acquire(&session.device))?;

        run.advance(SessionState::ToolCheck);
        run.required(Stage::ToolCheck, || {
            if controller.is_tool_available() {
                Ok(())
            } else {
                Err(crate::Error::ToolUnavailable("adb".into()))
            }
        })?;
        run.required(Stage::TargetCheck, || {
            if session.target.is_file() {
                Ok(())
            } else {
                Err(crate::Error::TargetNotFound(session.target.clone()))
            }
        })?;

        run.required(Stage::DeviceReady, || controller.ensure_device())?;
        run.advance(SessionState::DeviceReady);

        let installer = InstallManager::new(adb, timeouts, run);
        run.required(Stage::Install, || installer.install(&session.target))?;
        run.advance(SessionState::Installed);

        // No uninstall if this fails, there is no name to uninstall by
        let package = run.required(Stage::Inspect, || {
            self.inspector
                .extract_package_identifier(&session.target)
                .ok_or_else(|| crate::Error::IdentifierExtractionFailure(session.target.clone()))
        })?;
        run.on_event(AnalysisEvent::PackageDetected(package.clone()));
        run.advance(SessionState::Inspected);

        let driver = FuzzDriver::new(adb, timeouts, run);
        run.stage(Stage::ClearTelemetry, || driver.clear_telemetry())?;
        run.stage(Stage::Fuzz, || driver.fuzz(&package, session.event_count))?;
        run.advance(SessionState::Fuzzed);

        let collector = TelemetryCollector::new(adb, timeouts, run);
        let buffer = run
            .stage(Stage::Monitor, || collector.collect(session.duration))?
            .unwrap_or_else(TelemetryBuffer::empty);
        run.advance(SessionState::Monitored);

        let behavior = behavior::extract(buffer);
        run.on_event(AnalysisEvent::BehaviorSummary(behavior.to_string()));
        run.advance(SessionState::Extracted);

        run.stage(Stage::Uninstall, || installer.try_uninstall(&package))?;
        run.advance(SessionState::Cleaned);

        Ok(SessionOutput { package, behavior })
    }
}
