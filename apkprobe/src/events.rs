use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};

use crate::analysis::{SessionState, Stage};
use crate::device::DeviceIdentity;
use crate::package::PackageIdentifier;

/// Narration emitted while a session runs. Components report what they are
/// doing through an [EventMonitor] instead of printing.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    SessionStarted { apk: String, device: DeviceIdentity },
    StateChanged(SessionState),
    DeviceOnline(DeviceIdentity),
    EmulatorLaunching { avd: String },
    WaitingForDevice(DeviceIdentity),
    /// `verified` is false when the settle wait ran out without observing
    /// boot completion
    DeviceSettled { verified: bool },
    Installed { apk: String },
    PackageDetected(PackageIdentifier),
    FuzzStarted { package: PackageIdentifier, events: u32 },
    FuzzFinished { exit_ok: bool, events_injected: Option<u32> },
    Monitoring(Duration),
    TelemetryCollected { chars: usize },
    BehaviorSummary(String),
    Uninstalled(PackageIdentifier),
    Degraded { stage: Stage, reason: String },
    Failed { stage: Stage, reason: String },
}

impl Display for AnalysisEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStarted { apk, device } => {
                write!(f, "Starting dynamic analysis for {} on {}", apk, device)
            }
            Self::StateChanged(state) => write!(f, "State: {}", state),
            Self::DeviceOnline(dev) => write!(f, "Using device {}", dev),
            Self::EmulatorLaunching { avd } => write!(f, "Starting emulator {}", avd),
            Self::WaitingForDevice(dev) => write!(f, "Waiting for {} to boot", dev),
            Self::DeviceSettled { verified: true } => write!(f, "Device boot completed"),
            Self::DeviceSettled { verified: false } => {
                write!(f, "Settle interval elapsed, boot completion not confirmed")
            }
            Self::Installed { apk } => write!(f, "Installed {}", apk),
            Self::PackageDetected(pkg) => write!(f, "Detected package name: {}", pkg),
            Self::FuzzStarted { package, events } => {
                write!(f, "Launching monkey for {} ({} events)", package, events)
            }
            Self::FuzzFinished {
                exit_ok,
                events_injected,
            } => {
                write!(f, "Fuzzing complete")?;
                if let Some(n) = events_injected {
                    write!(f, ", {} events injected", n)?;
                }
                if !exit_ok {
                    write!(f, " (monkey exited non-zero)")?;
                }
                Ok(())
            }
            Self::Monitoring(d) => write!(f, "Monitoring app for {} seconds", d.as_secs()),
            Self::TelemetryCollected { chars } => write!(f, "Collected {} log characters", chars),
            Self::BehaviorSummary(summary) => write!(f, "Behavior summary: {}", summary),
            Self::Uninstalled(pkg) => write!(f, "Uninstalled {}", pkg),
            Self::Degraded { stage, reason } => write!(f, "{} degraded: {}", stage, reason),
            Self::Failed { stage, reason } => write!(f, "{} failed: {}", stage, reason),
        }
    }
}

pub trait EventMonitor<T>: Send + Sync {
    fn on_event(&self, evt: T);
}

impl<U> EventMonitor<U> for Box<dyn EventMonitor<U>> {
    fn on_event(&self, evt: U) {
        self.as_ref().on_event(evt)
    }
}

impl<T, U> EventMonitor<U> for Box<T>
where
    T: EventMonitor<U>,
{
    fn on_event(&self, evt: U) {
        self.as_ref().on_event(evt)
    }
}

/// An [EventMonitor] that is just a noop
pub struct NoopMonitor;

impl<T> EventMonitor<T> for NoopMonitor {
    fn on_event(&self, _evt: T) {
        // noop
    }
}

impl NoopMonitor {
    pub fn new() -> Self {
        Self {}
    }
}

/// Forwards every event to the `log` facade at info level
pub struct LogMonitor;

impl<T: Display> EventMonitor<T> for LogMonitor {
    fn on_event(&self, evt: T) {
        log::info!("{}", evt);
    }
}

/// An [EventMonitor] that just dumps the events onto a channel.
pub struct ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    chan: Sender<T>,
}

impl<T> ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    pub fn create() -> (Self, Receiver<T>) {
        Self::create_with_bound(16)
    }

    pub fn create_with_bound(bound: usize) -> (Self, Receiver<T>) {
        let (tx, rx) = bounded(bound);
        (Self::new(tx), rx)
    }

    /// Never blocks the emitting side, for consumers that drain after the fact
    pub fn create_unbounded() -> (Self, Receiver<T>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    pub fn new(chan: Sender<T>) -> Self {
        Self { chan }
    }
}

impl<T> EventMonitor<T> for ChannelEventMonitor<T>
where
    T: Sync + Send,
{
    fn on_event(&self, evt: T) {
        let _ = self.chan.send(evt);
    }
}
