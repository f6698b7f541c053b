use std::thread;
use std::time::{Duration, Instant};

use crate::adb::Adb;
use crate::command::spawn_detached;
use crate::config::{AnalysisConfig, SettleMode, Timeouts};
use crate::events::{AnalysisEvent, EventMonitor};
use crate::Context;

/// Starts emulator images
pub trait Emulator: Send + Sync {
    /// Launch the named AVD without loading a saved snapshot. Returns as soon
    /// as the process is spawned.
    fn launch(&self, avd: &str) -> crate::Result<()>;
}

/// An [Emulator] that runs the SDK `emulator` binary
pub struct ExecEmulator {
    bin: String,
}

impl ExecEmulator {
    pub fn new(ctx: &dyn Context) -> Self {
        let bin = ctx
            .maybe_get_bin("emulator")
            .unwrap_or_else(|| "emulator".into());
        Self { bin }
    }
}

impl Emulator for ExecEmulator {
    fn launch(&self, avd: &str) -> crate::Result<()> {
        // The child is intentionally not waited on, the emulator outlives the
        // session
        let child = spawn_detached(&self.bin, &["-avd", avd, "-no-snapshot-load"])?;
        log::debug!("emulator started with pid {}", child.id());
        Ok(())
    }
}

/// What to do once the bridge reports the device connected.
///
/// Bridge connectivity comes before the OS finishes booting, so some wait is
/// needed either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlePolicy {
    /// Sleep for a fixed interval
    Fixed(Duration),
    /// Poll `sys.boot_completed` every `poll` until it reads `1` or `timeout`
    /// passes
    BootCompleted { timeout: Duration, poll: Duration },
}

impl SettlePolicy {
    pub fn from_config(cfg: &AnalysisConfig) -> Self {
        match cfg.settle_mode {
            SettleMode::Fixed => Self::Fixed(cfg.timeouts.settle),
            SettleMode::BootCompleted => Self::BootCompleted {
                timeout: cfg.timeouts.settle,
                poll: cfg.timeouts.boot_poll,
            },
        }
    }

    /// Wait according to the policy. Returns true if boot completion was
    /// observed; a fixed wait never observes anything.
    ///
    /// Never fails: running out of time only means the device may still be
    /// booting.
    pub fn wait(&self, adb: &dyn Adb, probe_timeout: Duration) -> bool {
        match *self {
            Self::Fixed(d) => {
                if !d.is_zero() {
                    thread::sleep(d);
                }
                false
            }
            Self::BootCompleted { timeout, poll } => {
                // Out of range means no deadline, poll until boot completes
                let deadline = Instant::now().checked_add(timeout);
                loop {
                    match adb.getprop("sys.boot_completed", Some(probe_timeout)) {
                        Ok(v) if v == "1" => return true,
                        Ok(v) => log::trace!("sys.boot_completed = {:?}", v),
                        Err(e) => log::debug!("boot completion probe failed: {}", e),
                    }
                    let step = poll.max(Duration::from_millis(100));
                    let step = match deadline {
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return false;
                            }
                            step.min(deadline - now)
                        }
                        None => step,
                    };
                    thread::sleep(step);
                }
            }
        }
    }
}

/// How [EmulatorController::ensure_device] got a usable device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    AlreadyOnline,
    Booted { verified: bool },
}

/// Makes sure the session's device is online, booting an emulator if needed.
pub struct EmulatorController<'a> {
    adb: &'a dyn Adb,
    emulator: &'a dyn Emulator,
    avd: &'a str,
    timeouts: &'a Timeouts,
    settle: SettlePolicy,
    monitor: &'a dyn EventMonitor<AnalysisEvent>,
}

impl<'a> EmulatorController<'a> {
    pub fn new(
        adb: &'a dyn Adb,
        emulator: &'a dyn Emulator,
        avd: &'a str,
        timeouts: &'a Timeouts,
        settle: SettlePolicy,
        monitor: &'a dyn EventMonitor<AnalysisEvent>,
    ) -> Self {
        Self {
            adb,
            emulator,
            avd,
            timeouts,
            settle,
            monitor,
        }
    }

    /// Whether the bridge binary runs at all
    pub fn is_tool_available(&self) -> bool {
        match self.adb.version(Some(self.timeouts.tool_check)) {
            Ok(_) => true,
            Err(e) => {
                log::debug!("adb version failed: {}", e);
                false
            }
        }
    }

    /// Whether `adb devices` lists the session's device
    pub fn is_device_online(&self) -> bool {
        match self.adb.devices(Some(self.timeouts.device_list)) {
            Ok(out) => self.adb.device().listed_in(&out.stdout_utf8_lossy()),
            Err(e) => {
                log::debug!("adb devices failed: {}", e);
                false
            }
        }
    }

    /// Idempotent: does nothing if the device is already online. Otherwise
    /// launches the emulator, waits for the bridge to see it (bounded by the
    /// boot wait timeout) and then settles.
    pub fn ensure_device(&self) -> crate::Result<BootOutcome> {
        let device = self.adb.device();
        if self.is_device_online() {
            self.monitor.on_event(AnalysisEvent::DeviceOnline(device.clone()));
            return Ok(BootOutcome::AlreadyOnline);
        }

        self.monitor.on_event(AnalysisEvent::EmulatorLaunching {
            avd: self.avd.into(),
        });
        self.emulator.launch(self.avd)?;

        self.monitor
            .on_event(AnalysisEvent::WaitingForDevice(device.clone()));
        match self.adb.wait_for_device(Some(self.timeouts.boot_wait)) {
            Ok(_) => {}
            Err(e) if e.is_timeout() => {
                return Err(crate::Error::EmulatorBootTimeout {
                    serial: device.to_string(),
                    timeout: self.timeouts.boot_wait,
                })
            }
            Err(e) => return Err(e),
        }

        let verified = self.settle.wait(self.adb, self.timeouts.device_list);
        if !verified && matches!(self.settle, SettlePolicy::BootCompleted { .. }) {
            log::warn!("boot of {} not verified after settle wait", device);
        }
        self.monitor
            .on_event(AnalysisEvent::DeviceSettled { verified });
        Ok(BootOutcome::Booted { verified })
    }
}
