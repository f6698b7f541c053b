use lazy_static::lazy_static;
use regex::Regex;

use crate::adb::Adb;
use crate::config::Timeouts;
use crate::events::{AnalysisEvent, EventMonitor};
use crate::package::PackageIdentifier;

/// Options passed to `monkey`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonkeyOptions {
    pub event_count: u32,
    pub ignore_crashes: bool,
    pub ignore_timeouts: bool,
    pub monitor_native_crashes: bool,
    pub verbose: bool,
}

impl MonkeyOptions {
    pub fn new(event_count: u32) -> Self {
        Self {
            event_count,
            ignore_crashes: true,
            ignore_timeouts: true,
            monitor_native_crashes: true,
            verbose: true,
        }
    }

    /// The `adb shell` arguments for a monkey run against `package`
    pub fn shell_args(&self, package: &PackageIdentifier) -> Vec<String> {
        let mut args: Vec<String> = vec!["monkey".into(), "-p".into(), package.to_string()];
        if self.ignore_crashes {
            args.push("--ignore-crashes".into());
        }
        if self.ignore_timeouts {
            args.push("--ignore-timeouts".into());
        }
        if self.monitor_native_crashes {
            args.push("--monitor-native-crashes".into());
        }
        if self.verbose {
            args.push("-v".into());
        }
        args.push(self.event_count.to_string());
        args
    }
}

/// Outcome of a completed monkey run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzReport {
    pub exit_ok: bool,
    /// Parsed from monkey's `Events injected: N` line when present
    pub events_injected: Option<u32>,
}

lazy_static! {
    static ref EVENTS_INJECTED: Regex = Regex::new(r"Events injected:\s*(\d+)").unwrap();
}

fn parse_events_injected(output: &str) -> Option<u32> {
    EVENTS_INJECTED
        .captures_iter(output)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub struct FuzzDriver<'a> {
    adb: &'a dyn Adb,
    timeouts: &'a Timeouts,
    monitor: &'a dyn EventMonitor<AnalysisEvent>,
}

impl<'a> FuzzDriver<'a> {
    pub fn new(
        adb: &'a dyn Adb,
        timeouts: &'a Timeouts,
        monitor: &'a dyn EventMonitor<AnalysisEvent>,
    ) -> Self {
        Self {
            adb,
            timeouts,
            monitor,
        }
    }

    /// Clear the device log so the capture window starts with the fuzz run
    pub fn clear_telemetry(&self) -> crate::Result<()> {
        self.adb
            .logcat_clear(Some(self.timeouts.logcat_clear))?
            .err_on_status()?;
        Ok(())
    }

    /// Run monkey against `package`. A non-zero exit is reported in the
    /// [FuzzReport], only spawn failures and timeouts are errors.
    pub fn fuzz(&self, package: &PackageIdentifier, event_count: u32) -> crate::Result<FuzzReport> {
        self.monitor.on_event(AnalysisEvent::FuzzStarted {
            package: package.clone(),
            events: event_count,
        });
        let args = MonkeyOptions::new(event_count).shell_args(package);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.adb.shell(&arg_refs, Some(self.timeouts.fuzz))?;

        if !out.ok() {
            log::warn!(
                "monkey exited with {}: {}",
                out.status,
                out.stderr_utf8_lossy().trim()
            );
        }

        let report = FuzzReport {
            exit_ok: out.ok(),
            events_injected: parse_events_injected(&out.stdout_utf8_lossy()),
        };
        self.monitor.on_event(AnalysisEvent::FuzzFinished {
            exit_ok: report.exit_ok,
            events_injected: report.events_injected,
        });
        Ok(report)
    }

    /// Best effort clear followed by the monkey run. Returns true iff monkey
    /// exited zero.
    ///
    /// Convenience for callers outside a session. [crate::Orchestrator] runs
    /// [FuzzDriver::clear_telemetry] and [FuzzDriver::fuzz] as separate stages
    /// so each gets its own failure policy.
    pub fn launch_and_fuzz(
        &self,
        package: &PackageIdentifier,
        event_count: u32,
    ) -> crate::Result<bool> {
        if let Err(e) = self.clear_telemetry() {
            log::warn!("logcat clear failed, continuing anyway: {}", e);
        }
        self.fuzz(package, event_count).map(|r| r.exit_ok)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::NoopMonitor;
    use crate::testing::{Scripted, ScriptedAdb};

    const MONKEY_OUT: &str = "\
:Monkey: seed=1697712345 count=300
:AllowPackage: com.example.app
// Event percentages:
Events injected: 300
:Dropped: keys=0 pointers=0 trackballs=0 flips=0 rotations=0
## Network stats: elapsed time=4417ms
// Monkey finished
";

    fn pkg() -> PackageIdentifier {
        PackageIdentifier::new("com.example.app")
    }

    #[test]
    fn test_shell_args() {
        let args = MonkeyOptions::new(300).shell_args(&pkg());
        assert_eq!(
            args,
            vec![
                "monkey",
                "-p",
                "com.example.app",
                "--ignore-crashes",
                "--ignore-timeouts",
                "--monitor-native-crashes",
                "-v",
                "300"
            ]
        );
    }

    #[test]
    fn test_parse_events_injected() {
        assert_eq!(parse_events_injected(MONKEY_OUT), Some(300));
        assert_eq!(parse_events_injected("** No activities found to run, monkey aborted."), None);
    }

    #[test]
    fn test_clear_timeout_tolerated() {
        let adb = ScriptedAdb::new()
            .on(&["logcat", "-c"], Scripted::Timeout)
            .on(&["shell", "monkey"], Scripted::stdout(MONKEY_OUT));
        let timeouts = Timeouts::zero();
        let driver = FuzzDriver::new(&adb, &timeouts, &NoopMonitor);
        assert!(driver.launch_and_fuzz(&pkg(), 300).unwrap());
        let calls = adb.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec!["logcat", "-c"]);
        assert_eq!(calls[1][..4], ["shell", "monkey", "-p", "com.example.app"]);
    }

    #[test]
    fn test_nonzero_exit_reported() {
        let adb = ScriptedAdb::new().on(
            &["shell", "monkey"],
            Scripted::Exit {
                code: 252,
                stdout: "** No activities found to run, monkey aborted.".into(),
                stderr: String::new(),
            },
        );
        let timeouts = Timeouts::zero();
        let driver = FuzzDriver::new(&adb, &timeouts, &NoopMonitor);
        let report = driver.fuzz(&pkg(), 10).unwrap();
        assert!(!report.exit_ok);
        assert_eq!(report.events_injected, None);
    }

    #[test]
    fn test_fuzz_timeout_is_error() {
        let adb = ScriptedAdb::new().on(&["shell", "monkey"], Scripted::Timeout);
        let timeouts = Timeouts::zero();
        let driver = FuzzDriver::new(&adb, &timeouts, &NoopMonitor);
        assert!(driver.fuzz(&pkg(), 10).unwrap_err().is_timeout());
    }
}
