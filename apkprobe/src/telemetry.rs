use std::thread;
use std::time::Duration;

use crate::adb::Adb;
use crate::config::Timeouts;
use crate::events::{AnalysisEvent, EventMonitor};

/// Raw log text captured over one monitoring window.
///
/// Deliberately not `Clone`: a buffer is handed to the extractor once and
/// dropped.
#[derive(Debug, Default)]
pub struct TelemetryBuffer(String);

impl TelemetryBuffer {
    pub fn new(text: String) -> Self {
        Self(text)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of characters, not bytes
    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

pub struct TelemetryCollector<'a> {
    adb: &'a dyn Adb,
    timeouts: &'a Timeouts,
    monitor: &'a dyn EventMonitor<AnalysisEvent>,
}

impl<'a> TelemetryCollector<'a> {
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

    /// Sleep for `duration` then dump the device log.
    ///
    /// A dump that times out is reported as [crate::Error::TelemetryDumpTimeout].
    /// A non-zero exit still yields whatever was written to stdout.
    pub fn collect(&self, duration: Duration) -> crate::Result<TelemetryBuffer> {
        self.monitor.on_event(AnalysisEvent::Monitoring(duration));
        if !duration.is_zero() {
            thread::sleep(duration);
        }

        let out = match self.adb.logcat_dump(Some(self.timeouts.logcat_dump)) {
            Ok(v) => v,
            Err(e) if e.is_timeout() => {
                return Err(crate::Error::TelemetryDumpTimeout(self.timeouts.logcat_dump))
            }
            Err(e) => return Err(e),
        };
        if !out.ok() {
            log::warn!(
                "logcat dump exited with {}: {}",
                out.status,
                out.stderr_utf8_lossy().trim()
            );
        }

        let buffer = TelemetryBuffer::new(out.stdout_utf8_lossy().into_owned());
        self.monitor.on_event(AnalysisEvent::TelemetryCollected {
            chars: buffer.char_count(),
        });
        Ok(buffer)
    }

    /// Like [TelemetryCollector::collect], but any failure degrades to an
    /// empty buffer.
    ///
    /// Convenience for callers outside a session; [crate::Orchestrator] calls
    /// `collect` and reports the degradation itself.
    pub fn monitor(&self, duration: Duration) -> TelemetryBuffer {
        match self.collect(duration) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("returning empty telemetry: {}", e);
                TelemetryBuffer::empty()
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::NoopMonitor;
    use crate::testing::{Scripted, ScriptedAdb};

    #[test]
    fn test_collect() {
        let adb = ScriptedAdb::new().on(&["logcat", "-d"], Scripted::stdout("I Foo: https://x\n"));
        let timeouts = Timeouts::zero();
        let collector = TelemetryCollector::new(&adb, &timeouts, &NoopMonitor);
        let buf = collector.collect(Duration::ZERO).unwrap();
        assert_eq!(buf.as_str(), "I Foo: https://x\n");
        assert_eq!(adb.calls(), vec![vec!["logcat", "-d"]]);
    }

    #[test]
    fn test_dump_timeout() {
        let adb = ScriptedAdb::new().on(&["logcat", "-d"], Scripted::Timeout);
        let timeouts = Timeouts::zero();
        let collector = TelemetryCollector::new(&adb, &timeouts, &NoopMonitor);
        assert!(matches!(
            collector.collect(Duration::ZERO),
            Err(crate::Error::TelemetryDumpTimeout(_))
        ));
        assert!(collector.monitor(Duration::ZERO).is_empty());
    }

    #[test]
    fn test_nonzero_exit_keeps_stdout() {
        let adb = ScriptedAdb::new().on(
            &["logcat", "-d"],
            Scripted::Exit {
                code: 1,
                stdout: "partial".into(),
                stderr: "read: unexpected EOF!".into(),
            },
        );
        let timeouts = Timeouts::zero();
        let collector = TelemetryCollector::new(&adb, &timeouts, &NoopMonitor);
        assert_eq!(collector.monitor(Duration::ZERO).as_str(), "partial");
    }
}
