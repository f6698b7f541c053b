use std::path::Path;

use crate::adb::Adb;
use crate::config::Timeouts;
use crate::events::{AnalysisEvent, EventMonitor};
use crate::package::PackageIdentifier;
use crate::utils::{file_name_lossy, path_str};

pub struct InstallManager<'a> {
    adb: &'a dyn Adb,
    timeouts: &'a Timeouts,
    monitor: &'a dyn EventMonitor<AnalysisEvent>,
}

impl<'a> InstallManager<'a> {
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

    /// `adb install -r`. A non-zero exit becomes [crate::Error::InstallFailure]
    /// carrying adb's diagnostic output.
    pub fn install(&self, apk: &Path) -> crate::Result<()> {
        let out = self
            .adb
            .install(&path_str(apk), Some(self.timeouts.install))?;

        if !out.ok() {
            // adb reports `Failure [INSTALL_...]` on stdout for some versions
            let stderr = out.stderr_utf8_lossy();
            let diag = if stderr.trim().is_empty() {
                out.stdout_utf8_lossy().trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(crate::Error::InstallFailure(diag));
        }

        self.monitor.on_event(AnalysisEvent::Installed {
            apk: file_name_lossy(apk),
        });
        Ok(())
    }

    /// `adb uninstall`, failing on a non-zero exit
    pub fn try_uninstall(&self, package: &PackageIdentifier) -> crate::Result<()> {
        self.adb
            .uninstall(package.as_str(), Some(self.timeouts.uninstall))?
            .err_on_status()?;
        self.monitor
            .on_event(AnalysisEvent::Uninstalled(package.clone()));
        Ok(())
    }

    /// Best effort uninstall, failures are only logged.
    ///
    /// Convenience for callers outside a session; [crate::Orchestrator] calls
    /// [InstallManager::try_uninstall] and reports the degradation itself.
    pub fn uninstall(&self, package: &PackageIdentifier) {
        if let Err(e) = self.try_uninstall(package) {
            log::warn!("failed to uninstall {}: {}", package, e);
        }
    }
}
