use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Mutex;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// The serial of exactly one device as understood by `adb -s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub const DEFAULT_SERIAL: &'static str = "emulator-5554";

    pub fn new<S: Into<String>>(serial: S) -> Self {
        Self(serial.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks whether `adb devices` output lists this device.
    ///
    /// Only the serial column of each line is considered so
    /// `emulator-5554` doesn't match `emulator-55540`.
    pub fn listed_in(&self, devices_output: &str) -> bool {
        devices_output
            .lines()
            .filter_map(|l| l.split_ascii_whitespace().next())
            .any(|serial| serial == self.0)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SERIAL)
    }
}

impl Display for DeviceIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

lazy_static! {
    static ref LEASED: Mutex<HashSet<DeviceIdentity>> = Mutex::new(HashSet::new());
}

/// Exclusive claim on a device for the lifetime of one session.
///
/// Only guards against sessions within this process; another process
/// driving the same serial is not detected.
#[derive(Debug)]
pub struct DeviceLease {
    device: DeviceIdentity,
}

impl DeviceLease {
    pub fn acquire(device: &DeviceIdentity) -> crate::Result<Self> {
        let mut leased = LEASED
            .lock()
            .map_err(|_| crate::Error::new_generic("device lease registry poisoned"))?;
        if !leased.insert(device.clone()) {
            return Err(crate::Error::DeviceBusy(device.to_string()));
        }
        log::trace!("leased device {}", device);
        Ok(Self {
            device: device.clone(),
        })
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.device
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        if let Ok(mut leased) = LEASED.lock() {
            leased.remove(&self.device);
            log::trace!("released device {}", self.device);
        }
    }
}
