use std::sync::Arc;
use std::time::Duration;

use crate::command::{run_cmd_timeout, CmdOutput};
use crate::device::DeviceIdentity;
use crate::Context;

/// The Adb trait abstracts the `adb` commands used during an analysis.
///
/// Every command is bound to a single [DeviceIdentity]; implementations must
/// never issue a command without the `-s <serial>` selector. Only [Adb::run]
/// needs implementing, the named subcommands are built on top of it.
pub trait Adb: Send + Sync {
    /// The device every command is addressed to
    fn device(&self) -> &DeviceIdentity;

    /// Run `adb -s <serial> <args...>`, optionally bounded by `timeout`.
    ///
    /// No retries happen here.
    fn run(&self, args: &[&str], timeout: Option<Duration>) -> crate::Result<CmdOutput>;

    /// `adb version`, used to probe that the bridge binary works
    fn version(&self, timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.run(&["version"], timeout)
    }

    /// `adb devices`
    fn devices(&self, timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.run(&["devices"], timeout)
    }

    /// `adb wait-for-device`, blocks until the bridge sees the device
    fn wait_for_device(&self, timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.run(&["wait-for-device"], timeout)
    }

    /// Install the APK at the given path, replacing any existing install
    fn install(&self, apk: &str, timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.run(&["install", "-r", apk], timeout)
    }

    /// Uninstall the given package
    fn uninstall(&self, package: &str, timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.run(&["uninstall", package], timeout)
    }

    /// `adb logcat -c`
    fn logcat_clear(&self, timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.run(&["logcat", "-c"], timeout)
    }

    /// `adb logcat -d`
    fn logcat_dump(&self, timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.run(&["logcat", "-d"], timeout)
    }

    /// Essentially the same as running `adb shell ...` with each element of
    /// `shell_args` passed as its own argument
    fn shell(&self, shell_args: &[&str], timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        let mut args = Vec::with_capacity(shell_args.len() + 1);
        args.push("shell");
        args.extend_from_slice(shell_args);
        self.run(&args, timeout)
    }

    /// Read a single system property, trimmed
    fn getprop(&self, prop: &str, timeout: Option<Duration>) -> crate::Result<String> {
        let out = self.shell(&["getprop", prop], timeout)?.err_on_status()?;
        Ok(out.stdout_utf8_lossy().trim().to_string())
    }
}

impl<T: Adb + ?Sized> Adb for Box<T> {
    fn device(&self) -> &DeviceIdentity {
        self.as_ref().device()
    }

    fn run(&self, args: &[&str], timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.as_ref().run(args, timeout)
    }
}

impl<T: Adb + ?Sized> Adb for Arc<T> {
    fn device(&self) -> &DeviceIdentity {
        self.as_ref().device()
    }

    fn run(&self, args: &[&str], timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        self.as_ref().run(args, timeout)
    }
}

#[derive(Clone)]
/// An `Adb` implementation that just invokes the external `adb` command.
pub struct ExecAdb {
    bin: String,
    device: DeviceIdentity,
}

impl ExecAdb {
    /// Creates a new `ExecAdb` for `device`, resolving the `adb` binary
    /// through the context.
    pub fn new(ctx: &dyn Context, device: DeviceIdentity) -> crate::Result<Self> {
        let bin = ctx.get_bin("adb")?;
        Ok(Self { bin, device })
    }

    pub fn builder(ctx: &dyn Context) -> Builder {
        Builder::new_from_ctx(ctx)
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }
}

impl Adb for ExecAdb {
    fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    fn run(&self, args: &[&str], timeout: Option<Duration>) -> crate::Result<CmdOutput> {
        let mut full = Vec::with_capacity(args.len() + 2);
        full.push("-s");
        full.push(self.device.as_str());
        full.extend_from_slice(args);
        run_cmd_timeout(&self.bin, &full, timeout)
    }
}

/// Used to build an Adb implementation.
pub struct Builder {
    bin: String,
    device: DeviceIdentity,
}

impl Builder {
    /// Create a new builder from the given context. Falls back to `adb` on
    /// the PATH and the `ANDROID_SERIAL` device.
    pub fn new_from_ctx(ctx: &dyn Context) -> Self {
        let bin = ctx.maybe_get_bin("adb").unwrap_or_else(|| "adb".into());
        let device = ctx
            .maybe_get_env("ANDROID_SERIAL")
            .map(DeviceIdentity::new)
            .unwrap_or_default();

        Self { bin, device }
    }

    pub fn with_bin(mut self, bin: String) -> Self {
        self.bin = bin;
        self
    }

    pub fn with_device(mut self, device: DeviceIdentity) -> Self {
        self.device = device;
        self
    }

    /// Consume the builder and return an Adb implementation
    pub fn build(self) -> ExecAdb {
        ExecAdb {
            bin: self.bin,
            device: self.device,
        }
    }
}
