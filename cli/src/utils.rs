use anyhow::Context as AnyhowContext;
use clap::{self, Args};

use apkprobe::{AnalysisConfig, Context, DeviceIdentity};

/// Device selection shared by the commands that talk to a device
#[derive(Args, Default)]
pub struct DeviceArgs {
    /// Serial of the device to use, overrides `ANDROID_SERIAL`
    #[arg(long)]
    pub serial: Option<String>,

    /// Emulator image to boot if the device is offline, overrides
    /// `EMULATOR_NAME`
    #[arg(long)]
    pub avd: Option<String>,
}

impl DeviceArgs {
    /// Defaults, then the config file, then the environment, then these flags
    pub fn load_config(&self, ctx: &dyn Context) -> anyhow::Result<AnalysisConfig> {
        let mut cfg = AnalysisConfig::load(ctx).with_context(|| "loading configuration")?;
        self.apply(&mut cfg);
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut AnalysisConfig) {
        if let Some(serial) = &self.serial {
            cfg.serial = DeviceIdentity::new(serial.as_str());
        }
        if let Some(avd) = &self.avd {
            cfg.emulator_name = avd.clone();
        }
    }
}
