use clap::{self, Args};

use apkprobe::{Context, DefaultContext};

use crate::utils::DeviceArgs;

#[derive(Args)]
pub struct ShowConfig {
    #[command(flatten)]
    device: DeviceArgs,
}

impl ShowConfig {
    pub fn run(&self, ctx: &DefaultContext) -> anyhow::Result<()> {
        let file = ctx.get_config_file()?;
        if file.exists() {
            eprintln!("# from {}", file.display());
        } else {
            eprintln!("# {} not found, defaults and environment only", file.display());
        }
        let cfg = self.device.load_config(ctx)?;
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        eprintln!("# session bound {}s", cfg.session_bound().as_secs());
        Ok(())
    }
}
