use clap::{self, Args};

use apkprobe::emulator::BootOutcome;
use apkprobe::{DefaultContext, Orchestrator};

use crate::printer::{EventPrinter, Printer, SUCCESS_MARKER};
use crate::utils::DeviceArgs;

#[derive(Args)]
pub struct EnsureDevice {
    #[command(flatten)]
    device: DeviceArgs,
}

impl EnsureDevice {
    pub fn run(&self, ctx: &DefaultContext) -> anyhow::Result<()> {
        let cfg = self.device.load_config(ctx)?;
        let orch = Orchestrator::from_context(ctx, cfg)
            .with_monitor(Box::new(EventPrinter::new(Printer::stderr())));
        let ctl = orch.emulator_controller();

        if !ctl.is_tool_available() {
            anyhow::bail!("adb is not available");
        }

        let printer = Printer::new();
        match ctl.ensure_device()? {
            BootOutcome::AlreadyOnline => {
                printer.println(format!("{} {} already online", SUCCESS_MARKER, orch.device()))
            }
            BootOutcome::Booted { verified } => printer.println(format!(
                "{} {} booted{}",
                SUCCESS_MARKER,
                orch.device(),
                if verified { "" } else { " (boot completion not confirmed)" }
            )),
        }
        Ok(())
    }
}
