use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::{self, Args};

use apkprobe::analysis::SessionOverrides;
use apkprobe::events::LogMonitor;
use apkprobe::{AnalysisResult, DefaultContext, Orchestrator};

use crate::printer::{EventPrinter, Printer};
use crate::utils::DeviceArgs;

#[derive(Args)]
pub struct Analyze {
    /// The APK to analyze
    apk: PathBuf,

    /// Seconds to watch the app after fuzzing
    #[arg(short, long)]
    duration: Option<u64>,

    /// Number of monkey events to inject
    #[arg(short = 'n', long)]
    events: Option<u32>,

    /// Pretty print the JSON result
    #[arg(short, long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    pretty: bool,

    /// Send progress to the log instead of stderr
    #[arg(short, long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    quiet: bool,

    #[command(flatten)]
    device: DeviceArgs,
}

impl Analyze {
    pub fn run(&self, ctx: &DefaultContext) -> anyhow::Result<()> {
        let cfg = self.device.load_config(ctx)?;
        let overrides = self.overrides();
        log::info!(
            "analyzing {} on {}, session bound {:?}",
            self.apk.display(),
            cfg.serial,
            cfg.timeouts
                .session_bound(overrides.duration.unwrap_or(cfg.duration))
        );

        let orch = Orchestrator::from_context(ctx, cfg);
        let orch = if self.quiet {
            orch.with_monitor(Box::new(LogMonitor))
        } else {
            orch.with_monitor(Box::new(EventPrinter::new(Printer::stderr())))
        };

        let res = orch.analyze_with(&self.apk, overrides);
        let json = if self.pretty {
            serde_json::to_string_pretty(&res)?
        } else {
            serde_json::to_string(&res)?
        };
        println!("{}", json);

        match res {
            AnalysisResult::Success { .. } => Ok(()),
            AnalysisResult::Failed { stage, error, .. } => {
                bail!("analysis failed at {}: {}", stage, error)
            }
        }
    }

    fn overrides(&self) -> SessionOverrides {
        SessionOverrides {
            duration: self.duration.map(Duration::from_secs),
            event_count: self.events,
        }
    }
}
