use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context as AnyhowContext};
use clap::{self, Args};

use apkprobe::behavior;
use apkprobe::package::{ExecAapt, PackageInspector};
use apkprobe::telemetry::TelemetryBuffer;
use apkprobe::utils::read_file;
use apkprobe::{AnalysisConfig, DefaultContext};

#[derive(Args)]
pub struct PackageName {
    /// The APK to inspect
    apk: PathBuf,
}

impl PackageName {
    pub fn run(&self, ctx: &DefaultContext) -> anyhow::Result<()> {
        let cfg = AnalysisConfig::load(ctx)?;
        let aapt = ExecAapt::new(ctx, cfg.timeouts.inspect);
        match aapt.extract_package_identifier(&self.apk) {
            Some(pkg) => {
                println!("{}", pkg);
                Ok(())
            }
            None => bail!("failed to get a package name from {}", self.apk.display()),
        }
    }
}

#[derive(Args)]
pub struct Extract {
    /// A saved logcat dump, or `-` for stdin
    log: String,

    /// Pretty print the JSON profile
    #[arg(short, long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    pretty: bool,
}

impl Extract {
    pub fn run(&self) -> anyhow::Result<()> {
        let text = if self.log == "-" {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .with_context(|| "reading stdin")?;
            String::from_utf8_lossy(&buf).into_owned()
        } else {
            read_file(&PathBuf::from(&self.log))?
        };

        let profile = behavior::extract(TelemetryBuffer::new(text));
        let json = if self.pretty {
            serde_json::to_string_pretty(&profile)?
        } else {
            serde_json::to_string(&profile)?
        };
        println!("{}", json);
        Ok(())
    }
}
