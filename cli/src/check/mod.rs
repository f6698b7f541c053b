use std::fmt;

use clap::{self, Args};

use apkprobe::{AnalysisConfig, Context, DefaultContext, Orchestrator};

#[derive(Args)]
pub struct RunCheck {
    /// Skip checking the bridge and the configured device
    #[arg(long, action = clap::ArgAction::SetTrue, default_value_t = false)]
    skip_device: bool,
}

enum Importance {
    Optional,
    Required,
}

enum Status {
    Missing,
    Exists(String),
}

struct Info {
    name: String,
    status: Status,
    importance: Importance,
}

impl Info {
    fn is_fatal(&self) -> bool {
        matches!(
            (&self.status, &self.importance),
            (Status::Missing, Importance::Required)
        )
    }
}

fn check_bin(ctx: &dyn Context, bin: &str, importance: Importance) -> Info {
    let status = match ctx.maybe_get_bin(bin) {
        None => Status::Missing,
        Some(path) => Status::Exists(path),
    };

    Info {
        name: bin.into(),
        status,
        importance,
    }
}

/// Either of the packaging tools will do
fn check_aapt(ctx: &dyn Context) -> Info {
    let status = ["aapt", "aapt2"]
        .iter()
        .find_map(|b| ctx.maybe_get_bin(b))
        .map_or(Status::Missing, Status::Exists);
    Info {
        name: "aapt|aapt2".into(),
        status,
        importance: Importance::Required,
    }
}

fn check_env(ctx: &dyn Context, env: &str) -> Info {
    let status = match ctx.maybe_get_env(env) {
        None => Status::Missing,
        Some(env) => Status::Exists(env),
    };

    Info {
        name: env.into(),
        status,
        importance: Importance::Optional,
    }
}

#[cfg(feature = "emoji")]
mod status {
    pub const FAIL: &'static str = "❌";
    pub const OK: &'static str = "✅";
    pub const MEH: &'static str = "➖";
}

#[cfg(not(feature = "emoji"))]
mod status {
    pub const FAIL: &'static str = "Fail";
    pub const OK: &'static str = "Ok";
    pub const MEH: &'static str = "Meh";
}

use status::*;

impl RunCheck {
    pub fn run(&self, ctx: &DefaultContext) -> anyhow::Result<()> {
        let mut checks = vec![
            check_bin(ctx, "adb", Importance::Required),
            check_bin(ctx, "emulator", Importance::Optional),
            check_aapt(ctx),
        ];

        println!("External programs:");
        #[cfg(feature = "emoji")]
        {
            println!("\n{} = Program present in PATH", OK);
            println!("{} = Required and missing", FAIL);
            println!("{} = Optional and missing\n", MEH);
        }
        for c in checks.iter() {
            println!("{}", c);
        }
        let fatal = checks.iter().any(Info::is_fatal);

        checks.clear();
        println!("\nEnvironmental variables:\n");
        for it in &[
            "ANDROID_HOME",
            "ANDROID_SERIAL",
            "EMULATOR_NAME",
            "DYNAMIC_DURATION",
            "APKPROBE_CONFIG",
        ] {
            checks.push(check_env(ctx, it));
        }
        for c in checks.iter() {
            println!("{}", c);
        }

        if !self.skip_device {
            self.check_device(ctx)?;
        }

        if fatal {
            anyhow::bail!("required programs are missing");
        }
        Ok(())
    }

    fn check_device(&self, ctx: &DefaultContext) -> anyhow::Result<()> {
        let cfg = AnalysisConfig::load(ctx)?;
        let orch = Orchestrator::from_context(ctx, cfg);
        let ctl = orch.emulator_controller();

        println!("\nDevice:\n");
        let tool = ctl.is_tool_available();
        println!("{}: adb responds", if tool { OK } else { FAIL });
        if tool {
            let online = ctl.is_device_online();
            println!(
                "{}: {} online",
                if online { OK } else { MEH },
                orch.device()
            );
        }
        Ok(())
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.status {
            Status::Missing => {
                write!(
                    f,
                    "{}: {}",
                    match self.importance {
                        Importance::Optional => MEH,
                        Importance::Required => FAIL,
                    },
                    self.name
                )
            }
            Status::Exists(path) => {
                write!(f, "{}: {} ({})", OK, self.name, path)
            }
        }
    }
}
