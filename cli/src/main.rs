use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::Context as AnyhowContext;
use clap::{Parser, Subcommand};
use flexi_logger::{FileSpec, LevelFilter, LogSpecification, Logger, LoggerHandle, WriteMode};

use apkprobe::{Context, DefaultContext};

mod printer;
mod utils;

mod analyze;
use analyze::Analyze;

mod check;
use check::RunCheck;

mod device;
use device::EnsureDevice;

mod inspect;
use inspect::{Extract, PackageName};

mod show_config;
use show_config::ShowConfig;

const SIMPLE_VERSION_STRING: &'static str =
    include!(concat!(env!("OUT_DIR"), "/simple_version_string"));
const VERSION_STRING: &'static str = include!(concat!(env!("OUT_DIR"), "/version_string"));

#[derive(Parser)]
#[command(name = "apkprobe")]
#[command(version(SIMPLE_VERSION_STRING))]
#[command(long_version(VERSION_STRING))]
struct Cli {
    /// `-e`, `--log-stderr`: Send logs to `stderr` instead of the log file
    #[arg(short = 'e', long, help = "Log to stderr instead of a file", action = clap::ArgAction::SetTrue, default_value_t = false)]
    log_stderr: bool,

    /// `-f`, `--log-file`: Path to the log file. Defaults to `log` in the
    /// output directory (`$APKPROBE_OUTPUT` or the user's local data dir)
    #[arg(short = 'f', long, help = "Send log output to the given file")]
    log_file: Option<PathBuf>,

    /// `-s`, `--log-spec`: A [flexi_logger](https://docs.rs/flexi_logger/latest/flexi_logger/struct.LogSpecification.html)
    /// log specification, takes precedence over `--log-level`
    #[arg(short = 's', long, help = "Log spec for flexi_logger")]
    log_spec: Option<String>,

    /// `-l`, `--log-level`: Set the log verbosity. Defaults to 0, which
    /// defers to `RUST_LOG`:
    ///
    /// | Value | Log Level |
    /// | ----- | --------- |
    /// | **0** | **from env** |
    /// | 1 | Info |
    /// | 2 | Debug |
    /// | 3 | Trace |
    #[arg(
        short = 'l',
        long,
        help = "Set the log level, 0 = env, 1 = info, etc",
        long_help = None,
        default_value_t = 0
    )]
    log_level: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the full version string and exit
    #[command()]
    Version,

    /// Run a full dynamic analysis session against an APK
    ///
    /// The device is booted if needed, the APK is installed, exercised with
    /// monkey, observed through logcat and uninstalled again. The result is
    /// printed as JSON; the exit code is non-zero if the session failed.
    #[command()]
    Analyze(Analyze),

    /// Check that the external programs are available
    #[command()]
    Check(RunCheck),

    /// Make sure the device is online, booting the emulator if needed
    #[command()]
    EnsureDevice(EnsureDevice),

    /// Print the package name of an APK
    #[command()]
    PackageName(PackageName),

    /// Extract a behavior profile from a saved log, `-` reads stdin
    #[command()]
    Extract(Extract),

    /// Show the effective configuration
    #[command()]
    Config(ShowConfig),
}

impl Cli {
    fn configure_loggers(&self, ctx: &DefaultContext) -> anyhow::Result<LoggerHandle> {
        let log_spec = match &self.log_spec {
            Some(s) => {
                LogSpecification::parse(s).with_context(|| format!("parsing log spec {}", s))?
            }
            None => match self.log_level {
                0 => LogSpecification::env().with_context(|| "getting log spec from env")?,
                1 => LogSpecification::builder()
                    .module("apkprobe", LevelFilter::Info)
                    .build(),
                2 => LogSpecification::builder()
                    .module("apkprobe", LevelFilter::Debug)
                    .build(),
                _ => LogSpecification::builder()
                    .module("apkprobe", LevelFilter::Trace)
                    .build(),
            },
        };

        let mut logger = Logger::with(log_spec);

        if !self.log_stderr {
            let path = match &self.log_file {
                Some(v) if v.is_absolute() => Some(Cow::Borrowed(v)),
                Some(v) => Some(Cow::Owned(std::env::current_dir()?.join(v))),
                None => ctx.get_output_dir_child("log").map(Cow::Owned).ok(),
            };

            if let Some(p) = &path {
                logger = logger
                    .log_to_file(
                        FileSpec::try_from(p.as_ref()).with_context(|| "creating filespec")?,
                    )
                    .append()
                    .write_mode(WriteMode::BufferAndFlush);
            }
        }

        Ok(logger.start().with_context(|| "starting logger")?)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = &cli.command {
        println!("{}", VERSION_STRING);
        return Ok(());
    }

    let ctx = DefaultContext::default();

    let log_handle = cli.configure_loggers(&ctx)?;

    let res = match cli.command {
        Commands::Analyze(c) => c.run(&ctx),
        Commands::Check(c) => c.run(&ctx),
        Commands::EnsureDevice(c) => c.run(&ctx),
        Commands::PackageName(c) => c.run(&ctx),
        Commands::Extract(c) => c.run(),
        Commands::Config(c) => c.run(&ctx),

        Commands::Version => unreachable!(),
    };

    log_handle.flush();
    res
}
