use std::borrow::Cow;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use toml::{Table, Value};

use crate::device::DeviceIdentity;
use crate::utils::{path_str, read_file};
use crate::Context;

#[derive(Debug)]
pub enum Error {
    InvalidType,
    MissingKey,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::InvalidType => "InvalidType",
                Self::MissingKey => "MissingKey",
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct ConfigMap<'c> {
    path: &'c Path,
    name: Option<Cow<'c, str>>,
    table: &'c Table,
}

#[derive(Clone, Debug)]
pub struct Config {
    path: PathBuf,
    base: Table,
}

impl Config {
    pub fn parse(source: &Path) -> crate::Result<Self> {
        let as_str = read_file(source)?;
        Self::from_toml(source, &as_str)
    }

    pub fn from_toml(source: &Path, content: &str) -> crate::Result<Self> {
        let base: Table = match toml::from_str(content) {
            Ok(v) => v,
            Err(e) => return Err(crate::Error::new_cfg(source, &e)),
        };
        Ok(Self {
            base,
            path: PathBuf::from(source),
        })
    }

    pub fn get_map(&self) -> ConfigMap {
        ConfigMap {
            name: None,
            path: &self.path,
            table: &self.base,
        }
    }
}

impl<'c> ConfigMap<'c> {
    fn get_full_path<'a>(&'a self) -> Option<&'a str> {
        self.name.as_ref().map(|it| it.as_ref())
    }

    fn key_path<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match self.get_full_path() {
            None => Cow::Borrowed(key),
            Some(v) => Cow::Owned(format!("{}.{}", v, key)),
        }
    }

    /// Helper to create a crate::Error for a missing key
    pub fn missing_key(&self, key: &str) -> crate::Error {
        let path = self.key_path(key);
        crate::Error::InvalidConfig(path_str(self.path).into(), format!("missing key: {}", path))
    }

    /// Helper to create a crate::Error for an invalid key
    pub fn invalid_key(&self, key: &str, expected: &str) -> crate::Error {
        let path = self.key_path(key);
        crate::Error::InvalidConfig(
            path_str(self.path).into(),
            format!(
                "invalid value for key: {} (expected type: {})",
                path, expected
            ),
        )
    }

    pub fn has(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<&'c Value> {
        self.table.get(key)
    }

    pub fn maybe_get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            Some(v) => match v.as_integer() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_int_typecheck(&self, key: &str) -> crate::Result<Option<i64>> {
        self.maybe_get_int(key)
            .map_err(|_| self.invalid_key(key, "int"))
    }

    /// Like [maybe_get_int_typecheck] but rejects negative values
    pub fn maybe_get_uint_typecheck(&self, key: &str) -> crate::Result<Option<u64>> {
        match self.maybe_get_int_typecheck(key)? {
            Some(v) if v < 0 => Err(self.invalid_key(key, "non-negative int")),
            Some(v) => Ok(Some(v as u64)),
            None => Ok(None),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&'c str> {
        self.maybe_get_str(key)?.ok_or(Error::MissingKey)
    }

    pub fn maybe_get_str(&self, key: &str) -> Result<Option<&'c str>> {
        match self.get(key) {
            Some(v) => match v.as_str() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_str_typecheck(&self, key: &str) -> crate::Result<Option<&'c str>> {
        self.maybe_get_str(key)
            .map_err(|_| self.invalid_key(key, "string"))
    }

    pub fn must_get_str(&self, key: &str) -> crate::Result<&'c str> {
        match self.get_str(key) {
            Err(Error::InvalidType) => Err(self.invalid_key(key, "string")),
            Err(Error::MissingKey) => Err(self.missing_key(key)),
            Ok(v) => Ok(v),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
            .ok_or(Error::MissingKey)?
            .as_integer()
            .ok_or(Error::InvalidType)
    }

    pub fn maybe_get_map(&'c self, key: &'c str) -> Result<Option<ConfigMap<'c>>> {
        match self.get(key) {
            Some(v) => match v.as_table() {
                Some(table) => {
                    let name = match &self.get_full_path() {
                        Some(parents) => Cow::Owned(format!("{parents}.{key}")),
                        None => Cow::Borrowed(key),
                    };
                    Ok(Some(Self {
                        name: Some(name),
                        path: self.path,
                        table,
                    }))
                }
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn get_map(&'c self, key: &'c str) -> Result<ConfigMap<'c>> {
        self.maybe_get_map(key)?.ok_or(Error::MissingKey)
    }

    pub fn maybe_get_map_typecheck(&'c self, key: &'c str) -> crate::Result<Option<ConfigMap<'c>>> {
        self.maybe_get_map(key)
            .map_err(|_| self.invalid_key(key, "table"))
    }
}

/// How long to wait after the bridge reports the device connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettleMode {
    /// Sleep the full settle interval
    Fixed,
    /// Poll `sys.boot_completed`, bounded by the settle interval
    BootCompleted,
}

impl FromStr for SettleMode {
    type Err = &'static str;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "fixed" => Self::Fixed,
            "boot-completed" => Self::BootCompleted,
            _ => return Err("valid values are 'fixed' and 'boot-completed'"),
        })
    }
}

/// Per stage deadlines for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub tool_check: Duration,
    pub device_list: Duration,
    pub boot_wait: Duration,
    pub settle: Duration,
    pub boot_poll: Duration,
    pub install: Duration,
    pub inspect: Duration,
    pub logcat_clear: Duration,
    pub fuzz: Duration,
    pub logcat_dump: Duration,
    pub uninstall: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            tool_check: Duration::from_secs(5),
            device_list: Duration::from_secs(5),
            boot_wait: Duration::from_secs(120),
            settle: Duration::from_secs(20),
            boot_poll: Duration::from_secs(2),
            install: Duration::from_secs(90),
            inspect: Duration::from_secs(15),
            logcat_clear: Duration::from_secs(15),
            fuzz: Duration::from_secs(120),
            logcat_dump: Duration::from_secs(20),
            uninstall: Duration::from_secs(15),
        }
    }
}

impl Timeouts {
    /// Every timeout set to zero, handy for driving stubs
    pub fn zero() -> Self {
        Self {
            tool_check: Duration::ZERO,
            device_list: Duration::ZERO,
            boot_wait: Duration::ZERO,
            settle: Duration::ZERO,
            boot_poll: Duration::ZERO,
            install: Duration::ZERO,
            inspect: Duration::ZERO,
            logcat_clear: Duration::ZERO,
            fuzz: Duration::ZERO,
            logcat_dump: Duration::ZERO,
            uninstall: Duration::ZERO,
        }
    }

    /// Upper bound on a whole session given the monitor window. The second
    /// `device_list` slot covers the last boot completion check, which can
    /// start just before the settle timeout runs out. Saturates instead of
    /// overflowing.
    pub fn session_bound(&self, monitor: Duration) -> Duration {
        [
            self.tool_check,
            self.device_list,
            self.device_list,
            self.boot_wait,
            self.settle,
            self.install,
            self.inspect,
            self.logcat_clear,
            self.fuzz,
            monitor,
            self.logcat_dump,
            self.uninstall,
        ]
        .into_iter()
        .fold(Duration::ZERO, Duration::saturating_add)
    }

    fn apply_map(&mut self, map: &ConfigMap) -> crate::Result<()> {
        let fields: [(&str, &mut Duration); 11] = [
            ("tool-check", &mut self.tool_check),
            ("device-list", &mut self.device_list),
            ("boot-wait", &mut self.boot_wait),
            ("settle", &mut self.settle),
            ("boot-poll", &mut self.boot_poll),
            ("install", &mut self.install),
            ("inspect", &mut self.inspect),
            ("logcat-clear", &mut self.logcat_clear),
            ("fuzz", &mut self.fuzz),
            ("logcat-dump", &mut self.logcat_dump),
            ("uninstall", &mut self.uninstall),
        ];
        for (key, field) in fields {
            if let Some(secs) = map.maybe_get_uint_typecheck(key)? {
                *field = Duration::from_secs(secs);
            }
        }
        Ok(())
    }
}

/// Every tunable of an analysis session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisConfig {
    pub serial: DeviceIdentity,
    pub emulator_name: String,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub event_count: u32,
    pub settle_mode: SettleMode,
    #[serde(serialize_with = "serialize_timeouts")]
    pub timeouts: Timeouts,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            serial: DeviceIdentity::default(),
            emulator_name: Self::DEFAULT_EMULATOR.into(),
            duration: Duration::from_secs(60),
            event_count: 300,
            settle_mode: SettleMode::BootCompleted,
            timeouts: Timeouts::default(),
        }
    }
}

impl AnalysisConfig {
    pub const DEFAULT_EMULATOR: &'static str = "MalwareTest_Safe";

    /// Build the config from defaults, then the config file, then the
    /// environment, each overriding the last.
    pub fn load(ctx: &dyn Context) -> crate::Result<Self> {
        let mut cfg = Self::default();
        if let Some(file) = ctx.get_config()? {
            cfg.apply_config(file)?;
        }
        cfg.apply_env(ctx)?;
        Ok(cfg)
    }

    /// Apply the `[analysis]` and `[timeouts]` tables of a config file
    pub fn apply_config(&mut self, config: &Config) -> crate::Result<()> {
        let base = config.get_map();
        if let Some(analysis) = base.maybe_get_map_typecheck("analysis")? {
            if let Some(serial) = analysis.maybe_get_str_typecheck("serial")? {
                self.serial = DeviceIdentity::new(serial);
            }
            if let Some(name) = analysis.maybe_get_str_typecheck("emulator-name")? {
                self.emulator_name = name.into();
            }
            if let Some(secs) = analysis.maybe_get_uint_typecheck("duration")? {
                self.duration = Duration::from_secs(secs);
            }
            if let Some(count) = analysis.maybe_get_uint_typecheck("event-count")? {
                self.event_count = u32::try_from(count)
                    .map_err(|_| analysis.invalid_key("event-count", "u32"))?;
            }
            if let Some(mode) = analysis.maybe_get_str_typecheck("settle-mode")? {
                self.settle_mode = mode
                    .parse()
                    .map_err(|_| analysis.invalid_key("settle-mode", "fixed|boot-completed"))?;
            }
        }
        if let Some(timeouts) = base.maybe_get_map_typecheck("timeouts")? {
            self.timeouts.apply_map(&timeouts)?;
        }
        Ok(())
    }

    pub fn apply_env(&mut self, ctx: &dyn Context) -> crate::Result<()> {
        if let Some(serial) = ctx.maybe_get_env("ANDROID_SERIAL") {
            self.serial = DeviceIdentity::new(serial);
        }
        if let Some(name) = ctx.maybe_get_env("EMULATOR_NAME") {
            self.emulator_name = name;
        }
        if let Some(secs) = parse_env::<u64>(ctx, "DYNAMIC_DURATION")? {
            self.duration = Duration::from_secs(secs);
        }
        if let Some(count) = parse_env::<u32>(ctx, "APKPROBE_EVENT_COUNT")? {
            self.event_count = count;
        }
        if let Some(mode) = parse_env::<SettleMode>(ctx, "APKPROBE_SETTLE_MODE")? {
            self.settle_mode = mode;
        }
        Ok(())
    }

    /// Worst case wall time of a session using this config
    pub fn session_bound(&self) -> Duration {
        self.timeouts.session_bound(self.duration)
    }
}

fn parse_env<T: FromStr>(ctx: &dyn Context, key: &str) -> crate::Result<Option<T>> {
    match ctx.maybe_get_env(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => Err(crate::Error::InvalidEnv(key.into(), raw)),
        },
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

fn serialize_timeouts<S: serde::Serializer>(
    t: &Timeouts,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let fields = [
        ("tool-check", t.tool_check),
        ("device-list", t.device_list),
        ("boot-wait", t.boot_wait),
        ("settle", t.settle),
        ("boot-poll", t.boot_poll),
        ("install", t.install),
        ("inspect", t.inspect),
        ("logcat-clear", t.logcat_clear),
        ("fuzz", t.fuzz),
        ("logcat-dump", t.logcat_dump),
        ("uninstall", t.uninstall),
    ];
    let mut map = s.serialize_map(Some(fields.len()))?;
    for (k, v) in fields {
        map.serialize_entry(k, &v.as_secs())?;
    }
    map.end()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{tmp_context, TestContext};
    use rstest::*;

    const CONTENT: &str = r#"
[analysis]
serial = "emulator-5556"
emulator-name = "Pixel_API_33"
duration = 30
settle-mode = "fixed"

[timeouts]
install = 45
fuzz = 200
"#;

    fn cfg() -> Config {
        Config::from_toml(Path::new("apkprobe.toml"), CONTENT).expect("parsing test config")
    }

    #[test]
    fn test_config_map() {
        let config = cfg();
        let base = config.get_map();
        let analysis = base.get_map("analysis").expect("getting analysis");
        assert_eq!(analysis.get_str("serial").unwrap(), "emulator-5556");
        assert_eq!(analysis.get_int("duration").unwrap(), 30);
        assert!(analysis.get_str("ohno").is_err());
        assert!(analysis.must_get_str("ohno").is_err());
        assert!(base.has("timeouts"));
    }

    #[test]
    fn test_apply_config() {
        let mut analysis = AnalysisConfig::default();
        analysis.apply_config(&cfg()).unwrap();
        assert_eq!(analysis.serial.as_str(), "emulator-5556");
        assert_eq!(analysis.emulator_name, "Pixel_API_33");
        assert_eq!(analysis.duration, Duration::from_secs(30));
        assert_eq!(analysis.settle_mode, SettleMode::Fixed);
        assert_eq!(analysis.event_count, 300);
        assert_eq!(analysis.timeouts.install, Duration::from_secs(45));
        assert_eq!(analysis.timeouts.fuzz, Duration::from_secs(200));
        assert_eq!(analysis.timeouts.uninstall, Duration::from_secs(15));
    }

    #[rstest]
    #[case("[analysis]\nduration = \"long\"\n")]
    #[case("[analysis]\nduration = -4\n")]
    #[case("[analysis]\nsettle-mode = \"whenever\"\n")]
    #[case("[timeouts]\ninstall = true\n")]
    #[case("analysis = 3\n")]
    fn test_invalid_config(#[case] content: &str) {
        let config = Config::from_toml(Path::new("bad.toml"), content).unwrap();
        let res = AnalysisConfig::default().apply_config(&config);
        assert!(matches!(res, Err(crate::Error::InvalidConfig(_, _))));
    }

    #[test]
    fn test_unparseable_toml() {
        let res = Config::from_toml(Path::new("bad.toml"), "[analysis\n");
        assert!(matches!(res, Err(crate::Error::InvalidConfig(_, _))));
    }

    #[rstest]
    fn test_env_overrides_file(mut tmp_context: TestContext) {
        tmp_context
            .set_env("ANDROID_SERIAL", "emulator-5558")
            .set_env("DYNAMIC_DURATION", "5")
            .set_env("APKPROBE_EVENT_COUNT", "50");
        let mut analysis = AnalysisConfig::default();
        analysis.apply_config(&cfg()).unwrap();
        analysis.apply_env(&tmp_context).unwrap();
        assert_eq!(analysis.serial.as_str(), "emulator-5558");
        // Not set in the env, so the file wins
        assert_eq!(analysis.emulator_name, "Pixel_API_33");
        assert_eq!(analysis.duration, Duration::from_secs(5));
        assert_eq!(analysis.event_count, 50);
    }

    #[rstest]
    fn test_bad_env(mut tmp_context: TestContext) {
        tmp_context.set_env("DYNAMIC_DURATION", "sixty");
        let res = AnalysisConfig::default().apply_env(&tmp_context);
        assert!(matches!(res, Err(crate::Error::InvalidEnv(_, _))));
    }

    #[rstest]
    fn test_load_defaults(tmp_context: TestContext) {
        let analysis = AnalysisConfig::load(&tmp_context).unwrap();
        assert_eq!(analysis.serial.as_str(), "emulator-5554");
        assert_eq!(analysis.emulator_name, AnalysisConfig::DEFAULT_EMULATOR);
        assert_eq!(analysis.duration, Duration::from_secs(60));
        assert_eq!(analysis.settle_mode, SettleMode::BootCompleted);
    }

    #[test]
    fn test_session_bound() {
        let t = Timeouts::default();
        // 5 + 10 + 120 + 20 + 90 + 15 + 15 + 120 + 60 + 20 + 15
        assert_eq!(t.session_bound(Duration::from_secs(60)), Duration::from_secs(490));
        assert_eq!(Timeouts::zero().session_bound(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_session_bound_saturates() {
        let t = Timeouts::default();
        assert_eq!(t.session_bound(Duration::from_secs(u64::MAX)), Duration::MAX);

        let content = "[analysis]\nduration = 9223372036854775807\n\n[timeouts]\nfuzz = 9223372036854775807\n";
        let config = Config::from_toml(Path::new("big.toml"), content).unwrap();
        let mut analysis = AnalysisConfig::default();
        analysis.apply_config(&config).unwrap();
        assert_eq!(analysis.session_bound(), Duration::MAX);
    }

    #[test]
    fn test_serialize() {
        let v = serde_json::to_value(AnalysisConfig::default()).unwrap();
        assert_eq!(v["serial"], "emulator-5554");
        assert_eq!(v["duration"], 60);
        assert_eq!(v["settle-mode"], "boot-completed");
        assert_eq!(v["timeouts"]["boot-wait"], 120);
    }
}
