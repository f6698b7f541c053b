use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::command::run_cmd_timeout;
use crate::utils::path_str;
use crate::Context;

/// The package name declared in an APK's manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PackageIdentifier(String);

impl PackageIdentifier {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PackageIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

lazy_static! {
    static ref NAME_ATTR: Regex = Regex::new(r"name='([^']*)'").unwrap();
}

/// Find the package name in `aapt dump badging` output.
///
/// Only the first line starting with `package:` is considered; if that line
/// has no (or an empty) `name='...'` attribute there is no identifier.
pub fn parse_badging(output: &str) -> Option<PackageIdentifier> {
    let line = output.lines().find(|l| l.starts_with("package:"))?;
    let name = NAME_ATTR.captures(line)?.get(1)?.as_str();
    if name.is_empty() {
        return None;
    }
    Some(PackageIdentifier::new(name))
}

/// Reads the package identifier out of an installable.
///
/// Absence is not an error here; it's up to the caller to decide what a
/// missing identifier means.
pub trait PackageInspector: Send + Sync {
    fn extract_package_identifier(&self, apk: &Path) -> Option<PackageIdentifier>;
}

/// A [PackageInspector] that runs `aapt dump badging`
pub struct ExecAapt {
    bin: Option<String>,
    timeout: Duration,
}

impl ExecAapt {
    /// Looks for `aapt`, then `aapt2`, through the context. A missing binary
    /// is only reported when an extraction is attempted.
    pub fn new(ctx: &dyn Context, timeout: Duration) -> Self {
        let bin = ctx.maybe_get_bin("aapt").or_else(|| ctx.maybe_get_bin("aapt2"));
        Self { bin, timeout }
    }

    pub fn with_bin(bin: String, timeout: Duration) -> Self {
        Self {
            bin: Some(bin),
            timeout,
        }
    }
}

impl PackageInspector for ExecAapt {
    fn extract_package_identifier(&self, apk: &Path) -> Option<PackageIdentifier> {
        let bin = match &self.bin {
            Some(v) => v,
            None => {
                log::error!("aapt not found, add the Android build tools to PATH");
                return None;
            }
        };

        let apk_str = path_str(apk).into_owned();
        let args = ["dump", "badging", apk_str.as_str()];
        let out = match run_cmd_timeout(bin, &args, Some(self.timeout)) {
            Ok(v) => v,
            Err(e) => {
                log::error!("error running aapt: {}", e);
                return None;
            }
        };

        if !out.ok() || out.stdout.is_empty() {
            log::error!("aapt failed: {}", out.stderr_utf8_lossy().trim());
            return None;
        }

        let found = parse_badging(&out.stdout_utf8_lossy());
        if found.is_none() {
            log::error!("no package line in aapt output for {}", apk_str);
        }
        found
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    const BADGING: &str = "\
package: name='com.example.app' versionCode='12' versionName='1.2' platformBuildVersionName='13'
sdkVersion:'21'
targetSdkVersion:'33'
uses-permission: name='android.permission.INTERNET'
application-label:'Example'
";

    #[test]
    fn test_parse_badging() {
        assert_eq!(
            parse_badging(BADGING),
            Some(PackageIdentifier::new("com.example.app"))
        );
    }

    #[rstest]
    #[case("")]
    #[case("sdkVersion:'21'\n")]
    #[case("package: versionCode='12'\npackage: name='second.pkg'\n")]
    #[case("package: name='' versionCode='1'\n")]
    #[case("  package: name='indented.pkg'\n")]
    fn test_parse_badging_absent(#[case] output: &str) {
        assert_eq!(parse_badging(output), None);
    }

    #[test]
    fn test_first_match_wins() {
        let out = "package: name='first.pkg'\npackage: name='second.pkg'\n";
        assert_eq!(parse_badging(out).unwrap().as_str(), "first.pkg");
    }

    #[test]
    fn test_missing_bin() {
        let aapt = ExecAapt {
            bin: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(aapt.extract_package_identifier(Path::new("/tmp/x.apk")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_tool_failure_is_absent() {
        // `false` exits non-zero with no output
        let aapt = ExecAapt::with_bin("false".into(), Duration::from_secs(5));
        assert_eq!(aapt.extract_package_identifier(Path::new("/tmp/x.apk")), None);
    }
}
