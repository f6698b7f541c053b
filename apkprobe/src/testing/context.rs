#![allow(unused)]
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use mockall::mock;
use rand::Rng;
use rstest::fixture;

use crate::config::Config;
use crate::package::PackageIdentifier;
use crate::utils::ensure_dir_exists;
use crate::Context;

#[fixture]
pub fn tmp_context() -> TestContext {
    TestContext::default()
}

#[fixture]
pub fn mock_emulator() -> MockEmulator {
    MockEmulator::new()
}

#[fixture]
pub fn mock_inspector() -> MockPackageInspector {
    MockPackageInspector::new()
}

/// A [Context] that never looks at the real environment. Binaries and
/// environment variables only exist if a test sets them.
pub struct TestContext {
    base_dir: PathBuf,
    env: HashMap<String, String>,
    bins: HashMap<String, String>,
}

impl TestContext {
    pub fn set_env<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) -> &mut Self {
        self.env.insert(key.as_ref().into(), value.as_ref().into());
        self
    }

    pub fn set_bin<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, bin: V) -> &mut Self {
        self.bins.insert(key.as_ref().into(), bin.as_ref().into());
        self
    }

    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn to_abs<P: AsRef<Path> + ?Sized>(&self, path: &P) -> PathBuf {
        self.base_dir.join(path)
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let td = &self.base_dir;
        if td.exists() {
            fs::remove_dir_all(td).expect("failed to clear test dir");
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        let mut rng = rand::thread_rng();
        let rand_name: u64 = rng.gen();
        let td = env::temp_dir().join(format!("apkprobe_test_base_{}", rand_name));

        if td.exists() {
            fs::remove_dir_all(&td).expect("failed to clear test dir");
        }
        ensure_dir_exists(&td).expect("failed to create default test dir");

        Self {
            base_dir: td,
            env: HashMap::new(),
            bins: HashMap::new(),
        }
    }
}

impl Context for TestContext {
    fn maybe_get_env(&self, key: &str) -> Option<String> {
        self.env.get(key).map(String::from)
    }

    fn maybe_get_bin(&self, bin: &str) -> Option<String> {
        self.bins.get(bin).map(String::from)
    }

    fn get_user_config_dir(&self) -> crate::Result<PathBuf> {
        Ok(self.base_dir.join("config"))
    }

    fn get_user_local_dir(&self) -> crate::Result<PathBuf> {
        Ok(self.base_dir.join("local"))
    }

    fn get_config<'a>(&'a self) -> crate::Result<Option<&'a Config>> {
        Ok(None)
    }
}

mock! {
    pub Emulator {}

    impl crate::emulator::Emulator for Emulator {
        fn launch(&self, avd: &str) -> crate::Result<()>;
    }
}

mock! {
    pub PackageInspector {}

    impl crate::package::PackageInspector for PackageInspector {
        fn extract_package_identifier(&self, apk: &Path) -> Option<PackageIdentifier>;
    }
}
