use std::fs;
use std::{env, path::PathBuf};

use rand::Rng;
use rstest::fixture;

/// A scratch directory removed on drop
pub struct TmpDir {
    temp_dir: PathBuf,
}

impl TmpDir {
    pub fn get_path(&self) -> &PathBuf {
        &self.temp_dir
    }

    pub fn create_file_name(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.temp_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create directories for new file");
        }
        fs::write(&path, content).expect("failed to make temp file with content");
        path
    }

    /// A stand-in APK; only its existence matters to the pipeline
    pub fn create_apk(&self, name: &str) -> PathBuf {
        self.create_file_name(name, b"PK\x03\x04")
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        _ = fs::remove_dir_all(&self.temp_dir);
    }
}

#[fixture]
pub fn tmp_dir() -> TmpDir {
    let mut rng = rand::thread_rng();
    let rand_name: u64 = rng.gen();
    let temp_dir = env::temp_dir().join(format!("apkprobe_tmp_{}", rand_name));
    fs::create_dir_all(&temp_dir).expect("failed to make temp directory");
    TmpDir { temp_dir }
}
