use blanket::blanket;
use once_cell::sync::OnceCell;
use std::env;
use std::ops::DerefMut;
use std::path::PathBuf;
use std::sync::Mutex;

use directories::BaseDirs;
use which::{which, which_in};

use crate::config::Config;
use crate::utils::ensure_dir_exists;
use crate::Error;

#[derive(Clone)]
struct CachedBin {
    name: String,
    path: String,
}

fn wrapped_which(bin: &str) -> Option<PathBuf> {
    if let Ok(search_path) = env::var("APKPROBE_PATH") {
        let cwd = env::current_dir().ok()?;
        return which_in(bin, Some(&search_path), &cwd).ok();
    }
    which(bin).ok()
}

#[inline(always)]
fn find_program(prog: &str) -> Option<String> {
    wrapped_which(prog).map(|it| it.to_string_lossy().into())
}

/// Context is a trait for an object that can help standardize file locations,
/// find binaries, and lookup env vars.
///
/// Most methods on this trait have a default implementation that is perfectly
/// safe to leave unchanged.
#[blanket(derive(Ref, Box))]
pub trait Context: Send + Sync {
    fn maybe_get_env(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn maybe_get_bin(&self, bin: &str) -> Option<String> {
        find_program(bin)
    }

    fn has_bin(&self, bin: &str) -> bool {
        self.maybe_get_bin(bin).is_some()
    }

    fn get_bin(&self, bin: &str) -> crate::Result<String> {
        self.maybe_get_bin(bin)
            .ok_or_else(|| Error::MissingBin(bin.into()))
    }

    fn has_env(&self, key: &str) -> bool {
        self.maybe_get_env(key).is_some()
    }

    fn get_env(&self, key: &str) -> crate::Result<String> {
        self.maybe_get_env(key)
            .ok_or_else(|| Error::MissingEnv(key.into()))
    }

    /// The toml config file, `$APKPROBE_CONFIG` or `apkprobe.toml` in the
    /// user config dir
    fn get_config_file(&self) -> crate::Result<PathBuf> {
        if let Some(path) = self.maybe_get_env("APKPROBE_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        Ok(self.get_user_config_dir()?.join("apkprobe.toml"))
    }

    /// The parsed config file, `None` if it doesn't exist
    fn get_config<'a>(&'a self) -> crate::Result<Option<&'a Config>>;

    /// Where logs and saved results go, `$APKPROBE_OUTPUT` or the user's
    /// local data dir
    fn get_output_dir(&self) -> crate::Result<PathBuf> {
        let dir = match self.maybe_get_env("APKPROBE_OUTPUT") {
            Some(v) => PathBuf::from(v),
            None => self.get_user_local_dir()?,
        };
        ensure_dir_exists(&dir)?;
        Ok(dir)
    }

    fn get_output_dir_child(&self, child: &str) -> crate::Result<PathBuf> {
        self.get_output_dir().map(|x| x.join(child))
    }

    fn get_user_local_dir(&self) -> crate::Result<PathBuf> {
        let bd = BaseDirs::new().ok_or_else(|| Error::new_generic("failed to get basedirs"))?;
        Ok(bd.data_local_dir().join("apkprobe"))
    }

    fn get_user_config_dir(&self) -> crate::Result<PathBuf> {
        let bd = BaseDirs::new().ok_or_else(|| Error::new_generic("failed to get basedirs"))?;
        Ok(bd.config_dir().join("apkprobe"))
    }
}

pub struct DefaultContext {
    bin_cache: Mutex<Vec<CachedBin>>,
    config: OnceCell<Option<Config>>,
}

impl Clone for DefaultContext {
    fn clone(&self) -> Self {
        let cache = match self.bin_cache.lock() {
            Ok(v) => v.clone(),
            Err(_) => Vec::new(),
        };
        Self {
            bin_cache: Mutex::new(cache),
            config: self.config.clone(),
        }
    }
}

impl DefaultContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for DefaultContext {
    fn default() -> Self {
        Self {
            bin_cache: Mutex::new(Vec::new()),
            config: OnceCell::new(),
        }
    }
}

impl Context for DefaultContext {
    fn get_config<'a>(&'a self) -> crate::Result<Option<&'a Config>> {
        let cfg = self
            .config
            .get_or_try_init(|| -> crate::Result<Option<Config>> {
                let path = self.get_config_file()?;
                if !path.exists() {
                    log::debug!("no config file at {}", path.display());
                    Ok(None)
                } else {
                    Ok(Some(Config::parse(&path)?))
                }
            })?;
        Ok(cfg.as_ref())
    }

    fn maybe_get_bin(&self, prog: &str) -> Option<String> {
        let mut cache_guard = match self.bin_cache.lock() {
            Ok(v) => v,
            Err(_) => return find_program(prog),
        };
        let cache = cache_guard.deref_mut();
        if let Some(hit) = cache.iter().find(|it| it.name == prog) {
            return Some(hit.path.clone());
        }

        let found = find_program(prog)?;

        cache.push(CachedBin {
            name: prog.into(),
            path: found.clone(),
        });

        Some(found)
    }
}
