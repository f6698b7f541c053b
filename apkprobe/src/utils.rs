use std::borrow::Cow;
use std::fs::{self, create_dir_all};
use std::io::{self, ErrorKind};
use std::path::Path;

pub fn ensure_dir_exists(p: &Path) -> io::Result<()> {
    if p.exists() {
        return Ok(());
    }

    create_dir_all(p)
}

/// Lossy string form of a path, used for command arguments and messages
pub fn path_str(path: &Path) -> Cow<'_, str> {
    path.to_string_lossy()
}

/// Returns only the final component of the path, or the whole path if it
/// has none
pub fn file_name_lossy(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

/// Read a text file, replacing invalid UTF-8
pub fn read_file(path: &Path) -> crate::Result<String> {
    match fs::read(path) {
        Ok(v) => Ok(String::from_utf8_lossy(&v).into_owned()),
        Err(e) => match e.kind() {
            ErrorKind::NotFound => Err(crate::Error::TargetNotFound(path.to_path_buf())),
            _ => Err(e.into()),
        },
    }
}
