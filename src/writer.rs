use failure::Error;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

lazy_static! {
    static ref UNSAFE_RUN: Regex = Regex::new(r"[^A-Za-z0-9_]+").expect("valid filename pattern");
}

/// Maps an entity name to a file stem: every run of characters outside
/// `[A-Za-z0-9_]` becomes one `-`. The empty name maps to `-`.
pub fn safe_file_name(name: &str) -> String {
    if name.is_empty() {
        return "-".into();
    }

    UNSAFE_RUN.replace_all(name, "-").into_owned()
}

/// Writes collections as pretty-printed JSON files under one directory.
pub struct BackupWriter {
    dir: PathBuf,
    written: RefCell<HashMap<String, String>>,
}

impl BackupWriter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> BackupWriter {
        BackupWriter {
            dir: dir.into(),
            written: RefCell::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_name(name)))
    }

    /// Existing files are overwritten.
    pub fn write<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<PathBuf, Error> {
        let json = serde_json::to_string_pretty(data)?;

        fs::create_dir_all(&self.dir)
            .map_err(|e| failure::format_err!("could not create backup directory {:?}: {}", self.dir, e))?;

        let stem = safe_file_name(name);
        if let Some(previous) = self.written.borrow_mut().insert(stem.clone(), name.to_owned()) {
            log::warn!("{:?} and {:?} share the file name {}.json, keeping the latter", previous, name, stem);
        }

        let path = self.path_for(name);
        fs::write(&path, json).map_err(|e| failure::format_err!("could not write {:?}: {}", path, e))?;

        log::debug!("wrote {:?}", path);
        Ok(path)
    }
}
