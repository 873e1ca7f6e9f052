/// Filesystem slot store.
///
/// One file per slot under a root directory:
/// - file name is the percent-encoded slot key plus `.json`
/// - atomic writes (write to .tmp, fsync, rename)
/// - a mutex serializes writers inside the process
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::{SlotStore, StorageError};

/// Everything except alphanumerics, `-` and `_` is encoded, so `:` and path
/// separators never reach the filesystem.
const SLOT_FILE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

pub struct FileSlotStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSlotStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        let name = utf8_percent_encode(key, SLOT_FILE_SET).to_string();
        self.root.join(format!("{}.json", name))
    }

    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

impl SlotStore for FileSlotStore {
    fn read_slot(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_slot(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Unavailable)?;
        Self::atomic_write(&self.slot_path(key), value)?;
        Ok(())
    }
}
