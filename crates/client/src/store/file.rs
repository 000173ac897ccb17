use super::KeyValueBackend;
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Key-value backend persisted as a single JSON object file.
///
/// Every write rewrites the whole file through a temporary sibling and a
/// rename. A missing, unreadable or non-object file reads as empty. On unix
/// the file is only readable by its owner.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Backend at `<dir>/session.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                warn!("Failed to read session file {}: {e}", self.path.display());
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("Ignoring malformed session file {}", self.path.display());
                Map::new()
            }
        }
    }

    fn store(&self, map: &Map<String, Value>) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        if map.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            };
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = private_file(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(map)?)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
    }

    fn update(&self, f: impl FnOnce(&mut Map<String, Value>)) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load();
        f(&mut map);
        self.store(&map).inspect_err(|e| {
            warn!("Failed to write session file {}: {e}", self.path.display());
        })
    }
}

/// Truncate or create `path` with owner-only permissions
fn private_file(path: &Path) -> io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let file = options.open(path)?;
        // mode() only applies when the file is created
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        Ok(file)
    }

    #[cfg(not(unix))]
    {
        options.open(path)
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Option<String> {
        match self.load().remove(key)? {
            Value::String(value) => Some(value),
            // Values are always written as strings; anything else is corruption
            other => Some(other.to_string()),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.set_many(&[(key, value)])
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.remove_many(&[key])
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> io::Result<()> {
        self.update(|map| {
            for (key, value) in entries {
                map.insert((*key).to_string(), Value::String((*value).to_string()));
            }
        })
    }

    fn remove_many(&self, keys: &[&str]) -> io::Result<()> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }
}
