use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AdvanceError;
use crate::models::{ChecklistVersion, ProgressFile};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// On-disk encoding, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }
}

/// Reads and writes checklist and progress files with file locking
/// for rudimentary multi-user support
pub struct Storage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
    format: FileFormat,
}

impl Storage {
    /// Creates a new Storage instance
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let mut lock_name = file_path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            format: FileFormat::from_path(&file_path),
            lock_file_path: PathBuf::from(lock_name),
            file_path,
        }
    }

    /// Returns the path to the storage file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    /// Acquire an exclusive lock on the file for writing
    /// Returns the lock file handle which must be held during the operation
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        self.wait_for_lock(&lock_file, FileExt::try_lock_exclusive)?;
        Ok(lock_file)
    }

    /// Acquire a shared lock on the file for reading
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        self.wait_for_lock(&lock_file, FileExt::try_lock_shared)?;
        Ok(Some(lock_file))
    }

    fn wait_for_lock<F>(&self, lock_file: &File, try_lock: F) -> Result<()>
    where
        F: Fn(&File) -> std::io::Result<()>,
    {
        let start = std::time::Instant::now();

        loop {
            match try_lock(lock_file) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(AdvanceError::FileLocked(self.file_path.clone()).into());
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    fn read_unlocked<T: DeserializeOwned>(&self) -> Result<T> {
        let file = File::open(&self.file_path)
            .with_context(|| format!("Failed to open file: {:?}", self.file_path))?;
        let reader = BufReader::new(file);

        match self.format {
            FileFormat::Yaml => serde_yaml::from_reader(reader)
                .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path)),
            FileFormat::Json => serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse JSON from {:?}", self.file_path)),
        }
    }

    fn write_unlocked<T: Serialize>(&self, value: &T) -> Result<()> {
        let content = match self.format {
            FileFormat::Yaml => serde_yaml::to_string(value)?,
            FileFormat::Json => serde_json::to_string_pretty(value)?,
        };
        fs::write(&self.file_path, content)
            .with_context(|| format!("Failed to write {:?}", self.file_path))
    }

    /// Loads a value from the file under a shared lock
    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        if !self.file_path.exists() {
            return Err(AdvanceError::NotFound(self.file_path.clone()).into());
        }

        let _lock = self.acquire_read_lock()?;
        self.read_unlocked()
    }

    /// Loads the file, creating it with a default value if it doesn't exist
    pub fn load_or_create<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        if !self.file_path.exists() {
            let value = T::default();
            self.save(&value)?;
            return Ok(value);
        }
        self.load()
    }

    /// Saves a value to the file under an exclusive lock
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut lock_file = self.acquire_write_lock()?;

        // Write lock holder info (optional, for debugging)
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        self.write_unlocked(value)
        // Lock is automatically released when lock_file is dropped
    }

    /// Perform an atomic update operation with proper locking
    /// This reloads the file, applies changes, and saves atomically
    pub fn update_atomically<T, F>(&self, update_fn: F) -> Result<T>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T),
    {
        let mut lock_file = self.acquire_write_lock()?;
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        // Load latest version from disk
        let mut value: T = if self.file_path.exists() {
            self.read_unlocked()?
        } else {
            T::default()
        };

        update_fn(&mut value);

        self.write_unlocked(&value)?;
        Ok(value)
    }

    pub fn load_checklist(&self) -> Result<ChecklistVersion> {
        self.load::<ChecklistVersion>()
            .with_context(|| format!("Failed to load checklist {:?}", self.file_path))
    }

    pub fn load_progress(&self) -> Result<ProgressFile> {
        self.load_or_create::<ProgressFile>()
            .with_context(|| format!("Failed to load progress {:?}", self.file_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProgressRecord, ProgressStatus, Requirement};
    use tempfile::TempDir;

    fn sample_checklist() -> ChecklistVersion {
        ChecklistVersion {
            name: "Camping".to_string(),
            kind: crate::models::ChecklistKind::MeritBadge,
            version: "2024".to_string(),
            effective_date: None,
            hierarchy: crate::models::HierarchyMode::Legacy,
            requirements: vec![Requirement::new("1", "Explain hazards")],
        }
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("camping.yaml"));

        let checklist = sample_checklist();
        storage.save(&checklist).unwrap();
        assert_eq!(storage.load_checklist().unwrap(), checklist);
    }

    #[test]
    fn test_json_format_from_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camping.json");
        let storage = Storage::new(&path);

        storage.save(&sample_checklist()).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.trim_start().starts_with('{'));
        assert_eq!(storage.load_checklist().unwrap().name, "Camping");
    }

    #[test]
    fn test_missing_checklist_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("missing.yaml"));

        let err = storage.load_checklist().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AdvanceError>(),
            Some(AdvanceError::NotFound(_))
        ));
    }

    #[test]
    fn test_progress_created_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("progress.yaml");
        let storage = Storage::new(&path);

        let progress = storage.load_progress().unwrap();
        assert!(progress.records.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_update_atomically() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("progress.yaml"));
        let id = uuid::Uuid::new_v4();

        let updated: ProgressFile = storage
            .update_atomically(|p: &mut ProgressFile| {
                p.records.push(ProgressRecord::new(id, ProgressStatus::Completed));
            })
            .unwrap();
        assert_eq!(updated.records.len(), 1);

        let reloaded = storage.load_progress().unwrap();
        assert_eq!(reloaded.records[0].requirement_id, id);
        assert!(dir.path().join("progress.yaml.lock").exists());
    }
}
