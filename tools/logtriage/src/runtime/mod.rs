use crate::errors::TriageError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Listings returned by `read_dir` are sorted by name so traversal order is
/// reproducible across platforms.
pub trait FileSystem: Send + Sync {
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, TriageError>;
    fn read_to_string(&self, path: &Path) -> Result<String, TriageError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), TriageError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), TriageError>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), TriageError>;
    fn write_error_line(&self, line: &str) -> Result<(), TriageError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, TriageError> {
        let mut entries = std::fs::read_dir(path)
            .map_err(|e| TriageError::Io(e.to_string()))?
            .map(|entry| {
                let entry = entry.map_err(|e| TriageError::Io(e.to_string()))?;
                Ok(DirEntry {
                    name: entry.file_name().to_string_lossy().to_string(),
                    is_dir: entry.path().is_dir(),
                })
            })
            .collect::<Result<Vec<_>, TriageError>>()?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Invalid UTF-8 is replaced rather than rejected; only I/O failures error.
    fn read_to_string(&self, path: &Path) -> Result<String, TriageError> {
        let bytes = std::fs::read(path).map_err(|e| TriageError::Io(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), TriageError> {
        std::fs::write(path, contents).map_err(|e| TriageError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), TriageError> {
        std::fs::create_dir_all(path).map_err(|e| TriageError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), TriageError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| TriageError::Io(e.to_string()))
    }

    fn write_error_line(&self, line: &str) -> Result<(), TriageError> {
        use std::io::Write;
        let mut err = std::io::stderr();
        writeln!(err, "{line}").map_err(|e| TriageError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }
}

/// In-memory tree. Adding a file registers every ancestor as a directory;
/// paths registered with `fail_path` error on listing and reading.
#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, String>>>,
    dirs: Arc<Mutex<BTreeSet<PathBuf>>>,
    failing: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.add_file(path, contents);
        fs
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        self.files
            .lock()
            .expect("files lock")
            .insert(path, contents.into());
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut dirs = self.dirs.lock().expect("dirs lock");
        for ancestor in path.as_ref().ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            dirs.insert(ancestor.to_path_buf());
        }
    }

    pub fn fail_path(&self, path: impl Into<PathBuf>) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(path.into());
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(path.as_ref())
            .cloned()
    }

    fn check_failing(&self, path: &Path) -> Result<(), TriageError> {
        if self.failing.lock().expect("failing lock").contains(path) {
            return Err(TriageError::Io(format!(
                "injected failure for {}",
                path.display()
            )));
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, TriageError> {
        self.check_failing(path)?;
        if !self.is_dir(path) {
            return Err(TriageError::Io(format!(
                "not a directory: {}",
                path.display()
            )));
        }
        let mut children = BTreeMap::new();
        for dir in self.dirs.lock().expect("dirs lock").iter() {
            if dir.parent() == Some(path) {
                if let Some(name) = dir.file_name() {
                    children.insert(name.to_string_lossy().to_string(), true);
                }
            }
        }
        for file in self.files.lock().expect("files lock").keys() {
            if file.parent() == Some(path) {
                if let Some(name) = file.file_name() {
                    children.insert(name.to_string_lossy().to_string(), false);
                }
            }
        }
        Ok(children
            .into_iter()
            .map(|(name, is_dir)| DirEntry { name, is_dir })
            .collect())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, TriageError> {
        self.check_failing(path)?;
        self.file(path)
            .ok_or_else(|| TriageError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), TriageError> {
        self.check_failing(path)?;
        self.add_file(path, contents);
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), TriageError> {
        self.check_failing(path)?;
        self.add_dir(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path) || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().expect("dirs lock").contains(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    writes: Arc<Mutex<Vec<String>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl FakeTerminal {
    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.errors.lock().expect("errors lock").clone()
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), TriageError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn write_error_line(&self, line: &str) -> Result<(), TriageError> {
        self.errors
            .lock()
            .expect("errors lock")
            .push(line.to_string());
        Ok(())
    }
}
