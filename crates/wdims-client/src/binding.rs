use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// The profile one window is bound to, remembered across reloads of that
/// window. Independent of the server-wide active-profile pointer.
pub trait BindingStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, profile: &str);
}

#[derive(Debug, Default)]
pub struct MemoryBinding {
    value: Mutex<Option<String>>,
}

impl MemoryBinding {
    pub fn new(initial: Option<&str>) -> Self {
        Self {
            value: Mutex::new(initial.map(str::to_string)),
        }
    }
}

impl BindingStore for MemoryBinding {
    fn load(&self) -> Option<String> {
        match self.value.lock() {
            Ok(value) => value.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn save(&self, profile: &str) {
        match self.value.lock() {
            Ok(mut value) => *value = Some(profile.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(profile.to_string()),
        }
    }
}

/// One small text file per window.
#[derive(Debug, Clone)]
pub struct FileBinding {
    path: PathBuf,
}

impl FileBinding {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BindingStore for FileBinding {
    fn load(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let trimmed = content.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(event = "binding_load_failed", path = %self.path.display(), error = %err);
                None
            }
        }
    }

    fn save(&self, profile: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(event = "binding_save_failed", path = %self.path.display(), error = %err);
                return;
            }
        }
        if let Err(err) = fs::write(&self.path, profile) {
            warn!(event = "binding_save_failed", path = %self.path.display(), error = %err);
        }
    }
}
