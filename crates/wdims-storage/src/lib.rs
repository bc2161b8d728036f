use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{info, warn};
use wdims_core::{
    validate_profile_name, DisplaySettings, EngineConfig, ErrorKind, NameError, Profile,
    ProfileWarnings, DEFAULT_PROFILE,
};

mod migrate;

pub use migrate::{MigrationEntry, MigrationOutcome};

pub const PROFILES_DIR: &str = "profiles";
pub const ACTIVE_PROFILE_FILE: &str = "active-profile.txt";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidName(#[from] NameError),
    #[error("profile {0:?} not found")]
    ProfileNotFound(String),
    #[error("no {suffix} file found for profile {profile:?}")]
    FileNotFound {
        profile: String,
        suffix: &'static str,
    },
    #[error("cannot {action} the default profile")]
    Forbidden { action: &'static str },
    #[error("profile {0:?} already exists")]
    AlreadyExists(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidName(_) => ErrorKind::InvalidName,
            StoreError::ProfileNotFound(_) | StoreError::FileNotFound { .. } => ErrorKind::NotFound,
            StoreError::Forbidden { .. } => ErrorKind::Forbidden,
            StoreError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            StoreError::Io { .. } => ErrorKind::Io,
            StoreError::Parse { .. } | StoreError::Serialization(_) => ErrorKind::Parse,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The two documents every profile owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsKind {
    Display,
    Engines,
}

impl SettingsKind {
    pub const ALL: [SettingsKind; 2] = [SettingsKind::Display, SettingsKind::Engines];

    pub fn suffix(&self) -> &'static str {
        match self {
            SettingsKind::Display => ".wdims_ui.json",
            SettingsKind::Engines => ".wdims_engine.json",
        }
    }

    pub fn canonical_file_name(&self, profile: &str) -> String {
        format!("{profile}{}", self.suffix())
    }
}

/// The file chosen to represent one kind of settings for a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: PathBuf,
    /// More than one candidate matched; `path` is the lexicographically first.
    pub multiple: bool,
}

/// On-disk profile directory plus the global active-profile pointer.
///
/// Every operation touches the filesystem directly; there is no cache and no
/// locking. Concurrent writers to the same file race and the last rename wins.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(name)
    }

    fn pointer_path(&self) -> PathBuf {
        self.root.join(ACTIVE_PROFILE_FILE)
    }

    /// Name rules plus the requirement that the name is a single plain path
    /// component, so `.` cannot address the profiles directory itself.
    pub fn validate_name(&self, name: &str) -> Result<(), StoreError> {
        validate_profile_name(name)?;
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(StoreError::InvalidName(NameError::PathTraversal)),
        }
    }

    /// Profile directory names. Never fails: an unreadable profiles directory
    /// yields just the default profile so a selector can always render.
    pub fn list_profiles(&self) -> BTreeSet<String> {
        let dir = self.profiles_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(event = "list_profiles_failed", dir = %dir.display(), error = %err);
                return BTreeSet::from([DEFAULT_PROFILE.to_string()]);
            }
        };
        let mut names = BTreeSet::new();
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|ty| ty.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.insert(name);
            }
        }
        names
    }

    pub fn resolve_file(&self, name: &str, kind: SettingsKind) -> Result<ResolvedFile, StoreError> {
        let dir = self.profile_dir(name);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::ProfileNotFound(name.to_string()));
            }
            Err(err) => return Err(StoreError::io(&dir, err)),
        };
        let mut candidates: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|ty| ty.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|file_name| file_name.ends_with(kind.suffix()))
            .collect();
        candidates.sort();
        let Some(first) = candidates.first() else {
            return Err(StoreError::FileNotFound {
                profile: name.to_string(),
                suffix: kind.suffix(),
            });
        };
        Ok(ResolvedFile {
            path: dir.join(first),
            multiple: candidates.len() > 1,
        })
    }

    pub fn get_profile(&self, name: &str) -> Result<Profile, StoreError> {
        self.validate_name(name)?;
        let ui = self.resolve_file(name, SettingsKind::Display)?;
        let engines = self.resolve_file(name, SettingsKind::Engines)?;

        let display_settings: DisplaySettings = read_json(&ui.path)?;
        let engine_config: EngineConfig = read_json(&engines.path)?;

        let warnings = ProfileWarnings {
            multiple_ui_files: ui.multiple,
            multiple_engine_files: engines.multiple,
        };
        if warnings.any() {
            warn!(
                event = "multiple_settings_files",
                profile = name,
                ui_file = %ui.path.display(),
                engine_file = %engines.path.display(),
                multiple_ui = ui.multiple,
                multiple_engine = engines.multiple
            );
        }

        Ok(Profile {
            display_settings,
            engine_config,
            warnings: warnings.any().then_some(warnings),
        })
    }

    /// Creates `name`, either from built-in defaults or as a byte copy of
    /// `copy_from`'s resolved files. An existing non-empty directory is an error.
    pub fn create_profile(&self, name: &str, copy_from: Option<&str>) -> Result<(), StoreError> {
        self.validate_name(name)?;
        let dir = self.profile_dir(name);
        if dir_has_entries(&dir)? {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }

        match copy_from {
            Some(source) => {
                self.validate_name(source)?;
                let (ui, engines) = self.read_raw_pair(source)?;
                create_dir(&dir)?;
                self.write_canonical(name, SettingsKind::Display, &ui)?;
                self.write_canonical(name, SettingsKind::Engines, &engines)?;
            }
            None => {
                create_dir(&dir)?;
                self.write_canonical(
                    name,
                    SettingsKind::Display,
                    &to_pretty(&DisplaySettings::default())?,
                )?;
                self.write_canonical(
                    name,
                    SettingsKind::Engines,
                    &to_pretty(&EngineConfig::default())?,
                )?;
            }
        }
        info!(event = "profile_created", profile = name, copy_from = ?copy_from);
        Ok(())
    }

    pub fn update_display_settings(
        &self,
        name: &str,
        settings: &DisplaySettings,
    ) -> Result<(), StoreError> {
        self.overwrite(name, SettingsKind::Display, &to_pretty(settings)?)
    }

    pub fn update_engine_config(&self, name: &str, config: &EngineConfig) -> Result<(), StoreError> {
        self.overwrite(name, SettingsKind::Engines, &to_pretty(config)?)
    }

    pub fn delete_profile(&self, name: &str) -> Result<(), StoreError> {
        self.validate_name(name)?;
        if is_default_name(name) {
            return Err(StoreError::Forbidden { action: "delete" });
        }
        let dir = self.profile_dir(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(event = "profile_deleted", profile = name);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(&dir, err)),
        }
    }

    pub fn clone_profile(&self, source: &str, new_name: &str) -> Result<(), StoreError> {
        self.validate_name(source)?;
        self.validate_name(new_name)?;
        let (ui, engines) = self.read_raw_pair(source)?;
        let dir = self.profile_dir(new_name);
        create_dir(&dir)?;
        for kind in SettingsKind::ALL {
            remove_candidates(&dir, kind)?;
        }
        self.write_canonical(new_name, SettingsKind::Display, &ui)?;
        self.write_canonical(new_name, SettingsKind::Engines, &engines)?;
        info!(event = "profile_cloned", source = source, profile = new_name);
        Ok(())
    }

    /// Renames the directory only; file names inside keep the old prefix and
    /// still resolve through the suffix scan.
    pub fn rename_profile(&self, old: &str, new: &str) -> Result<(), StoreError> {
        self.validate_name(old)?;
        self.validate_name(new)?;
        if is_default_name(old) {
            return Err(StoreError::Forbidden { action: "rename" });
        }
        let from = self.profile_dir(old);
        let to = self.profile_dir(new);
        if !from.is_dir() {
            return Err(StoreError::ProfileNotFound(old.to_string()));
        }
        if to.exists() {
            return Err(StoreError::AlreadyExists(new.to_string()));
        }
        fs::rename(&from, &to).map_err(|err| StoreError::io(&from, err))?;
        info!(event = "profile_renamed", from = old, to = new);
        Ok(())
    }

    pub fn get_active_profile(&self) -> String {
        match fs::read_to_string(self.pointer_path()) {
            Ok(content) if !content.trim().is_empty() => content.trim().to_string(),
            _ => DEFAULT_PROFILE.to_string(),
        }
    }

    pub fn set_active_profile(&self, name: &str) -> Result<(), StoreError> {
        self.validate_name(name)?;
        create_dir(&self.root)?;
        write_atomic(&self.pointer_path(), name.as_bytes())?;
        info!(event = "active_profile_set", profile = name);
        Ok(())
    }

    /// Writes built-in defaults for whichever of the default profile's files
    /// cannot be resolved. Returns true when anything was written.
    pub fn ensure_default_profile(&self) -> Result<bool, StoreError> {
        create_dir(&self.profile_dir(DEFAULT_PROFILE))?;
        let mut written = false;
        for kind in SettingsKind::ALL {
            match self.resolve_file(DEFAULT_PROFILE, kind) {
                Ok(_) => {}
                Err(StoreError::FileNotFound { .. }) => {
                    let body = match kind {
                        SettingsKind::Display => to_pretty(&DisplaySettings::default())?,
                        SettingsKind::Engines => to_pretty(&EngineConfig::default())?,
                    };
                    self.write_canonical(DEFAULT_PROFILE, kind, &body)?;
                    written = true;
                }
                Err(err) => return Err(err),
            }
        }
        if written {
            info!(event = "default_profile_seeded", dir = %self.profile_dir(DEFAULT_PROFILE).display());
        }
        Ok(written)
    }

    fn overwrite(&self, name: &str, kind: SettingsKind, body: &[u8]) -> Result<(), StoreError> {
        self.validate_name(name)?;
        let resolved = self.resolve_file(name, kind)?;
        write_atomic(&resolved.path, body)
    }

    fn read_raw_pair(&self, name: &str) -> Result<(Vec<u8>, Vec<u8>), StoreError> {
        let ui = self.resolve_file(name, SettingsKind::Display)?;
        let engines = self.resolve_file(name, SettingsKind::Engines)?;
        Ok((read_bytes(&ui.path)?, read_bytes(&engines.path)?))
    }

    fn write_canonical(&self, name: &str, kind: SettingsKind, body: &[u8]) -> Result<(), StoreError> {
        let path = self.profile_dir(name).join(kind.canonical_file_name(name));
        write_atomic(&path, body)
    }
}

/// Windows folds case and drops trailing dots and spaces, so all of these
/// name the default profile's directory there.
fn is_default_name(name: &str) -> bool {
    name.trim_end_matches(|ch: char| ch == '.' || ch == ' ')
        .eq_ignore_ascii_case(DEFAULT_PROFILE)
}

/// Deletes every file in `dir` that would compete with a freshly written
/// canonical file during resolution.
fn remove_candidates(dir: &Path, kind: SettingsKind) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|err| StoreError::io(dir, err))?;
    for entry in entries.flatten() {
        let is_file = entry.file_type().map(|ty| ty.is_file()).unwrap_or(false);
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|file_name| file_name.ends_with(kind.suffix()));
        if is_file && matches {
            let path = entry.path();
            fs::remove_file(&path).map_err(|err| StoreError::io(&path, err))?;
        }
    }
    Ok(())
}

fn dir_has_entries(dir: &Path) -> Result<bool, StoreError> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StoreError::io(dir, err)),
    }
}

fn create_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(|err| StoreError::io(path, err))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = read_bytes(path)?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn to_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|err| StoreError::Serialization(err.to_string()))
}

/// Replaces `path` with `body` via a sibling temp file and a rename, so a
/// reader never observes a half-written document.
fn write_atomic(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = parent.join(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));
    fs::write(&tmp, body).map_err(|err| StoreError::io(&tmp, err))?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(path, err));
    }
    Ok(())
}
