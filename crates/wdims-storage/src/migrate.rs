use crate::{ProfileStore, SettingsKind, StoreError};
use serde::Serialize;
use std::fs;
use std::io;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    AlreadyCanonical,
    Migrated { from: String },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationEntry {
    pub profile: String,
    pub kind: SettingsKind,
    #[serde(flatten)]
    pub outcome: MigrationOutcome,
}

impl SettingsKind {
    /// Older file names, newest layout first.
    fn legacy_file_names(&self) -> &'static [&'static str] {
        match self {
            SettingsKind::Display => &["wdims_ui.json", "display-settings.json"],
            SettingsKind::Engines => &["wdims_engine.json", "search-engines.json"],
        }
    }
}

impl ProfileStore {
    /// Renames pre-`<name>.wdims_*.json` settings files to their canonical
    /// names. A profile that already has its canonical file is left alone.
    pub fn migrate_legacy_files(&self) -> Result<Vec<MigrationEntry>, StoreError> {
        let profiles_dir = self.profiles_dir();
        let entries = match fs::read_dir(&profiles_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(StoreError::Io {
                    path: profiles_dir,
                    source: err,
                })
            }
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|ty| ty.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let mut report = Vec::new();
        for name in names {
            for kind in SettingsKind::ALL {
                let outcome = self.migrate_one(&name, kind)?;
                match &outcome {
                    MigrationOutcome::Migrated { from } => {
                        info!(event = "legacy_file_migrated", profile = %name, from = %from, kind = ?kind);
                    }
                    MigrationOutcome::Missing => {
                        warn!(event = "legacy_file_missing", profile = %name, kind = ?kind);
                    }
                    MigrationOutcome::AlreadyCanonical => {}
                }
                report.push(MigrationEntry {
                    profile: name.clone(),
                    kind,
                    outcome,
                });
            }
        }
        Ok(report)
    }

    fn migrate_one(&self, name: &str, kind: SettingsKind) -> Result<MigrationOutcome, StoreError> {
        let dir = self.profile_dir(name);
        let canonical = dir.join(kind.canonical_file_name(name));
        if canonical.is_file() {
            return Ok(MigrationOutcome::AlreadyCanonical);
        }
        for legacy in kind.legacy_file_names() {
            let from = dir.join(legacy);
            if !from.is_file() {
                continue;
            }
            fs::rename(&from, &canonical).map_err(|err| StoreError::Io {
                path: from.clone(),
                source: err,
            })?;
            return Ok(MigrationOutcome::Migrated {
                from: legacy.to_string(),
            });
        }
        Ok(MigrationOutcome::Missing)
    }
}
