//! Local edits as commands. Applying one never touches the original
//! documents; it yields the replacement document plus the document it
//! replaces, which is what a failed save restores.

use crate::api::ClientError;
use thiserror::Error;
use wdims_core::{DisplaySettings, Engine, EngineConfig, ErrorKind, Tab};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("tab {0:?} not found")]
    TabNotFound(String),
    #[error("engine {0:?} not found")]
    EngineNotFound(String),
    #[error("tab id {0:?} already in use")]
    DuplicateTab(String),
    #[error("index {index} out of range for {len} tabs")]
    IndexOutOfRange { index: usize, len: usize },
}

impl MutationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MutationError::TabNotFound(_)
            | MutationError::EngineNotFound(_)
            | MutationError::IndexOutOfRange { .. } => ErrorKind::NotFound,
            MutationError::DuplicateTab(_) => ErrorKind::AlreadyExists,
        }
    }
}

impl From<MutationError> for ClientError {
    fn from(err: MutationError) -> Self {
        ClientError::rejected(err.kind(), err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    ReplaceSettings(DisplaySettings),
    ResetSettings,
    /// Inserts at `position` in `tab_id`, clamped to the tab length.
    AddEngine {
        tab_id: String,
        position: usize,
        engine: Engine,
    },
    /// Replaces an engine's content. With `target_tab_id` naming another tab
    /// the engine moves there (at `position`, default 0); otherwise a
    /// differing `position` reorders it within its tab.
    EditEngine {
        tab_id: String,
        engine_id: String,
        engine: Engine,
        target_tab_id: Option<String>,
        position: Option<usize>,
    },
    DeleteEngine {
        tab_id: String,
        engine_id: String,
    },
    AddTab {
        position: usize,
        tab: Tab,
    },
    RenameTab {
        tab_id: String,
        name: String,
    },
    DeleteTab {
        tab_id: String,
    },
    ReorderTab {
        from: usize,
        to: usize,
    },
    ImportConfig(EngineConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Settings,
    Engines,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Settings(DisplaySettings),
    Engines(EngineConfig),
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Settings(_) => DocumentKind::Settings,
            Document::Engines(_) => DocumentKind::Engines,
        }
    }
}

/// Result of applying a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub before: Document,
    pub after: Document,
    /// Tab the window should show after the edit, if the edit implies one.
    pub select_tab: Option<String>,
}

impl Mutation {
    pub fn target(&self) -> DocumentKind {
        match self {
            Mutation::ReplaceSettings(_) | Mutation::ResetSettings => DocumentKind::Settings,
            _ => DocumentKind::Engines,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mutation::ReplaceSettings(_) => "replace_settings",
            Mutation::ResetSettings => "reset_settings",
            Mutation::AddEngine { .. } => "add_engine",
            Mutation::EditEngine { .. } => "edit_engine",
            Mutation::DeleteEngine { .. } => "delete_engine",
            Mutation::AddTab { .. } => "add_tab",
            Mutation::RenameTab { .. } => "rename_tab",
            Mutation::DeleteTab { .. } => "delete_tab",
            Mutation::ReorderTab { .. } => "reorder_tab",
            Mutation::ImportConfig(_) => "import_config",
        }
    }

    pub fn apply(
        &self,
        settings: &DisplaySettings,
        config: &EngineConfig,
    ) -> Result<Applied, MutationError> {
        match self {
            Mutation::ReplaceSettings(next) => Ok(settings_change(settings, next.clone())),
            Mutation::ResetSettings => Ok(settings_change(settings, DisplaySettings::default())),
            _ => {
                let mut next = config.clone();
                let select_tab = self.apply_engines(&mut next)?;
                Ok(Applied {
                    before: Document::Engines(config.clone()),
                    after: Document::Engines(next),
                    select_tab,
                })
            }
        }
    }

    fn apply_engines(&self, config: &mut EngineConfig) -> Result<Option<String>, MutationError> {
        match self {
            Mutation::ReplaceSettings(_) | Mutation::ResetSettings => Ok(None),
            Mutation::AddEngine {
                tab_id,
                position,
                engine,
            } => {
                let tab = tab_mut(config, tab_id)?;
                let at = (*position).min(tab.engines.len());
                tab.engines.insert(at, engine.clone());
                Ok(None)
            }
            Mutation::EditEngine {
                tab_id,
                engine_id,
                engine,
                target_tab_id,
                position,
            } => {
                let source = tab_mut(config, tab_id)?;
                let index = source
                    .position_of(engine_id)
                    .ok_or_else(|| MutationError::EngineNotFound(engine_id.clone()))?;
                match target_tab_id.as_deref().filter(|target| *target != tab_id.as_str()) {
                    Some(target) => {
                        if config.tab(target).is_none() {
                            return Err(MutationError::TabNotFound(target.to_string()));
                        }
                        tab_mut(config, tab_id)?.engines.remove(index);
                        let target_tab = tab_mut(config, target)?;
                        let at = position.unwrap_or(0).min(target_tab.engines.len());
                        target_tab.engines.insert(at, engine.clone());
                        Ok(Some(target.to_string()))
                    }
                    None => {
                        match position.filter(|position| *position != index) {
                            Some(position) => {
                                source.engines.remove(index);
                                let at = position.min(source.engines.len());
                                source.engines.insert(at, engine.clone());
                            }
                            None => source.engines[index] = engine.clone(),
                        }
                        Ok(None)
                    }
                }
            }
            Mutation::DeleteEngine { tab_id, engine_id } => {
                let tab = tab_mut(config, tab_id)?;
                let index = tab
                    .position_of(engine_id)
                    .ok_or_else(|| MutationError::EngineNotFound(engine_id.clone()))?;
                tab.engines.remove(index);
                Ok(None)
            }
            Mutation::AddTab { position, tab } => {
                if config.tab(&tab.id).is_some() {
                    return Err(MutationError::DuplicateTab(tab.id.clone()));
                }
                let at = (*position).min(config.tabs.len());
                config.tabs.insert(at, tab.clone());
                Ok(Some(tab.id.clone()))
            }
            Mutation::RenameTab { tab_id, name } => {
                tab_mut(config, tab_id)?.name = name.clone();
                Ok(None)
            }
            Mutation::DeleteTab { tab_id } => {
                let index = config
                    .tab_index(tab_id)
                    .ok_or_else(|| MutationError::TabNotFound(tab_id.clone()))?;
                config.tabs.remove(index);
                Ok(None)
            }
            Mutation::ReorderTab { from, to } => {
                let len = config.tabs.len();
                if *from >= len {
                    return Err(MutationError::IndexOutOfRange { index: *from, len });
                }
                let moved = config.tabs.remove(*from);
                let at = (*to).min(config.tabs.len());
                config.tabs.insert(at, moved);
                Ok(None)
            }
            Mutation::ImportConfig(imported) => {
                *config = imported.clone();
                Ok(config.first_tab_id().map(str::to_string))
            }
        }
    }
}

fn settings_change(current: &DisplaySettings, next: DisplaySettings) -> Applied {
    Applied {
        before: Document::Settings(current.clone()),
        after: Document::Settings(next),
        select_tab: None,
    }
}

fn tab_mut<'a>(config: &'a mut EngineConfig, tab_id: &str) -> Result<&'a mut Tab, MutationError> {
    config
        .tab_mut(tab_id)
        .ok_or_else(|| MutationError::TabNotFound(tab_id.to_string()))
}
