//! Live drag-reorder preview. Each hover moves the dragged engine relative
//! to where the previous hover left it, never relative to where the drag
//! started. Repeating a hover is a no-op; a winding hover path can end in an
//! order that a single remove-and-insert from the start would not produce.

use wdims_core::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSession {
    pub engine_id: String,
    pub tab_id: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverOutcome {
    Moved,
    Unchanged,
    /// No session, unknown tab, or the dragged engine no longer exists.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// The engine now sits first in `tab_id`; `before` is the pre-drag config.
    Moved { tab_id: String, before: EngineConfig },
    /// Dropped onto the tab the engine already sits in. No further move is
    /// made; `before` is the pre-drag config, so a caller can tell whether
    /// earlier hovers left anything to save.
    SameTab { before: EngineConfig },
    Ignored,
}

#[derive(Debug, Default)]
pub struct DragReorderEngine {
    session: Option<DragSession>,
    snapshot: Option<EngineConfig>,
}

impl DragReorderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Starts tracking `engine_id` at its current location. Returns `None`
    /// (and leaves any previous session untouched) if the engine is unknown.
    pub fn begin(&mut self, config: &EngineConfig, engine_id: &str) -> Option<&DragSession> {
        let (tab_id, index) = config.locate_engine(engine_id)?;
        self.session = Some(DragSession {
            engine_id: engine_id.to_string(),
            tab_id: tab_id.to_string(),
            index,
        });
        self.snapshot = Some(config.clone());
        self.session.as_ref()
    }

    pub fn hover(&mut self, config: &mut EngineConfig, tab_id: &str, index: usize) -> HoverOutcome {
        let Some(session) = self.session.as_mut() else {
            return HoverOutcome::Ignored;
        };
        if session.tab_id == tab_id && session.index == index {
            return HoverOutcome::Unchanged;
        }
        let Some((source_tab, source_index)) = current_position(config, session) else {
            return HoverOutcome::Ignored;
        };
        if config.tab(tab_id).is_none() {
            return HoverOutcome::Ignored;
        }

        let Some(engine) = config
            .tab_mut(&source_tab)
            .map(|tab| tab.engines.remove(source_index))
        else {
            return HoverOutcome::Ignored;
        };
        let Some(target) = config.tab_mut(tab_id) else {
            return HoverOutcome::Ignored;
        };
        let at = index.min(target.engines.len());
        target.engines.insert(at, engine);

        session.tab_id = tab_id.to_string();
        session.index = at;
        HoverOutcome::Moved
    }

    /// Drop onto a tab header: the engine goes to index 0 of `tab_id` unless
    /// it already lives in that tab.
    pub fn drop_on_tab(&mut self, config: &mut EngineConfig, tab_id: &str) -> DropOutcome {
        let Some(session) = self.session.as_ref() else {
            return DropOutcome::Ignored;
        };
        let Some((source_tab, source_index)) = current_position(config, session) else {
            self.clear();
            return DropOutcome::Ignored;
        };
        if config.tab(tab_id).is_none() {
            return DropOutcome::Ignored;
        }
        if source_tab == tab_id {
            let before = self.snapshot.take().unwrap_or_default();
            self.session = None;
            return DropOutcome::SameTab { before };
        }

        if let Some(engine) = config
            .tab_mut(&source_tab)
            .map(|tab| tab.engines.remove(source_index))
        {
            if let Some(target) = config.tab_mut(tab_id) {
                target.engines.insert(0, engine);
            }
        }
        let before = self.snapshot.take().unwrap_or_default();
        self.session = None;
        DropOutcome::Moved {
            tab_id: tab_id.to_string(),
            before,
        }
    }

    /// Drop onto a slot: the preview already is the final order. Returns the
    /// pre-drag config, or `None` when no drag was in progress.
    pub fn finish(&mut self) -> Option<EngineConfig> {
        self.session.take()?;
        self.snapshot.take()
    }

    /// Drag ended without a drop. Returns the pre-drag config so the caller
    /// can put it back.
    pub fn cancel(&mut self) -> Option<EngineConfig> {
        self.session.take()?;
        self.snapshot.take()
    }

    fn clear(&mut self) {
        self.session = None;
        self.snapshot = None;
    }
}

/// Tracked slot if it still holds the dragged engine, else wherever the
/// engine is now.
fn current_position(config: &EngineConfig, session: &DragSession) -> Option<(String, usize)> {
    let tracked = config
        .tab(&session.tab_id)
        .and_then(|tab| tab.engines.get(session.index))
        .is_some_and(|engine| engine.id == session.engine_id);
    if tracked {
        return Some((session.tab_id.clone(), session.index));
    }
    config
        .locate_engine(&session.engine_id)
        .map(|(tab_id, index)| (tab_id.to_string(), index))
}
