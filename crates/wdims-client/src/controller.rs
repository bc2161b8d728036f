use crate::api::{ClientError, ProfileApi};
use crate::binding::BindingStore;
use crate::drag::{DragReorderEngine, DragSession, DropOutcome, HoverOutcome};
use crate::link::HubLink;
use crate::mutation::{Document, DocumentKind, Mutation};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use wdims_core::events::{ClientEvent, EnginesPayload, ServerEvent, SettingsPayload};
use wdims_core::{
    DisplaySettings, Engine, EngineConfig, ErrorKind, Profile, ProfileWarnings, Tab,
    DEFAULT_PROFILE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Ready,
    /// The bound profile could not be loaded; built-in defaults are shown.
    DegradedDefault,
}

/// What happens to an optimistic edit whose save fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollbackPolicy {
    /// Put the previous document back. A save holds the controller
    /// exclusively, so nothing else can replace the edited document first.
    #[default]
    Compensate,
    /// Leave the edit on screen and only record the error.
    KeepOptimistic,
}

/// Window-address hints consulted once during bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapHints {
    pub tab_id: Option<String>,
    pub query: Option<String>,
}

impl BootstrapHints {
    /// Reads `tab` and the first of `q`, `query`, `word` from a URL query string.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.trim_start_matches('?');
        let mut hints = BootstrapHints::default();
        let mut search: [Option<String>; 3] = [None, None, None];
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "tab" => {
                    hints.tab_id.get_or_insert_with(|| value.to_string());
                    continue;
                }
                "q" => 0,
                "query" => 1,
                "word" => 2,
                _ => continue,
            };
            search[slot].get_or_insert_with(|| value.to_string());
        }
        hints.query = search.into_iter().flatten().next();
        hints
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied(DocumentKind),
    Ignored,
    Acknowledged,
    /// The caller should re-fetch the profile list.
    ProfilesListChanged,
    ErrorRecorded,
}

/// Per-window controller: owns the window's copy of its bound profile and
/// keeps it in step with the store and with other windows.
pub struct ConfigClient {
    api: Arc<dyn ProfileApi>,
    hub: Arc<dyn HubLink>,
    binding: Arc<dyn BindingStore>,
    policy: RollbackPolicy,
    phase: Phase,
    profile_name: String,
    settings: DisplaySettings,
    config: EngineConfig,
    warnings: Option<ProfileWarnings>,
    active_tab: Option<String>,
    query: String,
    last_error: Option<ClientError>,
    drag: DragReorderEngine,
    /// Bumped whenever the engine config is replaced from outside this window.
    replacements: u64,
    drag_started_at: u64,
}

impl ConfigClient {
    pub fn new(
        api: Arc<dyn ProfileApi>,
        hub: Arc<dyn HubLink>,
        binding: Arc<dyn BindingStore>,
    ) -> Self {
        Self {
            api,
            hub,
            binding,
            policy: RollbackPolicy::default(),
            phase: Phase::Loading,
            profile_name: DEFAULT_PROFILE.to_string(),
            settings: DisplaySettings::default(),
            config: EngineConfig::default(),
            warnings: None,
            active_tab: None,
            query: String::new(),
            last_error: None,
            drag: DragReorderEngine::new(),
            replacements: 0,
            drag_started_at: 0,
        }
    }

    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn warnings(&self) -> Option<&ProfileWarnings> {
        self.warnings.as_ref()
    }

    pub fn active_tab(&self) -> Option<&str> {
        self.active_tab.as_deref()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    pub fn drag_session(&self) -> Option<&DragSession> {
        self.drag.session()
    }

    /// Resolves the bound profile (window binding, else the global pointer)
    /// and loads it. Falls back to built-in defaults if loading fails.
    pub async fn bootstrap(&mut self, hints: BootstrapHints) -> Phase {
        self.phase = Phase::Loading;
        self.query = hints.query.unwrap_or_default();

        let profile_name = match self.binding.load() {
            Some(name) => name,
            None => {
                let name = match self.api.get_active_profile().await {
                    Ok(name) => name,
                    Err(err) => {
                        warn!(event = "active_profile_unavailable", error = %err);
                        DEFAULT_PROFILE.to_string()
                    }
                };
                self.binding.save(&name);
                name
            }
        };
        self.profile_name = profile_name;

        match self.api.get_profile(&self.profile_name).await {
            Ok(profile) => {
                self.install(profile);
                self.phase = Phase::Ready;
            }
            Err(err) => {
                warn!(event = "profile_load_failed", profile = %self.profile_name, error = %err);
                self.settings = DisplaySettings::default();
                self.config = EngineConfig::default();
                self.warnings = None;
                self.active_tab = self.config.first_tab_id().map(str::to_string);
                self.last_error = Some(err);
                self.phase = Phase::DegradedDefault;
            }
        }
        if let Some(tab_id) = hints.tab_id {
            self.select_tab(&tab_id);
        }
        info!(event = "window_bootstrapped", profile = %self.profile_name, phase = ?self.phase);
        self.phase
    }

    /// Rebinds this window only. The global pointer is left alone.
    pub async fn switch_profile(&mut self, name: &str) -> Result<(), ClientError> {
        let profile = match self.api.get_profile(name).await {
            Ok(profile) => profile,
            Err(err) => {
                warn!(event = "profile_switch_failed", profile = name, error = %err);
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };
        self.binding.save(name);
        self.profile_name = name.to_string();
        self.drag.cancel();
        self.install(profile);
        self.phase = Phase::Ready;
        info!(event = "window_profile_switched", profile = name);
        Ok(())
    }

    pub fn select_tab(&mut self, tab_id: &str) -> bool {
        if self.config.tab(tab_id).is_none() {
            return false;
        }
        self.active_tab = Some(tab_id.to_string());
        true
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    /// Applies `mutation` locally, then saves and relays the edited document.
    pub async fn apply(&mut self, mutation: Mutation) -> Result<(), ClientError> {
        let applied = mutation.apply(&self.settings, &self.config)?;
        debug!(event = "mutation_applied", mutation = mutation.label(), profile = %self.profile_name);
        self.install_document(applied.after.clone());
        if let Some(tab_id) = applied.select_tab {
            self.active_tab = Some(tab_id);
        }
        self.ensure_active_tab();
        self.commit(applied.before, applied.after).await
    }

    pub async fn update_settings(&mut self, settings: DisplaySettings) -> Result<(), ClientError> {
        self.apply(Mutation::ReplaceSettings(settings)).await
    }

    pub async fn reset_settings(&mut self) -> Result<(), ClientError> {
        self.apply(Mutation::ResetSettings).await
    }

    pub async fn add_engine(
        &mut self,
        tab_id: &str,
        position: usize,
        engine: Engine,
    ) -> Result<(), ClientError> {
        self.apply(Mutation::AddEngine {
            tab_id: tab_id.to_string(),
            position,
            engine,
        })
        .await
    }

    pub async fn edit_engine(
        &mut self,
        tab_id: &str,
        engine: Engine,
        target_tab_id: Option<&str>,
        position: Option<usize>,
    ) -> Result<(), ClientError> {
        self.apply(Mutation::EditEngine {
            tab_id: tab_id.to_string(),
            engine_id: engine.id.clone(),
            engine,
            target_tab_id: target_tab_id.map(str::to_string),
            position,
        })
        .await
    }

    pub async fn delete_engine(&mut self, tab_id: &str, engine_id: &str) -> Result<(), ClientError> {
        self.apply(Mutation::DeleteEngine {
            tab_id: tab_id.to_string(),
            engine_id: engine_id.to_string(),
        })
        .await
    }

    pub async fn add_tab(&mut self, position: usize, tab: Tab) -> Result<(), ClientError> {
        self.apply(Mutation::AddTab { position, tab }).await
    }

    pub async fn rename_tab(&mut self, tab_id: &str, name: &str) -> Result<(), ClientError> {
        self.apply(Mutation::RenameTab {
            tab_id: tab_id.to_string(),
            name: name.to_string(),
        })
        .await
    }

    pub async fn delete_tab(&mut self, tab_id: &str) -> Result<(), ClientError> {
        self.apply(Mutation::DeleteTab {
            tab_id: tab_id.to_string(),
        })
        .await
    }

    pub async fn reorder_tabs(&mut self, from: usize, to: usize) -> Result<(), ClientError> {
        self.apply(Mutation::ReorderTab { from, to }).await
    }

    pub fn export_engine_config(&self) -> Result<String, ClientError> {
        serde_json::to_string_pretty(&self.config).map_err(|err| ClientError::Decode(err.to_string()))
    }

    pub fn export_display_settings(&self) -> Result<String, ClientError> {
        serde_json::to_string_pretty(&self.settings)
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Replaces the whole engine config with a previously exported document.
    pub async fn import_engine_config(&mut self, raw: &str) -> Result<(), ClientError> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|err| ClientError::rejected(ErrorKind::Parse, err.to_string()))?;
        self.apply(Mutation::ImportConfig(config)).await
    }

    pub async fn import_display_settings(&mut self, raw: &str) -> Result<(), ClientError> {
        let settings: DisplaySettings = serde_json::from_str(raw)
            .map_err(|err| ClientError::rejected(ErrorKind::Parse, err.to_string()))?;
        self.apply(Mutation::ReplaceSettings(settings)).await
    }

    /// Folds a hub event into local state. Document relays only count when
    /// they are about the profile this window is bound to.
    pub fn handle_event(&mut self, event: ServerEvent) -> EventOutcome {
        match event {
            ServerEvent::DisplaySettingsChanged(payload) => {
                if payload.profile_name != self.profile_name {
                    return EventOutcome::Ignored;
                }
                self.settings = payload.settings;
                debug!(event = "remote_settings_applied", profile = %self.profile_name);
                EventOutcome::Applied(DocumentKind::Settings)
            }
            ServerEvent::SearchEnginesChanged(payload) => {
                if payload.profile_name != self.profile_name {
                    return EventOutcome::Ignored;
                }
                self.config = payload.engines;
                self.replacements += 1;
                self.ensure_active_tab();
                debug!(event = "remote_engines_applied", profile = %self.profile_name);
                EventOutcome::Applied(DocumentKind::Engines)
            }
            ServerEvent::DisplaySettingsUpdateSuccess(_)
            | ServerEvent::SearchEnginesUpdateSuccess(_) => EventOutcome::Acknowledged,
            ServerEvent::ProfileSwitched(payload) => {
                debug!(event = "remote_switch_ignored", profile = %payload.profile_name);
                EventOutcome::Ignored
            }
            ServerEvent::ProfilesListChanged => EventOutcome::ProfilesListChanged,
            ServerEvent::Error(payload) => {
                warn!(event = "hub_reported_error", message = %payload.message, error = %payload.error);
                self.last_error = Some(ClientError::Hub {
                    kind: payload.kind,
                    message: format!("{}: {}", payload.message, payload.error),
                });
                EventOutcome::ErrorRecorded
            }
        }
    }

    pub fn begin_drag(&mut self, engine_id: &str) -> bool {
        let started = self.drag.begin(&self.config, engine_id).is_some();
        if started {
            self.drag_started_at = self.replacements;
        }
        started
    }

    /// Local preview only; nothing is saved until a drop.
    pub fn drag_over(&mut self, tab_id: &str, index: usize) -> HoverOutcome {
        self.drag.hover(&mut self.config, tab_id, index)
    }

    /// Drop onto a slot. Saves the previewed order once if it changed.
    /// Returns whether anything was saved.
    pub async fn drop_on_slot(&mut self) -> Result<bool, ClientError> {
        let Some(before) = self.drag.finish() else {
            return Ok(false);
        };
        if before == self.config {
            return Ok(false);
        }
        let after = self.config.clone();
        self.commit(Document::Engines(before), Document::Engines(after))
            .await?;
        Ok(true)
    }

    /// Drop onto a tab header. Onto the engine's own tab nothing moves, but
    /// an order previewed by earlier hovers is still saved.
    pub async fn drop_on_tab(&mut self, tab_id: &str) -> Result<bool, ClientError> {
        match self.drag.drop_on_tab(&mut self.config, tab_id) {
            DropOutcome::Moved { tab_id, before } => {
                self.active_tab = Some(tab_id);
                let after = self.config.clone();
                self.commit(Document::Engines(before), Document::Engines(after))
                    .await?;
                Ok(true)
            }
            DropOutcome::SameTab { before } => {
                if before == self.config {
                    return Ok(false);
                }
                let after = self.config.clone();
                self.commit(Document::Engines(before), Document::Engines(after))
                    .await?;
                Ok(true)
            }
            DropOutcome::Ignored => Ok(false),
        }
    }

    /// Drag ended without a drop: the preview is discarded unless another
    /// window's edit replaced the config mid-drag. Returns whether the
    /// pre-drag config was put back.
    pub fn end_drag(&mut self) -> bool {
        let Some(snapshot) = self.drag.cancel() else {
            return false;
        };
        if self.replacements != self.drag_started_at {
            debug!(event = "drag_cancel_kept_remote", profile = %self.profile_name);
            return false;
        }
        self.config = snapshot;
        self.ensure_active_tab();
        true
    }

    async fn commit(&mut self, before: Document, after: Document) -> Result<(), ClientError> {
        let profile = self.profile_name.clone();
        let saved = match &after {
            Document::Settings(settings) => self.api.update_display_settings(&profile, settings).await,
            Document::Engines(config) => self.api.update_engine_config(&profile, config).await,
        };
        match saved {
            Ok(()) => {
                let event = match after {
                    Document::Settings(settings) => {
                        ClientEvent::DisplaySettingsUpdate(SettingsPayload {
                            profile_name: profile,
                            settings,
                        })
                    }
                    Document::Engines(engines) => ClientEvent::SearchEnginesUpdate(EnginesPayload {
                        profile_name: profile,
                        engines,
                    }),
                };
                self.hub.send(event);
                Ok(())
            }
            Err(err) => {
                warn!(event = "save_failed", profile = %profile, document = ?after.kind(), error = %err);
                if self.policy == RollbackPolicy::Compensate {
                    info!(event = "edit_reverted", profile = %profile, document = ?after.kind());
                    self.install_document(before);
                    self.ensure_active_tab();
                }
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn install_document(&mut self, document: Document) {
        match document {
            Document::Settings(settings) => self.settings = settings,
            Document::Engines(config) => self.config = config,
        }
    }

    fn install(&mut self, profile: Profile) {
        if let Some(warnings) = &profile.warnings {
            warn!(
                event = "profile_has_duplicate_files",
                profile = %self.profile_name,
                multiple_ui = warnings.multiple_ui_files,
                multiple_engine = warnings.multiple_engine_files
            );
        }
        self.settings = profile.display_settings;
        self.config = profile.engine_config;
        self.warnings = profile.warnings;
        self.active_tab = self.config.first_tab_id().map(str::to_string);
        self.replacements += 1;
        self.last_error = None;
    }

    fn ensure_active_tab(&mut self) {
        let valid = self
            .active_tab
            .as_deref()
            .is_some_and(|tab_id| self.config.tab(tab_id).is_some());
        if !valid {
            self.active_tab = self.config.first_tab_id().map(str::to_string);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{blank_profile, FakeApi};
    use crate::binding::MemoryBinding;
    use crate::link::testing::RecordingLink;
    use wdims_core::Theme;

    fn engine(id: &str) -> Engine {
        Engine::new(id, id, format!("https://{id}.example/?q={{query}}"))
    }

    fn profile_with(tabs: Vec<Tab>) -> Profile {
        Profile {
            engine_config: EngineConfig { tabs },
            ..blank_profile()
        }
    }

    fn tab(id: &str, engines: &[&str]) -> Tab {
        let mut tab = Tab::new(id, id.to_uppercase());
        tab.engines = engines.iter().map(|id| engine(id)).collect();
        tab
    }

    fn order(client: &ConfigClient, tab_id: &str) -> Vec<String> {
        client
            .config()
            .tab(tab_id)
            .map(|tab| tab.engines.iter().map(|e| e.id.clone()).collect())
            .unwrap_or_default()
    }

    struct Window {
        client: ConfigClient,
        link: Arc<RecordingLink>,
    }

    async fn window(api: &Arc<FakeApi>, bound: Option<&str>) -> Window {
        let link = Arc::new(RecordingLink::default());
        let mut client = ConfigClient::new(
            api.clone(),
            link.clone(),
            Arc::new(MemoryBinding::new(bound)),
        );
        client.bootstrap(BootstrapHints::default()).await;
        Window { client, link }
    }

    fn relay(event: ClientEvent) -> ServerEvent {
        match event {
            ClientEvent::DisplaySettingsUpdate(payload) => ServerEvent::DisplaySettingsChanged(payload),
            ClientEvent::SearchEnginesUpdate(payload) => ServerEvent::SearchEnginesChanged(payload),
            other => panic!("not a document update: {other:?}"),
        }
    }

    #[test]
    fn hints_parse_tab_and_first_query_alias() {
        let hints = BootstrapHints::from_query_string("?word=w&tab=code&query=rust%20async");
        assert_eq!(hints.tab_id.as_deref(), Some("code"));
        assert_eq!(hints.query.as_deref(), Some("rust async"));
        assert_eq!(BootstrapHints::from_query_string(""), BootstrapHints::default());
    }

    #[tokio::test]
    async fn bootstrap_uses_pointer_when_window_is_unbound() {
        let api = Arc::new(FakeApi::new(&["default", "work"]));
        api.insert("work", profile_with(vec![tab("t1", &["e1"]), tab("t2", &[])]));
        api.set_active_profile("work").await.expect("pointer");

        let binding = Arc::new(MemoryBinding::default());
        let mut client = ConfigClient::new(api.clone(), Arc::new(RecordingLink::default()), binding.clone());
        let phase = client
            .bootstrap(BootstrapHints {
                tab_id: Some("t2".to_string()),
                query: Some("tokio".to_string()),
            })
            .await;

        assert_eq!(phase, Phase::Ready);
        assert_eq!(client.profile_name(), "work");
        assert_eq!(binding.load().as_deref(), Some("work"));
        assert_eq!(client.active_tab(), Some("t2"));
        assert_eq!(client.query(), "tokio");
    }

    #[tokio::test]
    async fn bootstrap_ignores_unknown_tab_hint_and_degrades_on_failure() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &[])]));
        let mut client = ConfigClient::new(
            api.clone(),
            Arc::new(RecordingLink::default()),
            Arc::new(MemoryBinding::default()),
        );
        client
            .bootstrap(BootstrapHints {
                tab_id: Some("nope".to_string()),
                query: None,
            })
            .await;
        assert_eq!(client.active_tab(), Some("t1"));

        let mut gone = window(&api, Some("deleted")).await;
        assert_eq!(gone.client.phase(), Phase::DegradedDefault);
        gone.client
            .bootstrap(BootstrapHints {
                tab_id: Some("t1".to_string()),
                query: Some("still carried".to_string()),
            })
            .await;
        assert_eq!(gone.client.active_tab(), None);
        assert_eq!(gone.client.query(), "still carried");
        assert_eq!(gone.client.settings(), &DisplaySettings::default());
        assert!(gone.client.config().tabs.is_empty());
        assert_eq!(
            gone.client.last_error().map(ClientError::kind),
            Some(ErrorKind::NotFound)
        );
    }

    #[tokio::test]
    async fn edits_save_then_relay_once() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1"])]));
        let mut w = window(&api, None).await;

        w.client
            .add_engine("t1", 0, engine("e0"))
            .await
            .expect("add");
        assert_eq!(order(&w.client, "t1"), vec!["e0", "e1"]);
        assert_eq!(api.saves(), vec!["engines:default"]);
        let sent = w.link.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], ClientEvent::SearchEnginesUpdate(p) if p.profile_name == "default" && p.engines.tabs[0].engines.len() == 2));
    }

    #[tokio::test]
    async fn failed_save_reverts_and_sends_nothing() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1", "e2"])]));
        let mut w = window(&api, None).await;
        api.fail_updates(true);

        let err = w
            .client
            .delete_engine("t1", "e1")
            .await
            .expect_err("save fails");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(order(&w.client, "t1"), vec!["e1", "e2"]);
        assert_eq!(w.client.last_error(), Some(&err));
        assert!(w.link.take().is_empty());

        let dark = DisplaySettings {
            theme: Theme::Dark,
            ..DisplaySettings::default()
        };
        w.client.update_settings(dark).await.expect_err("save fails");
        assert_eq!(w.client.settings().theme, Theme::Light);
    }

    #[tokio::test]
    async fn keep_optimistic_policy_leaves_edit_in_place() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1"])]));
        let link = Arc::new(RecordingLink::default());
        let mut client = ConfigClient::new(api.clone(), link, Arc::new(MemoryBinding::default()))
            .with_rollback_policy(RollbackPolicy::KeepOptimistic);
        client.bootstrap(BootstrapHints::default()).await;
        api.fail_updates(true);

        client.rename_tab("t1", "Renamed").await.expect_err("save fails");
        assert_eq!(client.config().tabs[0].name, "Renamed");
        assert!(client.last_error().is_some());
    }

    #[tokio::test]
    async fn rejected_mutations_touch_nothing() {
        let api = Arc::new(FakeApi::new(&["default"]));
        let mut w = window(&api, None).await;
        let err = w.client.delete_tab("ghost").await.expect_err("no tab");
        assert!(matches!(err, ClientError::Rejected { kind: ErrorKind::NotFound, .. }));
        assert!(api.saves().is_empty());
        assert!(w.link.take().is_empty());
    }

    #[tokio::test]
    async fn tab_selection_follows_edits() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1"]), tab("t2", &[])]));
        let mut w = window(&api, None).await;

        w.client.add_tab(2, Tab::new("t3", "T3")).await.expect("add tab");
        assert_eq!(w.client.active_tab(), Some("t3"));

        w.client.delete_tab("t3").await.expect("delete tab");
        assert_eq!(w.client.active_tab(), Some("t1"));

        w.client
            .edit_engine("t1", engine("e1"), Some("t2"), None)
            .await
            .expect("move");
        assert_eq!(w.client.active_tab(), Some("t2"));
        assert_eq!(order(&w.client, "t2"), vec!["e1"]);
    }

    #[tokio::test]
    async fn windows_only_apply_events_for_their_profile() {
        let api = Arc::new(FakeApi::new(&["work", "home"]));
        api.insert("work", profile_with(vec![tab("t1", &["e1"])]));
        api.insert("home", profile_with(vec![tab("h1", &["x1"])]));
        let mut a = window(&api, Some("work")).await;
        let mut b = window(&api, Some("home")).await;
        let mut c = window(&api, Some("work")).await;

        a.client
            .add_engine("t1", 1, engine("e2"))
            .await
            .expect("add");
        let event = relay(a.link.take().remove(0));

        assert_eq!(b.client.handle_event(event.clone()), EventOutcome::Ignored);
        assert_eq!(order(&b.client, "h1"), vec!["x1"]);
        assert_eq!(
            c.client.handle_event(event),
            EventOutcome::Applied(DocumentKind::Engines)
        );
        assert_eq!(order(&c.client, "t1"), vec!["e1", "e2"]);

        assert_eq!(
            b.client.handle_event(ServerEvent::ProfileSwitched(wdims_core::events::ProfileRef {
                profile_name: "work".to_string()
            })),
            EventOutcome::Ignored
        );
        assert_eq!(b.client.profile_name(), "home");
        assert_eq!(
            b.client.handle_event(ServerEvent::ProfilesListChanged),
            EventOutcome::ProfilesListChanged
        );
    }

    #[tokio::test]
    async fn hub_errors_are_recorded() {
        let api = Arc::new(FakeApi::new(&["default"]));
        let mut w = window(&api, None).await;
        let outcome = w.client.handle_event(ServerEvent::error(
            "Failed to update search engines",
            "disk full",
            Some(ErrorKind::Io),
        ));
        assert_eq!(outcome, EventOutcome::ErrorRecorded);
        assert_eq!(w.client.last_error().map(ClientError::kind), Some(ErrorKind::Io));
    }

    #[tokio::test]
    async fn switch_profile_rebinds_window_only() {
        let api = Arc::new(FakeApi::new(&["default", "home"]));
        api.insert("home", profile_with(vec![tab("h1", &[]), tab("h2", &[])]));
        let binding = Arc::new(MemoryBinding::default());
        let mut client = ConfigClient::new(api.clone(), Arc::new(RecordingLink::default()), binding.clone());
        client.bootstrap(BootstrapHints::default()).await;

        client.switch_profile("home").await.expect("switch");
        assert_eq!(client.profile_name(), "home");
        assert_eq!(client.active_tab(), Some("h1"));
        assert_eq!(binding.load().as_deref(), Some("home"));
        assert_eq!(api.active(), "default");

        client.switch_profile("ghost").await.expect_err("missing");
        assert_eq!(client.profile_name(), "home");
    }

    #[tokio::test]
    async fn drag_to_front_persists_and_relays_once() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1", "e2"])]));
        let mut w = window(&api, None).await;

        assert!(w.client.begin_drag("e2"));
        assert_eq!(w.client.drag_over("t1", 0), HoverOutcome::Moved);
        assert_eq!(w.client.drag_over("t1", 0), HoverOutcome::Unchanged);
        assert!(api.saves().is_empty());

        assert!(w.client.drop_on_slot().await.expect("drop"));
        assert_eq!(order(&w.client, "t1"), vec!["e2", "e1"]);
        assert_eq!(api.saves(), vec!["engines:default"]);
        assert_eq!(w.link.take().len(), 1);
        assert_eq!(
            api.profile("default").map(|p| p.engine_config),
            Some(w.client.config().clone())
        );
        assert!(!w.client.end_drag());
    }

    #[tokio::test]
    async fn drop_on_tab_header_moves_to_front_and_selects_tab() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1", "e2"]), tab("t2", &["x1"])]));
        let mut w = window(&api, None).await;

        w.client.begin_drag("e2");
        assert!(!w.client.drop_on_tab("t1").await.expect("same tab"));
        assert!(api.saves().is_empty());

        w.client.begin_drag("e2");
        assert!(w.client.drop_on_tab("t2").await.expect("other tab"));
        assert_eq!(order(&w.client, "t2"), vec!["e2", "x1"]);
        assert_eq!(w.client.active_tab(), Some("t2"));
        assert_eq!(api.saves().len(), 1);
    }

    #[tokio::test]
    async fn header_drop_on_hovered_tab_saves_the_preview() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1", "e2"]), tab("t2", &["x1"])]));
        let mut w = window(&api, None).await;

        w.client.begin_drag("e2");
        w.client.drag_over("t2", 0);
        assert!(w.client.drop_on_tab("t2").await.expect("drop"));
        assert!(!w.client.end_drag());

        assert_eq!(order(&w.client, "t2"), vec!["e2", "x1"]);
        assert_eq!(order(&w.client, "t1"), vec!["e1"]);
        assert_eq!(
            api.profile("default").map(|p| p.engine_config),
            Some(w.client.config().clone())
        );
        assert_eq!(api.saves(), vec!["engines:default"]);
        assert_eq!(w.link.take().len(), 1);
    }

    #[tokio::test]
    async fn failed_drop_restores_pre_drag_order() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1", "e2", "e3"])]));
        let mut w = window(&api, None).await;
        api.fail_updates(true);

        w.client.begin_drag("e3");
        w.client.drag_over("t1", 0);
        w.client.drop_on_slot().await.expect_err("save fails");
        assert_eq!(order(&w.client, "t1"), vec!["e1", "e2", "e3"]);
    }

    #[tokio::test]
    async fn drag_cancel_restores_unless_replaced_remotely() {
        let api = Arc::new(FakeApi::new(&["default"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1", "e2"])]));
        let mut w = window(&api, None).await;

        w.client.begin_drag("e1");
        w.client.drag_over("t1", 1);
        assert!(w.client.end_drag());
        assert_eq!(order(&w.client, "t1"), vec!["e1", "e2"]);

        w.client.begin_drag("e1");
        w.client.drag_over("t1", 1);
        w.client.handle_event(ServerEvent::SearchEnginesChanged(EnginesPayload {
            profile_name: "default".to_string(),
            engines: EngineConfig {
                tabs: vec![tab("t1", &["e2", "e1", "e9"])],
            },
        }));
        assert!(!w.client.end_drag());
        assert_eq!(order(&w.client, "t1"), vec!["e2", "e1", "e9"]);
        assert!(api.saves().is_empty());
    }

    #[tokio::test]
    async fn export_then_import_round_trips_config() {
        let api = Arc::new(FakeApi::new(&["default", "other"]));
        api.insert("default", profile_with(vec![tab("t1", &["e1"]), tab("t2", &["e2"])]));
        let source = window(&api, None).await;
        let exported = source.client.export_engine_config().expect("export");

        let mut target = window(&api, Some("other")).await;
        target.client.import_engine_config(&exported).await.expect("import");
        assert_eq!(target.client.config(), source.client.config());
        assert_eq!(target.client.active_tab(), Some("t1"));

        let err = target
            .client
            .import_engine_config("{ nope")
            .await
            .expect_err("bad json");
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
