use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub mod events;
pub mod naming;

pub use naming::{validate_profile_name, NameError, DEFAULT_PROFILE};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("Unknown theme: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CardsPerRowMode {
    Fixed,
    #[default]
    Auto,
}

/// Per-profile presentation preferences. Always replaced as a whole document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    pub theme: Theme,
    pub card_scale: f64,
    pub font_size: f64,
    pub cards_per_row_mode: CardsPerRowMode,
    pub min_cards_per_row: u32,
    pub show_name: bool,
    pub show_description: bool,
    pub show_url: bool,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            card_scale: 1.0,
            font_size: 1.0,
            cards_per_row_mode: CardsPerRowMode::Auto,
            min_cards_per_row: 4,
            show_name: true,
            show_description: true,
            show_url: true,
            extra: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Engine {
    pub id: String,
    pub name: String,
    /// URL template; the search text is substituted by the UI.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl Engine {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            icon: None,
            description: None,
            extra: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tab {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub engines: Vec<Engine>,
}

impl Tab {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            engines: Vec::new(),
        }
    }

    pub fn position_of(&self, engine_id: &str) -> Option<usize> {
        self.engines.iter().position(|engine| engine.id == engine_id)
    }
}

/// Ordered tabs of engines. Order is display order at both levels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

impl EngineConfig {
    pub fn tab(&self, tab_id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|tab| tab.id == tab_id)
    }

    pub fn tab_mut(&mut self, tab_id: &str) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|tab| tab.id == tab_id)
    }

    pub fn tab_index(&self, tab_id: &str) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == tab_id)
    }

    pub fn first_tab_id(&self) -> Option<&str> {
        self.tabs.first().map(|tab| tab.id.as_str())
    }

    /// Returns `(tab_id, index)` of the first engine carrying `engine_id`.
    pub fn locate_engine(&self, engine_id: &str) -> Option<(&str, usize)> {
        self.tabs.iter().find_map(|tab| {
            tab.position_of(engine_id)
                .map(|index| (tab.id.as_str(), index))
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileWarnings {
    #[serde(default)]
    pub multiple_ui_files: bool,
    #[serde(default)]
    pub multiple_engine_files: bool,
}

impl ProfileWarnings {
    pub fn any(&self) -> bool {
        self.multiple_ui_files || self.multiple_engine_files
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_settings: DisplaySettings,
    #[serde(alias = "searchEngines")]
    pub engine_config: EngineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warnings: Option<ProfileWarnings>,
}

/// Error taxonomy shared by the store, the HTTP surface and clients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidName,
    NotFound,
    Forbidden,
    AlreadyExists,
    Io,
    Parse,
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Io => "io",
            ErrorKind::Parse => "parse",
            ErrorKind::Transport => "transport",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_settings_use_camel_case_keys() {
        let value = serde_json::to_value(DisplaySettings::default()).expect("serialize");
        assert_eq!(value["theme"], "light");
        assert_eq!(value["cardsPerRowMode"], "auto");
        assert_eq!(value["minCardsPerRow"], 4);
        assert_eq!(value["showUrl"], true);
    }

    #[test]
    fn unknown_engine_fields_survive_round_trip() {
        let raw = r#"{"id":"e1","name":"Docs","url":"https://docs.rs/?q={query}","shortcut":"d"}"#;
        let engine: Engine = serde_json::from_str(raw).expect("parse");
        assert_eq!(engine.extra.get("shortcut"), Some(&Value::from("d")));
        let back = serde_json::to_value(&engine).expect("serialize");
        assert_eq!(back["shortcut"], "d");
        assert!(back.get("icon").is_none());
    }

    #[test]
    fn profile_accepts_legacy_search_engines_key() {
        let raw = serde_json::json!({
            "displaySettings": DisplaySettings::default(),
            "searchEngines": { "tabs": [] }
        });
        let profile: Profile = serde_json::from_value(raw).expect("parse");
        assert!(profile.engine_config.tabs.is_empty());
        assert!(profile.warnings.is_none());
    }

    #[test]
    fn locate_engine_reports_tab_and_index() {
        let mut first = Tab::new("t1", "Web");
        first.engines.push(Engine::new("e1", "A", "https://a"));
        let mut second = Tab::new("t2", "Code");
        second.engines.push(Engine::new("e2", "B", "https://b"));
        second.engines.push(Engine::new("e3", "C", "https://c"));
        let config = EngineConfig {
            tabs: vec![first, second],
        };

        assert_eq!(config.locate_engine("e3"), Some(("t2", 1)));
        assert_eq!(config.locate_engine("missing"), None);
        assert_eq!(config.first_tab_id(), Some("t1"));
        assert_eq!(config.tab_index("t2"), Some(1));
    }
}
