use crate::storage::{KeyValueStore, StorageError};
use serde::{Deserialize, Serialize};

pub const SETTINGS_KEY: &str = "llm-settings";

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// User-tunable generation parameters, persisted as one record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Empty means the field is left out of the outbound request.
    pub reasoning_effort: String,
    pub streaming_mode: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            reasoning_effort: String::new(),
            streaming_mode: false,
        }
    }
}

impl GenerationSettings {
    pub fn reasoning_effort(&self) -> Option<&str> {
        let effort = self.reasoning_effort.trim();
        (!effort.is_empty()).then_some(effort)
    }
}

#[derive(Clone, Debug)]
pub struct SettingsStore<S> {
    store: S,
}

impl<S: KeyValueStore> SettingsStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Missing or unreadable records fall back to defaults field by field.
    pub fn load(&self) -> GenerationSettings {
        let Some(raw) = self.store.get(SETTINGS_KEY) else {
            return GenerationSettings::default();
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("ignoring unreadable settings record: {err}");
                GenerationSettings::default()
            }
        }
    }

    pub fn save(&self, settings: &GenerationSettings) -> Result<(), StorageError> {
        let raw = serde_json::to_string(settings)?;
        self.store.set(SETTINGS_KEY, &raw)
    }
}
