use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const STORE_URL_ENV: &str = "CUMULUS_STORE_URL";
pub const BICEP_ENV: &str = "CUMULUS_BICEP";

/// Resolve the global data directory (~/.cumulus/).
pub fn cumulus_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cumulus")
}

/// Default location of file-backed designs.
pub fn designs_dir() -> PathBuf {
    cumulus_dir().join("designs")
}

fn settings_path() -> PathBuf {
    cumulus_dir().join("settings.json")
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreSettings {
    #[default]
    File,
    Http {
        #[serde(rename = "baseUrl")]
        base_url: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudioSettings {
    #[serde(default)]
    pub store: StoreSettings,
    /// Explicit path to the `bicep` executable. Looked up on PATH when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bicep_path: Option<String>,
}

impl StudioSettings {
    /// Environment variables win over the settings file.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(STORE_URL_ENV) {
            if !url.trim().is_empty() {
                self.store = StoreSettings::Http { base_url: url };
            }
        }
        if let Ok(path) = std::env::var(BICEP_ENV) {
            if !path.trim().is_empty() {
                self.bicep_path = Some(path);
            }
        }
        self
    }
}

/// Read settings, falling back to defaults when the file is missing or unreadable.
pub fn read_settings() -> StudioSettings {
    let path = settings_path();
    let settings = if path.exists() {
        fs::read_to_string(&path)
            .ok()
            .and_then(|s| parse_settings(&s))
            .unwrap_or_default()
    } else {
        StudioSettings::default()
    };
    settings.with_env_overrides()
}

fn parse_settings(raw: &str) -> Option<StudioSettings> {
    match serde_json::from_str(raw) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("ignoring unreadable settings file: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_store_settings_parse() {
        let s = parse_settings(r#"{"store":{"kind":"http","baseUrl":"https://x.test"},"bicepPath":"/opt/bicep"}"#)
            .unwrap();
        assert_eq!(
            s.store,
            StoreSettings::Http {
                base_url: "https://x.test".into()
            }
        );
        assert_eq!(s.bicep_path.as_deref(), Some("/opt/bicep"));
    }

    #[test]
    fn missing_fields_default_to_file_store() {
        let s = parse_settings("{}").unwrap();
        assert_eq!(s, StudioSettings::default());
        assert!(parse_settings("not json").is_none());
    }
}
