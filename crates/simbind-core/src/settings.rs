// Simbind Settings Module
// User-configurable engine settings and the simulator event catalog

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::action::EventCatalog;
use crate::dispatch::DispatchSettings;

/// Engine settings
///
/// Loaded from a TOML file (default: ~/.config/simbind/settings.toml):
///
/// ```toml
/// [dispatch]
/// auto_repeat = true
/// poll_interval_ms = 50
///
/// [events]
/// GEAR_TOGGLE = 65570
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    /// Treat Repeat edges as additional presses
    auto_repeat: bool,

    poll_interval: Duration,

    test_mode_interval: Duration,

    /// Simulator event names and ids
    events: EventCatalog,

    /// Path to the settings file (for reload)
    source_path: Option<PathBuf>,
}

/// Errors that can occur when loading settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// TOML representation for deserializing settings
#[derive(Debug, Clone, serde::Deserialize, Default)]
struct SettingsToml {
    #[serde(default)]
    dispatch: Option<DispatchToml>,

    #[serde(default)]
    events: Option<HashMap<String, toml::Value>>,
}

#[derive(Debug, Clone, serde::Deserialize, Default)]
struct DispatchToml {
    #[serde(default)]
    auto_repeat: Option<toml::Value>,

    #[serde(default)]
    poll_interval_ms: Option<u64>,

    #[serde(default)]
    test_mode_interval_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Create settings with the built-in defaults
    pub fn new() -> Self {
        let defaults = DispatchSettings::default();
        Self {
            auto_repeat: defaults.auto_repeat,
            poll_interval: defaults.poll_interval,
            test_mode_interval: defaults.test_mode_interval,
            events: EventCatalog::new(),
            source_path: None,
        }
    }

    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(&path)?;
        let mut settings = Self::from_toml(&content)?;
        settings.source_path = Some(path.as_ref().to_path_buf());
        Ok(settings)
    }

    /// Load settings from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let toml_settings: SettingsToml =
            toml::from_str(content).map_err(|e| SettingsError::TomlParse(e.to_string()))?;

        let mut settings = Self::new();

        if let Some(dispatch) = toml_settings.dispatch {
            if let Some(value) = dispatch.auto_repeat {
                settings.auto_repeat = parse_bool_value(&value)?;
            }
            if let Some(ms) = dispatch.poll_interval_ms {
                if ms == 0 {
                    return Err(SettingsError::InvalidValue(
                        "poll_interval_ms must be positive".to_string(),
                    ));
                }
                settings.poll_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = dispatch.test_mode_interval_ms {
                if ms == 0 {
                    return Err(SettingsError::InvalidValue(
                        "test_mode_interval_ms must be positive".to_string(),
                    ));
                }
                settings.test_mode_interval = Duration::from_millis(ms);
            }
        }

        if let Some(events) = toml_settings.events {
            for (name, value) in events {
                let id = parse_event_id(&name, &value)?;
                settings.events.insert(name, id);
            }
        }

        Ok(settings)
    }

    /// Get the default settings path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("simbind").join("settings.toml"))
    }

    /// Load from default location (~/.config/simbind/settings.toml)
    pub fn load_default() -> Result<Self, SettingsError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        // Return default settings if file doesn't exist
        Ok(Self::new())
    }

    /// Reload settings from the original file
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        if let Some(ref path) = self.source_path {
            let new_settings = Self::from_file(path)?;
            *self = new_settings;
            Ok(())
        } else {
            Err(SettingsError::InvalidValue("No source path set".to_string()))
        }
    }

    pub fn auto_repeat(&self) -> bool {
        self.auto_repeat
    }

    pub fn set_auto_repeat(&mut self, value: bool) {
        self.auto_repeat = value;
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn test_mode_interval(&self) -> Duration {
        self.test_mode_interval
    }

    pub fn event_catalog(&self) -> &EventCatalog {
        &self.events
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Settings handed to the dispatcher
    pub fn to_dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            auto_repeat: self.auto_repeat,
            poll_interval: self.poll_interval,
            test_mode_interval: self.test_mode_interval,
            events: self.events.clone(),
        }
    }
}

/// Parse a TOML value as a boolean
fn parse_bool_value(value: &toml::Value) -> Result<bool, SettingsError> {
    match value {
        toml::Value::Boolean(b) => Ok(*b),
        toml::Value::Integer(1) => Ok(true),
        toml::Value::Integer(0) => Ok(false),
        toml::Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(SettingsError::InvalidValue(format!(
                "Cannot convert '{}' to boolean",
                s
            ))),
        },
        _ => Err(SettingsError::InvalidValue(format!(
            "Cannot convert {:?} to boolean",
            value
        ))),
    }
}

/// Parse an event id given as an integer or a decimal/hex string
fn parse_event_id(name: &str, value: &toml::Value) -> Result<u32, SettingsError> {
    let id = match value {
        toml::Value::Integer(i) => u32::try_from(*i).ok(),
        toml::Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    };
    id.ok_or_else(|| {
        SettingsError::InvalidValue(format!("Event '{}' has invalid id {}", name, value))
    })
}

/// Create default settings content for a new installation
pub fn default_settings_content() -> &'static str {
    r#"# Simbind Settings
# Place this file at: ~/.config/simbind/settings.toml

[dispatch]
# Treat held buttons (repeat edges) as additional presses
auto_repeat = false
# Output refresh / health check interval
poll_interval_ms = 50
# Time each output stays lit in test mode
test_mode_interval_ms = 500

[events]
# Simulator event names usable in EventIdAction
# GEAR_TOGGLE = 65570
"#
}
