//! Gated diagnostic logging.
//!
//! The gate is a [`LogConfig`] persisted under [`LOG_CONFIG_KEY`] and mirrored
//! by a cache-aside [`LogConfigCache`]. A [`Logger`] consults the cached config
//! on every call and forwards to `tracing`.

use crate::error::Result;
use crate::settings::SettingsStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Settings key holding the JSON-encoded [`LogConfig`].
pub const LOG_CONFIG_KEY: &str = "turnlog.logConfig";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Pipeline components that log through a [`Logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    InputExtractor,
    GemDetector,
    DomObserver,
    EventHandlers,
    Main,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::InputExtractor,
        Component::GemDetector,
        Component::DomObserver,
        Component::EventHandlers,
        Component::Main,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::InputExtractor => "InputExtractor",
            Component::GemDetector => "GemDetector",
            Component::DomObserver => "DomObserver",
            Component::EventHandlers => "EventHandlers",
            Component::Main => "Main",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFlags {
    pub debug: bool,
    pub info: bool,
    pub warn: bool,
    pub error: bool,
}

impl Default for LevelFlags {
    fn default() -> Self {
        Self {
            debug: true,
            info: true,
            warn: true,
            error: true,
        }
    }
}

impl LevelFlags {
    pub fn allows(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Debug => self.debug,
            LogLevel::Info => self.info,
            LogLevel::Warn => self.warn,
            LogLevel::Error => self.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    pub enabled: bool,
    pub levels: LevelFlags,
    /// Per-component switch; components missing here are allowed.
    pub components: BTreeMap<String, bool>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: LevelFlags::default(),
            components: Component::ALL
                .iter()
                .map(|c| (c.as_str().to_string(), true))
                .collect(),
        }
    }
}

impl LogConfig {
    pub fn allows(&self, component: Component, level: LogLevel) -> bool {
        self.enabled
            && self.levels.allows(level)
            && self
                .components
                .get(component.as_str())
                .copied()
                .unwrap_or(true)
    }

    /// Parse a stored config, deep-merging it over the defaults so missing
    /// nested keys keep their default values.
    pub fn from_stored(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let stored: Value = serde_json::from_str(json)?;
        let mut merged = serde_json::to_value(LogConfig::default())?;
        merge_json(&mut merged, stored);
        serde_json::from_value(merged)
    }
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Cache-aside mirror of the persisted [`LogConfig`].
pub struct LogConfigCache {
    store: Arc<dyn SettingsStore>,
    cached: Mutex<Option<LogConfig>>,
}

impl LogConfigCache {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    fn cached(&self) -> MutexGuard<'_, Option<LogConfig>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached config, or a fresh read when forced or nothing is cached.
    /// Read failures fall back to defaults and leave the cache empty.
    pub fn load(&self, force_refresh: bool) -> LogConfig {
        let mut cached = self.cached();
        if !force_refresh {
            if let Some(config) = cached.as_ref() {
                return config.clone();
            }
        }

        match self.read() {
            Ok(config) => {
                *cached = Some(config.clone());
                config
            }
            Err(e) => {
                *cached = None;
                warn!("Failed to load log config, using defaults: {}", e);
                LogConfig::default()
            }
        }
    }

    pub fn get(&self) -> LogConfig {
        self.load(false)
    }

    pub fn allows(&self, component: Component, level: LogLevel) -> bool {
        {
            if let Some(config) = self.cached().as_ref() {
                return config.allows(component, level);
            }
        }
        self.load(false).allows(component, level)
    }

    /// Drop the cached value; the next read reloads. Safe to call at any time.
    pub fn invalidate(&self) {
        *self.cached() = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached().is_some()
    }

    /// Persist `config`. The cache refreshes on the next read.
    pub fn save(&self, config: &LogConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        self.store.set(LOG_CONFIG_KEY, &json)?;
        self.invalidate();
        Ok(())
    }

    fn read(&self) -> Result<LogConfig> {
        match self.store.get(LOG_CONFIG_KEY)? {
            Some(json) => Ok(LogConfig::from_stored(&json)?),
            None => Ok(LogConfig::default()),
        }
    }
}

/// Component-scoped logger gated by the shared [`LogConfigCache`].
#[derive(Clone)]
pub struct Logger {
    component: Component,
    config: Arc<LogConfigCache>,
}

impl Logger {
    pub fn new(component: Component, config: Arc<LogConfigCache>) -> Self {
        Self { component, config }
    }

    /// Logger over an empty in-memory settings store, i.e. the default config.
    pub fn with_defaults(component: Component) -> Self {
        let store = Arc::new(crate::settings::MemorySettingsStore::new());
        Self::new(component, Arc::new(LogConfigCache::new(store)))
    }

    pub fn component(&self) -> Component {
        self.component
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.config.allows(self.component, level)
    }

    pub fn debug(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Debug) {
            tracing::debug!(component = %self.component, "{}", message);
        }
    }

    pub fn info(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Info) {
            tracing::info!(component = %self.component, "{}", message);
        }
    }

    pub fn warn(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Warn) {
            tracing::warn!(component = %self.component, "{}", message);
        }
    }

    pub fn error(&self, message: impl fmt::Display) {
        if self.enabled(LogLevel::Error) {
            tracing::error!(component = %self.component, "{}", message);
        }
    }
}

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `default_filter`.
/// Does nothing if a subscriber is already installed.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    fn cache_with(stored: Option<&str>) -> (Arc<MemorySettingsStore>, LogConfigCache) {
        let store = Arc::new(MemorySettingsStore::new());
        if let Some(json) = stored {
            store.set(LOG_CONFIG_KEY, json).unwrap();
        }
        let cache = LogConfigCache::new(store.clone());
        (store, cache)
    }

    #[test]
    fn test_partial_levels_merge_with_defaults() {
        let (_, cache) = cache_with(Some(r#"{"levels":{"debug":false}}"#));
        let config = cache.load(false);
        assert!(!config.levels.debug);
        assert!(config.levels.info);
        assert!(config.levels.warn);
        assert!(config.levels.error);
        assert!(config.enabled);
        assert_eq!(config.components, LogConfig::default().components);
    }

    #[test]
    fn test_component_override_keeps_other_components() {
        let config = LogConfig::from_stored(r#"{"components":{"DomObserver":false}}"#).unwrap();
        assert_eq!(config.components.get("DomObserver"), Some(&false));
        assert_eq!(config.components.get("EventHandlers"), Some(&true));
        assert!(!config.allows(Component::DomObserver, LogLevel::Error));
        assert!(config.allows(Component::EventHandlers, LogLevel::Debug));
    }

    #[test]
    fn test_invalidate_without_load_is_noop() {
        let (_, cache) = cache_with(None);
        cache.invalidate();
        assert!(!cache.is_cached());
        assert_eq!(cache.load(false), LogConfig::default());
        assert!(cache.is_cached());
    }

    #[test]
    fn test_malformed_config_falls_back_uncached() {
        let (_, cache) = cache_with(Some("{not json"));
        assert_eq!(cache.load(false), LogConfig::default());
        assert!(!cache.is_cached());

        let (_, cache) = cache_with(Some(r#"{"enabled":"yes"}"#));
        assert_eq!(cache.load(false), LogConfig::default());
        assert!(!cache.is_cached());
    }

    #[test]
    fn test_cache_serves_stale_until_invalidated() {
        let (store, cache) = cache_with(None);
        assert!(cache.get().enabled);

        store.set(LOG_CONFIG_KEY, r#"{"enabled":false}"#).unwrap();
        assert!(cache.get().enabled, "cached value served");
        assert!(!cache.load(true).enabled, "forced refresh rereads");

        store.set(LOG_CONFIG_KEY, r#"{"enabled":true}"#).unwrap();
        cache.invalidate();
        assert!(cache.get().enabled);
    }

    #[test]
    fn test_save_round_trips_through_store() {
        let (store, cache) = cache_with(None);
        let mut config = LogConfig::default();
        config.levels.info = false;
        cache.save(&config).unwrap();
        assert!(store.get(LOG_CONFIG_KEY).unwrap().is_some());
        assert_eq!(cache.get(), config);
    }

    #[test]
    fn test_disabled_logging_gates_every_level() {
        let config = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        for level in [
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert!(!config.allows(Component::Main, level));
        }
    }
}
