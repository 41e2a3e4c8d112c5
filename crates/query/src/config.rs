//! Engine configuration.
//!
//! [`EngineConfig`] holds every tunable option with its default.
//! [`ConfigStore`] publishes validated, immutable [`Snapshot`]s behind an
//! atomic pointer: request handling reads a snapshot without locking, and
//! an update builds and validates a whole new snapshot before swapping it in.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::operators::OperatorRegistry;
use crate::types::{Boolean, SortDirection};

/// Search defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Shortest accepted term, in characters.
    pub min_term_length: usize,
    /// Terms beyond this count are dropped.
    pub max_terms: usize,
    /// Stop-words, matched case-insensitively.
    pub blacklist: Vec<String>,
    /// How terms combine.
    pub mode: Boolean,
    /// Match with plain LIKE instead of case-insensitive matching.
    pub case_sensitive: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_term_length: 2,
            max_terms: 10,
            blacklist: Vec::new(),
            mode: Boolean::And,
            case_sensitive: false,
        }
    }
}

/// Sort defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortSettings {
    /// Direction for keys without an indicator.
    pub default_direction: SortDirection,
    /// Single-character prefix or suffix markers and the direction they mean.
    pub direction_indicators: BTreeMap<String, SortDirection>,
    /// Allow any identifier when neither the call nor the model restricts
    /// sorting. On by default; turn it off to require a sortable list.
    pub allow_any_column: bool,
}

impl Default for SortSettings {
    fn default() -> Self {
        let mut direction_indicators = BTreeMap::new();
        direction_indicators.insert("+".to_string(), SortDirection::Ascending);
        direction_indicators.insert("-".to_string(), SortDirection::Descending);
        Self {
            default_direction: SortDirection::Ascending,
            direction_indicators,
            allow_any_column: true,
        }
    }
}

/// Pagination defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    /// Page size when the request names none.
    pub per_page: u64,
    /// Upper clamp for requested page sizes.
    pub max_per_page: u64,
    /// Request parameter carrying the page number.
    pub page_name: String,
    /// Request parameter carrying the page size.
    pub per_page_name: String,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            per_page: 15,
            max_per_page: 100,
            page_name: "page".to_string(),
            per_page_name: "per_page".to_string(),
        }
    }
}

/// Relative-date settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateSettings {
    /// IANA timezone "today" is computed in.
    pub timezone: String,
    /// `strftime` format of bound range endpoints.
    pub format: String,
}

impl Default for DateSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

/// Operand handling choices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperandSettings {
    /// Remove duplicate values from `in`/`not_in` lists.
    pub dedupe_in: bool,
    /// Reject non-numeric `between` bounds.
    pub strict_between: bool,
}

/// All engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Operator key to store operator overrides, merged over the built-ins.
    pub operators: BTreeMap<String, String>,
    /// Fields filterable on models that declare no list of their own.
    pub global_whitelist: Vec<String>,
    /// Maximum top-level filter entries per call.
    pub max_filters: usize,
    /// Maximum combined group and relation depth.
    pub max_nesting_level: usize,
    /// Search settings.
    pub search: SearchSettings,
    /// Sort settings.
    pub sort: SortSettings,
    /// Pagination settings.
    pub pagination: PaginationSettings,
    /// Operator key to custom filter handler name.
    pub custom_filters: BTreeMap<String, String>,
    /// Named filter specifications.
    pub presets: BTreeMap<String, Value>,
    /// Relative-date settings.
    pub dates: DateSettings,
    /// Operand handling.
    pub operands: OperandSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operators: BTreeMap::new(),
            global_whitelist: Vec::new(),
            max_filters: 50,
            max_nesting_level: 3,
            search: SearchSettings::default(),
            sort: SortSettings::default(),
            pagination: PaginationSettings::default(),
            custom_filters: BTreeMap::new(),
            presets: BTreeMap::new(),
            dates: DateSettings::default(),
            operands: OperandSettings::default(),
        }
    }
}

/// Options whose value is an open map; `set` may add keys under them.
const OPEN_MAPS: &[&str] = &[
    "operators",
    "custom_filters",
    "presets",
    "sort.direction_indicators",
];

impl EngineConfig {
    /// Parses configuration from JSON. Missing options take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_filters == 0 {
            errors.push("max_filters cannot be 0".to_string());
        }

        if self.max_nesting_level == 0 {
            errors.push("max_nesting_level cannot be 0".to_string());
        }

        if self.search.min_term_length == 0 {
            errors.push("search.min_term_length cannot be 0".to_string());
        }

        if self.search.max_terms == 0 {
            errors.push("search.max_terms cannot be 0".to_string());
        }

        if self.pagination.per_page == 0 {
            errors.push("pagination.per_page cannot be 0".to_string());
        }

        if self.pagination.per_page > self.pagination.max_per_page {
            errors.push("pagination.per_page cannot exceed pagination.max_per_page".to_string());
        }

        if self.pagination.page_name.is_empty() || self.pagination.per_page_name.is_empty() {
            errors.push("pagination parameter names cannot be empty".to_string());
        }

        for indicator in self.sort.direction_indicators.keys() {
            let mut chars = indicator.chars();
            let single = chars
                .next()
                .is_some_and(|c| !c.is_alphanumeric() && !matches!(c, '_' | '.' | ','))
                && chars.next().is_none();
            if !single {
                errors.push(format!(
                    "sort.direction_indicators key '{}' must be one punctuation character other than '_', '.' or ','",
                    indicator
                ));
            }
        }

        if self.dates.timezone.parse::<Tz>().is_err() {
            errors.push(format!("unknown timezone '{}'", self.dates.timezone));
        }

        if self.dates.format.is_empty()
            || StrftimeItems::new(&self.dates.format).any(|item| matches!(item, Item::Error))
        {
            errors.push(format!("invalid date format '{}'", self.dates.format));
        }

        if let Err(e) = OperatorRegistry::with_overrides(&self.operators) {
            errors.push(e.to_string());
        }

        for (key, preset) in &self.presets {
            if !preset.is_object() && !preset.is_array() {
                errors.push(format!("preset '{}' must be a map or list of filters", key));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    ///
    /// Relaxes the sort allow-list so fixtures need not declare one.
    pub fn for_testing() -> Self {
        Self {
            sort: SortSettings {
                allow_any_column: true,
                ..SortSettings::default()
            },
            ..Self::default()
        }
    }

    /// Reads an option by dotted key, e.g. `search.max_terms`.
    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        let root = serde_json::to_value(self)?;
        let mut current = &root;
        for segment in key.split('.') {
            current = current
                .get(segment)
                .ok_or_else(|| ConfigError::UnknownConfigKey {
                    key: key.to_string(),
                })?;
        }
        Ok(current.clone())
    }

    /// Returns a copy with the option at `key` replaced.
    ///
    /// Keys must name an existing option, or a new entry under one of the
    /// open maps (`operators`, `custom_filters`, `presets`,
    /// `sort.direction_indicators`).
    pub fn with_value(&self, key: &str, value: Value) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownConfigKey {
            key: key.to_string(),
        };

        let (parent_path, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut root = serde_json::to_value(self)?;
        let mut parent = &mut root;
        if let Some(path) = parent_path {
            for segment in path.split('.') {
                parent = parent.get_mut(segment).ok_or_else(unknown)?;
            }
        }

        let map = parent.as_object_mut().ok_or_else(unknown)?;
        let open = parent_path.is_some_and(|p| OPEN_MAPS.contains(&p));
        if !open && !map.contains_key(leaf) {
            return Err(unknown());
        }
        map.insert(leaf.to_string(), value);

        serde_json::from_value(root).map_err(|e| ConfigError::InvalidConfigValue {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// A validated configuration with its derived state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    config: EngineConfig,
    operators: OperatorRegistry,
    timezone: Tz,
    indicators: Vec<(char, SortDirection)>,
}

impl Snapshot {
    /// Validates `config` and derives the operator table and timezone.
    pub fn build(config: EngineConfig) -> Result<Self, ConfigError> {
        let operators = OperatorRegistry::with_overrides(&config.operators)?;
        let timezone = config
            .dates
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimezone {
                timezone: config.dates.timezone.clone(),
            })?;
        config
            .validate()
            .map_err(|problems| ConfigError::Invalid { problems })?;

        let indicators = config
            .sort
            .direction_indicators
            .iter()
            .filter_map(|(k, d)| k.chars().next().map(|c| (c, *d)))
            .collect();

        Ok(Self {
            config,
            operators,
            timezone,
            indicators,
        })
    }

    /// The configuration this snapshot was built from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The merged operator table.
    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    /// The timezone relative dates are computed in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Direction indicator characters.
    pub fn indicators(&self) -> &[(char, SortDirection)] {
        &self.indicators
    }

    /// Direction meant by `c`, if it is an indicator.
    pub fn indicator(&self, c: char) -> Option<SortDirection> {
        self.indicators
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, d)| *d)
    }
}

/// Holds the published configuration snapshot.
///
/// Readers load the snapshot without locking. Writers are serialised so
/// that each update starts from the previous writer's result.
pub struct ConfigStore {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
}

impl ConfigStore {
    /// Creates a store publishing `config`.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let snapshot = Snapshot::build(config)?;
        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
        })
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Reads an option by dotted key.
    pub fn get(&self, key: &str) -> Result<Value, ConfigError> {
        self.current.load().config().get(key)
    }

    /// Sets an option by dotted key and publishes the result.
    pub fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let _writer = self.writer.lock();
        let next = self.current.load().config().with_value(key, value);
        match next {
            Ok(config) => self.publish(config, Some(key)),
            Err(e) => {
                warn!(key = %key, error = %e, "Rejected configuration update");
                Err(e)
            }
        }
    }

    /// Validates and publishes a whole new configuration.
    pub fn replace(&self, config: EngineConfig) -> Result<(), ConfigError> {
        let _writer = self.writer.lock();
        self.publish(config, None)
    }

    /// Applies `f` to a copy of the current configuration and publishes it.
    pub fn update<F>(&self, f: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut EngineConfig),
    {
        let _writer = self.writer.lock();
        let mut config = self.current.load().config().clone();
        f(&mut config);
        self.publish(config, None)
    }

    fn publish(&self, config: EngineConfig, key: Option<&str>) -> Result<(), ConfigError> {
        match Snapshot::build(config) {
            Ok(snapshot) => {
                self.current.store(Arc::new(snapshot));
                info!(key = ?key, "Published configuration snapshot");
                Ok(())
            }
            Err(e) => {
                warn!(key = ?key, error = %e, "Rejected configuration update");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("current", &self.current.load().config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_filters, 50);
        assert_eq!(config.max_nesting_level, 3);
        assert_eq!(config.pagination.per_page, 15);
        assert_eq!(config.search.mode, Boolean::And);
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut config = EngineConfig::default();
        config.max_filters = 0;
        config.pagination.per_page = 500;
        config.dates.timezone = "Mars/Olympus".to_string();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            EngineConfig::from_json(r#"{"max_filters": 5, "search": {"max_terms": 3}}"#).unwrap();
        assert_eq!(config.max_filters, 5);
        assert_eq!(config.search.max_terms, 3);
        assert_eq!(config.search.min_term_length, 2);
    }

    #[test]
    fn test_get_dotted() {
        let config = EngineConfig::default();
        assert_eq!(config.get("search.max_terms").unwrap(), json!(10));
        assert_eq!(config.get("sort.direction_indicators.-").unwrap(), json!("desc"));
        assert!(matches!(
            config.get("search.nope"),
            Err(ConfigError::UnknownConfigKey { .. })
        ));
    }

    #[test]
    fn test_with_value() {
        let config = EngineConfig::default()
            .with_value("search.min_term_length", json!(4))
            .unwrap();
        assert_eq!(config.search.min_term_length, 4);

        let config = config.with_value("operators.is", json!("=")).unwrap();
        assert_eq!(config.operators.get("is").map(String::as_str), Some("="));
    }

    #[test]
    fn test_with_value_rejects_unknown_and_mistyped() {
        let config = EngineConfig::default();
        assert!(matches!(
            config.with_value("search.colour", json!(1)),
            Err(ConfigError::UnknownConfigKey { .. })
        ));
        assert!(matches!(
            config.with_value("max_filters", json!("lots")),
            Err(ConfigError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_date_format() {
        let mut config = EngineConfig::default();
        config.dates.format = "%Y-%!".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_snapshot_rejects_unknown_timezone() {
        let mut config = EngineConfig::default();
        config.dates.timezone = "Nowhere/Special".to_string();
        assert!(matches!(
            Snapshot::build(config),
            Err(ConfigError::UnknownTimezone { .. })
        ));
    }

    #[test]
    fn test_snapshot_indicators() {
        let snapshot = Snapshot::build(EngineConfig::default()).unwrap();
        assert_eq!(snapshot.indicator('-'), Some(SortDirection::Descending));
        assert_eq!(snapshot.indicator('+'), Some(SortDirection::Ascending));
        assert_eq!(snapshot.indicator('*'), None);
    }

    #[test]
    fn test_store_set_publishes_new_snapshot() {
        let store = ConfigStore::new(EngineConfig::default()).unwrap();
        let before = store.snapshot();
        store.set("max_filters", json!(7)).unwrap();
        assert_eq!(store.snapshot().config().max_filters, 7);
        // Previously loaded snapshots are unaffected.
        assert_eq!(before.config().max_filters, 50);
    }

    #[test]
    fn test_store_rejects_invalid_update() {
        let store = ConfigStore::new(EngineConfig::default()).unwrap();
        let err = store.set("operators.evil", json!("; DROP")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStoreOperator { .. }));
        assert!(!store.snapshot().operators().exists("evil"));
    }

    #[test]
    fn test_store_update_closure() {
        let store = ConfigStore::new(EngineConfig::default()).unwrap();
        store
            .update(|c| c.global_whitelist = vec!["status".to_string()])
            .unwrap();
        assert_eq!(store.get("global_whitelist").unwrap(), json!(["status"]));
    }

    #[test]
    fn test_store_concurrent_writers_keep_every_update() {
        let store = Arc::new(ConfigStore::new(EngineConfig::default()).unwrap());
        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .set(&format!("presets.p{}", n), json!({"stock": n}))
                        .unwrap();
                    store.update(|c| c.max_filters += 1).unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.config().presets.len(), 8);
        assert_eq!(snapshot.config().max_filters, 58);
    }
}
