//! Configuration management for `tasksync`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`TASKSYNC_*`)
//! 3. Config file (`--config`, default `./tasksync.yaml`)
//! 4. User config (`~/.config/tasksync/config.yaml`)
//! 5. Defaults
//!
//! Layers are flat key/value maps. Nested YAML flattens with dots and
//! sequences flatten to comma-separated lists, so `sync: {labels: [a, b]}`
//! and `TASKSYNC_SYNC_LABELS=a,b` set the same key.

use crate::error::{Result, SyncError};
use crate::model::Priority;
use crate::policy::{DEFAULT_CONTAINER, DatePrecedence, Tool};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Config file read from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILENAME: &str = "tasksync.yaml";

const ENV_PREFIX: &str = "TASKSYNC_";

/// One flat configuration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Set a key; keys are stored in canonical form.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(canonical_key(key), value.into());
    }

    /// Look up a key in any spelling (`sync.max-priority`, `sync_max_priority`).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&canonical_key(key)).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from `TASKSYNC_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Build a layer from `(name, value)` pairs, keeping `TASKSYNC_*` names.
    #[must_use]
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layer.set(stripped, value);
            }
        }
        layer
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub state_dir: Option<PathBuf>,
    pub interval_minutes: Option<u64>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.state_dir {
            layer.set("state-dir", path.to_string_lossy());
        }
        if let Some(minutes) = self.interval_minutes {
            layer.set("interval-minutes", minutes.to_string());
        }

        layer
    }
}

/// Priority/label sync settings (`sync.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub priority_tasks: bool,
    pub max_priority: Priority,
    pub labels: Vec<String>,
    pub target_list: String,
    pub due_within_days: i64,
    pub date_precedence: DatePrecedence,
    pub completion_guard_days: i64,
    pub backward_completion: bool,
    pub origin_name: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            priority_tasks: true,
            max_priority: Priority::P3,
            labels: vec![
                "urgent".to_string(),
                "important".to_string(),
                "sync".to_string(),
            ],
            target_list: DEFAULT_CONTAINER.to_string(),
            due_within_days: 1,
            date_precedence: DatePrecedence::Due,
            completion_guard_days: 1,
            backward_completion: true,
            origin_name: "Todoist".to_string(),
        }
    }
}

/// Project mirror settings (`mirror.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSettings {
    pub excluded_projects: Vec<String>,
    pub inbox_list_name: String,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            excluded_projects: Vec::new(),
            inbox_list_name: "Todoist Inbox".to_string(),
        }
    }
}

/// Starred consolidation settings (`starred.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarredSettings {
    pub list_name: String,
    /// Empty scans every list except `list_name`.
    pub source_lists: Vec<String>,
    pub markers: Vec<String>,
}

impl Default for StarredSettings {
    fn default() -> Self {
        Self {
            list_name: "TRMNL".to_string(),
            source_lists: Vec::new(),
            markers: vec!["⭐".to_string(), "*".to_string()],
        }
    }
}

/// Recurrence settings (`recur.*`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurSettings {
    /// Empty scans every list.
    pub target_lists: Vec<String>,
}

/// Upper bound for minute-valued settings: one week.
const MAX_MINUTES: u64 = 7 * 24 * 60;
/// Upper bound for `sync.completion-guard-days`: ten years.
const MAX_GUARD_DAYS: i64 = 3650;

/// Typed, validated settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub source_path: Option<PathBuf>,
    pub target_path: Option<PathBuf>,
    pub interval_minutes: u64,
    pub lock_stale_minutes: i64,
    pub sync: SyncSettings,
    pub mirror: MirrorSettings,
    pub starred: StarredSettings,
    pub recur: RecurSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".tasksync"),
            source_path: None,
            target_path: None,
            interval_minutes: 15,
            lock_stale_minutes: 360,
            sync: SyncSettings::default(),
            mirror: MirrorSettings::default(),
            starred: StarredSettings::default(),
            recur: RecurSettings::default(),
        }
    }
}

impl Settings {
    /// Build settings from a merged layer. Unset keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSetting` for any value that does not parse or is out of range.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(dir) = non_empty(layer, "state-dir") {
            settings.state_dir = PathBuf::from(dir);
        }
        settings.source_path = non_empty(layer, "source.path").map(PathBuf::from);
        settings.target_path = non_empty(layer, "target.path").map(PathBuf::from);
        if let Some(minutes) = parse_number::<u64>(layer, "interval-minutes")? {
            if minutes == 0 {
                return Err(SyncError::invalid_setting("interval-minutes", "must be at least 1"));
            }
            if minutes > MAX_MINUTES {
                return Err(SyncError::invalid_setting(
                    "interval-minutes",
                    format!("must be at most {MAX_MINUTES}"),
                ));
            }
            settings.interval_minutes = minutes;
        }
        if let Some(minutes) = parse_number::<i64>(layer, "lock-stale-minutes")? {
            if minutes <= 0 {
                return Err(SyncError::invalid_setting("lock-stale-minutes", "must be positive"));
            }
            if minutes.unsigned_abs() > MAX_MINUTES {
                return Err(SyncError::invalid_setting(
                    "lock-stale-minutes",
                    format!("must be at most {MAX_MINUTES}"),
                ));
            }
            settings.lock_stale_minutes = minutes;
        }

        let sync = &mut settings.sync;
        if let Some(flag) = parse_flag(layer, "sync.priority-tasks")? {
            sync.priority_tasks = flag;
        }
        if let Some(value) = non_empty(layer, "sync.max-priority") {
            sync.max_priority = Priority::from_str(value)
                .map_err(|err| SyncError::invalid_setting("sync.max-priority", err.to_string()))?;
        }
        if let Some(labels) = layer.get("sync.labels") {
            sync.labels = split_list(labels);
        }
        if let Some(name) = non_empty(layer, "sync.target-list") {
            sync.target_list = name.to_string();
        }
        if let Some(days) = parse_number::<i64>(layer, "sync.due-within-days")? {
            if days < 0 {
                return Err(SyncError::invalid_setting("sync.due-within-days", "must not be negative"));
            }
            sync.due_within_days = days;
        }
        if let Some(value) = non_empty(layer, "sync.date-precedence") {
            sync.date_precedence = parse_precedence(value)?;
        }
        if let Some(days) = parse_number::<i64>(layer, "sync.completion-guard-days")? {
            if days < 0 {
                return Err(SyncError::invalid_setting(
                    "sync.completion-guard-days",
                    "must not be negative",
                ));
            }
            if days > MAX_GUARD_DAYS {
                return Err(SyncError::invalid_setting(
                    "sync.completion-guard-days",
                    format!("must be at most {MAX_GUARD_DAYS}"),
                ));
            }
            sync.completion_guard_days = days;
        }
        if let Some(flag) = parse_flag(layer, "sync.backward-completion")? {
            sync.backward_completion = flag;
        }
        if let Some(name) = non_empty(layer, "sync.origin-name") {
            sync.origin_name = name.to_string();
        }

        if let Some(projects) = layer.get("mirror.excluded-projects") {
            settings.mirror.excluded_projects = split_list(projects);
        }
        if let Some(name) = non_empty(layer, "mirror.inbox-list-name") {
            settings.mirror.inbox_list_name = name.to_string();
        }

        if let Some(name) = non_empty(layer, "starred.list-name") {
            settings.starred.list_name = name.to_string();
        }
        if let Some(lists) = layer.get("starred.source-lists") {
            settings.starred.source_lists = split_list(lists);
        }
        if let Some(markers) = layer.get("starred.markers") {
            let markers = split_list(markers);
            if markers.is_empty() {
                return Err(SyncError::invalid_setting("starred.markers", "at least one marker is required"));
            }
            settings.starred.markers = markers;
        }

        if let Some(lists) = layer.get("recur.target-lists") {
            settings.recur.target_lists = split_list(lists);
        }

        Ok(settings)
    }

    /// Check the settings `tool` needs before any pass runs.
    ///
    /// # Errors
    ///
    /// Returns `MissingSetting` when a required service path is unset.
    pub fn require_for(&self, tool: Tool) -> Result<()> {
        if tool.uses_separate_source() && self.source_path.is_none() {
            return Err(SyncError::MissingSetting {
                key: "source.path".to_string(),
            });
        }
        if self.target_path.is_none() {
            return Err(SyncError::MissingSetting {
                key: "target.path".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the mapping store for `tool`.
    #[must_use]
    pub fn store_path(&self, tool: Tool) -> PathBuf {
        crate::store::store_path(&self.state_dir, tool.as_str())
    }
}

/// Load user config (~/.config/tasksync/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("tasksync")
        .join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Load every layer and build validated settings.
///
/// # Errors
///
/// Returns a configuration error for malformed files or invalid values.
pub fn load_settings(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Settings> {
    let file = config_path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME), Path::to_path_buf);
    let layer = ConfigLayer::merge_layers(&[
        load_user_config()?,
        ConfigLayer::from_yaml(&file)?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]);
    Settings::from_layer(&layer)
}

/// Canonical key: lowercase with `.`, `-`, and `_` folded to `.`.
fn canonical_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == '_' { '.' } else { c })
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn parse_flag(layer: &ConfigLayer, key: &str) -> Result<Option<bool>> {
    layer
        .get(key)
        .map(|value| {
            parse_bool(value).ok_or_else(|| {
                SyncError::invalid_setting(key, format!("expected a boolean, got '{value}'"))
            })
        })
        .transpose()
}

fn parse_number<T: FromStr>(layer: &ConfigLayer, key: &str) -> Result<Option<T>> {
    layer
        .get(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| {
                SyncError::invalid_setting(key, format!("expected a whole number, got '{value}'"))
            })
        })
        .transpose()
}

fn parse_precedence(value: &str) -> Result<DatePrecedence> {
    match value.trim().to_lowercase().as_str() {
        "due" => Ok(DatePrecedence::Due),
        "deadline" => Ok(DatePrecedence::Deadline),
        other => Err(SyncError::invalid_setting(
            "sync.date-precedence",
            format!("expected 'due' or 'deadline', got '{other}'"),
        )),
    }
}

fn non_empty<'a>(layer: &'a ConfigLayer, key: &str) -> Option<&'a str> {
    layer.get(key).map(str::trim).filter(|value| !value.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        layer.set(&key, value);
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}
