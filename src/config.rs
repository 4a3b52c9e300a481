// src/config.rs

use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    flow::storage::{CURRENT_FLOW_KEY, FLOWS_STORAGE_KEY},
    logger::LogConfig,
};

/// A flat source of string settings.
pub trait ConfigManagerType: Send + Sync {
    fn keys(&self) -> Vec<String>;
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn del(&self, key: &str);

    fn as_vec(&self) -> Vec<(String, String)> {
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(&key).map(|value| (key, value)))
            .collect()
    }

    /// Short label for logs.
    fn debug_box(&self) -> String;
}

/// Process environment, seeded from a `.env` file when one exists.
///
/// `set`/`del` also rewrite the file so the change survives a restart.
#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: PathBuf,
}

impl EnvConfigManager {
    pub fn new(env_file: PathBuf) -> Box<Self> {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => info!("Loaded .env from {}", env_file.display()),
                Err(e) => warn!("could not parse {}: {}", env_file.display(), e),
            }
        }
        Box::new(Self { env_file })
    }

    fn rewrite_env_file(&self, key: &str, value: Option<&str>) -> Result<()> {
        let content = fs::read_to_string(&self.env_file).unwrap_or_default();
        let mut lines: Vec<String> = content
            .lines()
            .filter(|line| line.split_once('=').is_none_or(|(k, _)| k.trim() != key))
            .map(str::to_string)
            .collect();
        if let Some(value) = value {
            lines.push(format!("{key}={value}"));
        }
        fs::write(&self.env_file, lines.join("\n"))
            .with_context(|| format!("writing {}", self.env_file.display()))
    }
}

impl ConfigManagerType for EnvConfigManager {
    fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        unsafe {
            env::set_var(key, value);
        };
        self.rewrite_env_file(key, Some(value))
    }

    fn del(&self, key: &str) {
        unsafe {
            env::remove_var(key);
        };
        if self.env_file.exists() {
            if let Err(e) = self.rewrite_env_file(key, None) {
                warn!("could not remove {} from .env: {}", key, e);
            }
        }
    }

    fn debug_box(&self) -> String {
        "EnvConfigManager".to_string()
    }
}

/// In-memory settings, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapConfigManager {
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::new(Self::default())
    }
}

impl ConfigManagerType for MapConfigManager {
    fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn del(&self, key: &str) {
        self.map.remove(key);
    }

    fn debug_box(&self) -> String {
        format!("MapConfigManager({} entries)", self.map.len())
    }
}

pub const ENV_STORAGE_DIR: &str = "FLOWSMITH_STORAGE_DIR";
pub const ENV_FLOWS_KEY: &str = "FLOWSMITH_FLOWS_KEY";
pub const ENV_CURRENT_FLOW_KEY: &str = "FLOWSMITH_CURRENT_FLOW_KEY";
pub const ENV_DEFAULT_FLOW_NAME: &str = "FLOWSMITH_DEFAULT_FLOW_NAME";
pub const ENV_DEFAULT_NODE_TEXT: &str = "FLOWSMITH_DEFAULT_NODE_TEXT";
pub const ENV_NODE_ID_PREFIX: &str = "FLOWSMITH_NODE_ID_PREFIX";
pub const ENV_QUOTA_BYTES: &str = "FLOWSMITH_QUOTA_BYTES";
pub const ENV_LOG_LEVEL: &str = "FLOWSMITH_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "FLOWSMITH_LOG_DIR";
pub const ENV_LOG_JSON: &str = "FLOWSMITH_LOG_JSON";

/// Everything the editor needs to know about its environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    /// Directory for file-backed storage; in-memory storage when `None`.
    pub storage_dir: Option<PathBuf>,
    pub flows_key: String,
    pub current_flow_key: String,
    pub default_flow_name: String,
    pub default_node_text: String,
    pub node_id_prefix: String,
    /// Byte limit for in-memory storage.
    pub quota_bytes: Option<usize>,
    pub log: LogConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            flows_key: FLOWS_STORAGE_KEY.to_string(),
            current_flow_key: CURRENT_FLOW_KEY.to_string(),
            default_flow_name: "Untitled Flow".to_string(),
            default_node_text: "Text Message".to_string(),
            node_id_prefix: "node_".to_string(),
            quota_bytes: None,
            log: LogConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Defaults overridden by whatever `FLOWSMITH_*` keys `source` has.
    pub fn from_manager(source: &dyn ConfigManagerType) -> Result<Self> {
        info!(source = %source.debug_box(), "loading editor config");
        let mut config = Self::default();
        let text = |key: &str| source.get(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = text(ENV_STORAGE_DIR) {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(key) = text(ENV_FLOWS_KEY) {
            config.flows_key = key;
        }
        if let Some(key) = text(ENV_CURRENT_FLOW_KEY) {
            config.current_flow_key = key;
        }
        if let Some(name) = text(ENV_DEFAULT_FLOW_NAME) {
            config.default_flow_name = name;
        }
        if let Some(node_text) = text(ENV_DEFAULT_NODE_TEXT) {
            config.default_node_text = node_text;
        }
        if let Some(prefix) = text(ENV_NODE_ID_PREFIX) {
            config.node_id_prefix = prefix;
        }
        if let Some(quota) = text(ENV_QUOTA_BYTES) {
            let bytes = quota
                .trim()
                .parse::<usize>()
                .with_context(|| format!("{ENV_QUOTA_BYTES} must be a byte count, got `{quota}`"))?;
            config.quota_bytes = Some(bytes);
        }
        if let Some(level) = text(ENV_LOG_LEVEL) {
            config.log.log_level = level;
        }
        if let Some(dir) = text(ENV_LOG_DIR) {
            config.log.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(json) = text(ENV_LOG_JSON) {
            let flag = json.trim().to_ascii_lowercase();
            config.log.json = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        Ok(config)
    }
}
