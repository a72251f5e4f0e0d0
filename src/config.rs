//! User configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::error::Result;
use crate::extract::{Extractor, DEFAULT_AGENT_NAME};
use crate::kanban_board::BoardRules;

const APP_DIR: &str = "taskdash";

pub const ENV_API_URL: &str = "TASKDASH_API_URL";
pub const ENV_CRM_API_KEY: &str = "TASKDASH_CRM_API_KEY";
pub const ENV_CRM_LOCATION_ID: &str = "TASKDASH_CRM_LOCATION_ID";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TASKDASH_TELEGRAM_BOT_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub board: BoardConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub crm: CrmConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory of the key-value slots. Defaults to `<data dir>/taskdash/store`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of a running server, e.g. `http://127.0.0.1:8787/api`.
    /// Without it the CLI and board use the store directory directly.
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_true")]
    pub allow_reopen: bool,

    #[serde(default = "default_true")]
    pub confirm_agent_tasks: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            allow_reopen: true,
            confirm_agent_tasks: true,
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    #[serde(default)]
    pub owner_name: Option<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            owner_name: None,
        }
    }
}

fn default_agent_name() -> String {
    DEFAULT_AGENT_NAME.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,

    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,

    #[serde(default = "default_location")]
    pub location: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            location: default_location(),
        }
    }
}

fn default_weather_url() -> String {
    "https://api.open-meteo.com".to_string()
}

fn default_latitude() -> f64 {
    33.7205
}

fn default_longitude() -> f64 {
    -116.2156
}

fn default_location() -> String {
    "Indio, CA".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default = "default_crm_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub location_id: Option<String>,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_crm_url(),
            api_key: None,
            location_id: None,
        }
    }
}

fn default_crm_url() -> String {
    "https://services.leadconnectorhq.com".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailConfig {
    /// JSON feed answering `{unreadCount, emails}`.
    #[serde(default)]
    pub feed_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_url")]
    pub api_base: String,

    #[serde(default)]
    pub bot_token: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_url(),
            bot_token: None,
        }
    }
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}

pub fn get_app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    get_app_dir().join("config.toml")
}

impl Config {
    /// Reads the file if present, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Secrets come from the environment so they stay out of the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_API_URL) {
            self.api.base_url = Some(url);
        }
        if let Some(key) = lookup(ENV_CRM_API_KEY) {
            self.crm.api_key = Some(key);
        }
        if let Some(id) = lookup(ENV_CRM_LOCATION_ID) {
            self.crm.location_id = Some(id);
        }
        if let Some(token) = lookup(ENV_TELEGRAM_BOT_TOKEN) {
            self.telegram.bot_token = Some(token);
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store
            .dir
            .clone()
            .unwrap_or_else(|| get_data_dir().join("store"))
    }

    pub fn mirror_path(&self) -> PathBuf {
        get_data_dir().join("tasks.json")
    }

    pub fn board_rules(&self) -> BoardRules {
        BoardRules {
            allow_reopen: self.board.allow_reopen,
            confirm_agent_tasks: self.board.confirm_agent_tasks,
        }
    }

    pub fn extractor(&self) -> Extractor {
        Extractor::new(&self.extractor.agent_name, self.extractor.owner_name.as_deref())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.board.poll_interval_secs.max(1))
    }
}
