use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::ChatClient;
use crate::endpoint;
use crate::error::{ChatError, Result};
use crate::session::{SessionOptions, DEFAULT_CHAT_ID, FOLLOW_UP_DELAY};

pub const API_URL_ENV: &str = "CAMPUS_CHAT_API_URL";

const DEFAULT_PRESETS: [&str; 6] = [
    "What are the tuition fees?",
    "How do I apply for admission?",
    "What programs does NAU offer?",
    "How to reset my password?",
    "How do I select the courses?",
    "How do I access my NAU portal?",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Explicit API base URL; wins over `origin`
    pub api_url: Option<String>,
    /// Origin the client is served from, for endpoint resolution
    pub origin: Option<String>,
    pub chat_id: String,
    pub follow_up_delay_ms: u64,
    /// Near-bottom threshold for the terminal, in rows
    pub near_bottom_rows: u32,
    pub request_timeout_secs: u64,
    /// Questions offered on the welcome screen
    pub presets: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_url: None,
            origin: None,
            chat_id: DEFAULT_CHAT_ID.to_string(),
            follow_up_delay_ms: FOLLOW_UP_DELAY.as_millis() as u64,
            near_bottom_rows: 3,
            request_timeout_secs: 30,
            presets: DEFAULT_PRESETS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ChatError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ChatError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChatError::Config("could not determine config directory".into()))?;

        Ok(config_dir.join("campus-chat"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Environment overrides, with the lookup injected so tests need not touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = Some(url);
        }
    }

    pub fn api_url(&self) -> Result<String> {
        endpoint::resolve(self.api_url.as_deref(), self.origin.as_deref())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            chat_id: self.chat_id.clone(),
            follow_up_delay: Duration::from_millis(self.follow_up_delay_ms),
            near_bottom_threshold: self.near_bottom_rows,
        }
    }

    pub fn client(&self) -> Result<ChatClient> {
        ChatClient::with_timeout(
            &self.api_url()?,
            Duration::from_secs(self.request_timeout_secs.max(1)),
        )
    }
}
