// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use notion_anki_core::normalize_block_id;
use serde::Deserialize;

use crate::anki::templates::ModelTemplates;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::notion::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "notion-anki-sync.toml";
pub const TOKEN_ENV_VAR: &str = "NOTION_ANKI_SYNC_TOKEN";
/// One week.
pub const MAX_SYNC_EVERY_MINUTES: u64 = 7 * 24 * 60;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Notion workspace or user name, used in links back to pages.
    pub namespace: String,
    /// The `token_v2` cookie of a logged in Notion session.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub pages: Vec<PageSpec>,
    /// Minutes between syncs. Zero means sync once and exit.
    #[serde(default = "default_sync_every_minutes")]
    pub sync_every_minutes: u64,
    #[serde(default)]
    pub notion: NotionSettings,
    #[serde(default)]
    pub anki: AnkiSettings,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PageSpec {
    pub page_id: String,
    /// Export the page's subpages too.
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NotionSettings {
    pub enqueue_endpoint: String,
    pub get_tasks_endpoint: String,
    pub enqueue_max_attempts: u32,
    /// Large exports take minutes; raise this for workspaces with many pages.
    pub poll_max_attempts: u32,
    pub download_max_attempts: u32,
    pub retry_interval_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnkiSettings {
    /// AnkiConnect endpoint.
    pub endpoint: String,
    pub deck: String,
    /// Delete notes in the deck that no synced page produced.
    pub remove_obsolete: bool,
    pub templates: ModelTemplates,
}

fn default_sync_every_minutes() -> u64 {
    30
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            enqueue_endpoint: "https://www.notion.so/api/v3/enqueueTask".to_string(),
            get_tasks_endpoint: "https://www.notion.so/api/v3/getTasks".to_string(),
            enqueue_max_attempts: 600,
            poll_max_attempts: 600,
            download_max_attempts: 600,
            retry_interval_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for AnkiSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8765".to_string(),
            deck: "Notion Sync".to_string(),
            remove_obsolete: false,
            templates: ModelTemplates::default(),
        }
    }
}

impl NotionSettings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn enqueue_policy(&self) -> RetryPolicy {
        self.policy(self.enqueue_max_attempts)
    }

    pub fn poll_policy(&self) -> RetryPolicy {
        self.policy(self.poll_max_attempts)
    }

    pub fn download_policy(&self) -> RetryPolicy {
        self.policy(self.download_max_attempts)
    }

    fn policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: self.retry_interval(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Fallible<Self> {
        let text = read_to_string(path).map_err(|e| {
            ErrorReport::new(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config = Self::parse(&text)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Fallible<Self> {
        let mut config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config and normalize page ids.
    fn validate(&mut self) -> Fallible<()> {
        if self.namespace.trim().is_empty() {
            return fail("Config: namespace must not be empty.");
        }
        if self.pages.is_empty() {
            return fail("Config: at least one page is required.");
        }
        for page in self.pages.iter_mut() {
            page.page_id = normalize_block_id(&page.page_id).map_err(|e| {
                ErrorReport::new(format!("Config: invalid page id '{}': {e}", page.page_id))
            })?;
        }
        if self.notion.poll_max_attempts == 0
            || self.notion.enqueue_max_attempts == 0
            || self.notion.download_max_attempts == 0
        {
            return fail("Config: retry attempts must be at least 1.");
        }
        if self.sync_every_minutes > MAX_SYNC_EVERY_MINUTES {
            return fail(format!(
                "Config: sync_every_minutes must be at most {MAX_SYNC_EVERY_MINUTES}."
            ));
        }
        Ok(())
    }

    /// The Notion token, preferring one given on the command line or in the
    /// environment.
    pub fn token(&self, flag: Option<String>) -> Fallible<String> {
        require_token(flag.or_else(|| self.token.clone()))
    }

    /// Seconds between syncs, or `None` to sync once.
    pub fn sync_interval(&self) -> Option<Duration> {
        match self.sync_every_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes * 60)),
        }
    }
}

/// Fail unless a non-blank token was given.
pub fn require_token(token: Option<String>) -> Fallible<String> {
    match token {
        Some(token) if !token.trim().is_empty() => Ok(token),
        _ => fail(format!(
            "No Notion token. Set it in the config file, pass --token, or set {TOKEN_ENV_VAR}."
        )),
    }
}
