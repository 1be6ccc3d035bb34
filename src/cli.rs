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

use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use notion_anki_core::BlockId;
use notion_anki_core::extract_document;

use crate::config::Config;
use crate::config::DEFAULT_CONFIG_PATH;
use crate::config::NotionSettings;
use crate::config::TOKEN_ENV_VAR;
use crate::config::require_token;
use crate::error::Fallible;
use crate::notion::export::ExportPoller;
use crate::sync::Syncer;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Sync the configured Notion pages into Anki.
    Sync {
        /// Path to the configuration file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// The Notion `token_v2` cookie. Overrides the configuration file.
        #[arg(long, env = TOKEN_ENV_VAR, hide_env_values = true)]
        token: Option<String>,
        /// Sync once and exit, even if a sync interval is configured.
        #[arg(long)]
        once: bool,
        /// Delete notes in the deck that no longer exist in Notion.
        #[arg(long)]
        remove_obsolete: bool,
    },
    /// Export a Notion page and download the archive.
    Export {
        /// The page id, with or without dashes, or the page's URL slug.
        page_id: String,
        /// Path to the configuration file. Used for the token and Notion
        /// settings if it exists.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// The Notion `token_v2` cookie. Overrides the configuration file.
        #[arg(long, env = TOKEN_ENV_VAR, hide_env_values = true)]
        token: Option<String>,
        /// Include subpages.
        #[arg(long)]
        recursive: bool,
        /// Where to write the archive. By default, `<page id>.zip` in the current directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the flashcards in an exported HTML page as JSON.
    Extract {
        /// Path to the HTML file.
        file: PathBuf,
        /// Notion workspace or user name, used in links back to the page.
        #[arg(long, default_value = "notion")]
        namespace: String,
    },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    match cli {
        Command::Sync {
            config,
            token,
            once,
            remove_obsolete,
        } => {
            let mut config = Config::load(&config)?;
            if remove_obsolete {
                config.anki.remove_obsolete = true;
            }
            let token = config.token(token)?;
            let syncer = Syncer::new(config, &token)?;
            syncer.run(once).await
        }
        Command::Export {
            page_id,
            config,
            token,
            recursive,
            output,
        } => export_page(&page_id, &config, token, recursive, output).await,
        Command::Extract { file, namespace } => {
            let records = extract_document(&file, &namespace)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
    }
}

async fn export_page(
    page_id: &str,
    config: &Path,
    token: Option<String>,
    recursive: bool,
    output: Option<PathBuf>,
) -> Fallible<()> {
    let block_id = BlockId::parse(page_id)?;
    let (settings, token) = if config.exists() {
        let config = Config::load(config)?;
        let token = config.token(token)?;
        (config.notion, token)
    } else {
        let token = require_token(token)?;
        (NotionSettings::default(), token)
    };
    let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", block_id.compact())));
    let poller = ExportPoller::new(&token, settings)?;
    let archive = poller.export_document(&block_id, recursive, &output).await?;
    println!("{}", archive.display());
    Ok(())
}
