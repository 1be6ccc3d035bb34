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

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use maud::html;
use notion_anki_core::FlashcardRecord;
use notion_anki_core::ImageRef;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::anki::models::API_VERSION;
use crate::anki::models::AddOptions;
use crate::anki::models::AnkiError;
use crate::anki::models::AnkiErrorKind;
use crate::anki::models::NewNote;
use crate::anki::models::NoteInfo;
use crate::anki::models::Request;
use crate::anki::models::Response;
use crate::anki::templates::ModelTemplates;
use crate::anki::templates::NoteKind;
use crate::config::AnkiSettings;
use crate::error::Fallible;
use crate::error::fail;
use crate::notion::retry::RetryError;
use crate::notion::retry::RetryPolicy;
use crate::notion::retry::Step;
use crate::notion::retry::Success;
use crate::notion::retry::retry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What [`AnkiClient::upsert`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upsert {
    Created(u64),
    Updated(u64),
    Unchanged(u64),
    /// The record switched between basic and cloze, so the old note was
    /// replaced.
    Recreated(u64),
}

impl Upsert {
    pub fn note_id(self) -> u64 {
        match self {
            Upsert::Created(id) | Upsert::Updated(id) | Upsert::Unchanged(id) | Upsert::Recreated(id) => id,
        }
    }
}

/// Client for the AnkiConnect add-on, scoped to one deck.
pub struct AnkiClient {
    http: Client,
    endpoint: String,
    deck: String,
    templates: ModelTemplates,
}

impl AnkiClient {
    pub fn new(settings: &AnkiSettings) -> Fallible<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            deck: settings.deck.clone(),
            templates: settings.templates.clone(),
        })
    }

    async fn invoke<R: DeserializeOwned>(&self, action: &str, params: Value) -> Result<R, AnkiError> {
        let request = Request {
            action,
            version: API_VERSION,
            params,
        };
        let response: Response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnkiError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| AnkiError::Decode(e.to_string()))?;
        if let Some(message) = response.error {
            return Err(AnkiError::remote(message));
        }
        serde_json::from_value(response.result)
            .map_err(|e| AnkiError::Decode(format!("{action}: {e}")))
    }

    pub async fn version(&self) -> Result<u32, AnkiError> {
        self.invoke("version", Value::Null).await
    }

    /// Wait for Anki to be running with AnkiConnect installed.
    pub async fn wait_until_available(&self, policy: RetryPolicy) -> Fallible<()> {
        let client = self;
        let outcome = retry(
            policy,
            "AnkiConnect",
            |_: &AnkiError| true,
            move |_| async move { client.version().await.map(Step::Ready) },
        )
        .await;
        match outcome {
            Ok(Success { value: version, .. }) => {
                if version != API_VERSION {
                    log::warn!(
                        "AnkiConnect API version mismatch: expected {API_VERSION}, got {version}"
                    );
                }
                Ok(())
            }
            Err(RetryError::Exhausted { attempts, .. }) => fail(format!(
                "Cannot connect to AnkiConnect at {} after {attempts} attempts. Is Anki running?",
                self.endpoint
            )),
            Err(RetryError::Fatal(e)) => Err(e.into()),
        }
    }

    pub async fn ensure_deck(&self) -> Result<(), AnkiError> {
        let _: Value = self
            .invoke("createDeck", json!({ "deck": self.deck }))
            .await?;
        log::info!("Deck ready: {}", self.deck);
        Ok(())
    }

    /// Create the basic and cloze note types, or bring the templates and
    /// stylesheet of existing ones up to date.
    pub async fn ensure_models(&self) -> Result<(), AnkiError> {
        for kind in [NoteKind::Basic, NoteKind::Cloze] {
            self.ensure_model(kind).await?;
        }
        Ok(())
    }

    async fn ensure_model(&self, kind: NoteKind) -> Result<(), AnkiError> {
        let name = self.templates.model_name(kind);
        let (front, back) = self.templates.card(kind);
        let params = json!({
            "modelName": name,
            "inOrderFields": kind.fields(),
            "css": self.templates.css,
            "isCloze": kind == NoteKind::Cloze,
            "cardTemplates": [{
                "Name": self.templates.card_name,
                "Front": front,
                "Back": back,
            }],
        });
        match self.invoke::<Value>("createModel", params).await {
            Ok(_) => {
                log::info!("Model created: {name}");
                Ok(())
            }
            Err(e) if e.is(AnkiErrorKind::ModelExists) => {
                let mut templates = Map::new();
                templates.insert(
                    self.templates.card_name.clone(),
                    json!({ "Front": front, "Back": back }),
                );
                let _: Value = self
                    .invoke(
                        "updateModelTemplates",
                        json!({ "model": { "name": name, "templates": templates } }),
                    )
                    .await?;
                let _: Value = self
                    .invoke(
                        "updateModelStyling",
                        json!({ "model": { "name": name, "css": self.templates.css } }),
                    )
                    .await?;
                log::info!("Model updated: {name}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn store_media(&self, image: &ImageRef) -> Result<(), AnkiError> {
        let _: Value = self
            .invoke(
                "storeMediaFile",
                json!({
                    "filename": image.storage_name,
                    "data": STANDARD.encode(&image.bytes),
                }),
            )
            .await?;
        log::debug!("Stored {}", image.storage_name);
        Ok(())
    }

    /// Find the note in the deck whose front is exactly `front`.
    pub async fn find_note(&self, front: &str) -> Result<Option<u64>, AnkiError> {
        let query = format!(
            "deck:\"{}\" front:\"{}\"",
            escape_query(&self.deck),
            escape_query(front)
        );
        log::debug!("Searching with a query: {query}");
        let ids: Vec<u64> = self.invoke("findNotes", json!({ "query": query })).await?;
        Ok(ids.first().copied())
    }

    pub async fn notes_info(&self, ids: &[u64]) -> Result<Vec<NoteInfo>, AnkiError> {
        self.invoke("notesInfo", json!({ "notes": ids })).await
    }

    /// Ids of every note in the deck.
    pub async fn deck_note_ids(&self) -> Result<Vec<u64>, AnkiError> {
        let query = format!("deck:\"{}\"", escape_query(&self.deck));
        self.invoke("findNotes", json!({ "query": query })).await
    }

    pub async fn delete_notes(&self, ids: &[u64]) -> Result<(), AnkiError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: Value = self.invoke("deleteNotes", json!({ "notes": ids })).await?;
        log::info!("Deleted {} notes", ids.len());
        Ok(())
    }

    pub async fn trigger_sync(&self) -> Result<(), AnkiError> {
        let _: Value = self.invoke("sync", Value::Null).await?;
        log::info!("Anki sync triggered");
        Ok(())
    }

    /// Create a note for the record, or update the note that has the same
    /// front.
    pub async fn upsert(&self, record: &FlashcardRecord) -> Result<Upsert, AnkiError> {
        for image in record.images() {
            self.store_media(image).await?;
        }
        let kind = if record.is_cloze() {
            NoteKind::Cloze
        } else {
            NoteKind::Basic
        };
        let model = self.templates.model_name(kind);
        let fields = note_fields(record, kind);
        let tags = record.tags().to_vec();
        let Some(id) = self.find_note(&record.front).await? else {
            let id = self.add_note(kind, fields, tags).await?;
            log::info!("Note created: id={id}, front={:?}", record.front);
            return Ok(Upsert::Created(id));
        };
        let info = self
            .notes_info(&[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AnkiError::remote(format!("Note was not found: {id}")))?;
        if info.model_name != model {
            log::warn!(
                "Note type changed: note_id={id}, old={}, new={model}",
                info.model_name
            );
            self.delete_notes(&[id]).await?;
            let id = self.add_note(kind, fields, tags).await?;
            return Ok(Upsert::Recreated(id));
        }
        if is_unchanged(&info, &fields, &tags) {
            return Ok(Upsert::Unchanged(id));
        }
        let _: Value = self
            .invoke(
                "updateNote",
                json!({ "note": { "id": id, "fields": fields, "tags": tags } }),
            )
            .await?;
        log::info!("Note updated: id={id}, front={:?}", record.front);
        Ok(Upsert::Updated(id))
    }

    async fn add_note(
        &self,
        kind: NoteKind,
        fields: BTreeMap<String, String>,
        tags: Vec<String>,
    ) -> Result<u64, AnkiError> {
        let note = NewNote {
            deck_name: self.deck.clone(),
            model_name: self.templates.model_name(kind).to_string(),
            fields,
            tags,
            options: AddOptions::default(),
        };
        self.invoke("addNote", json!({ "note": note })).await
    }
}

/// Escape a term for use inside double quotes in an Anki search.
pub fn escape_query(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '"' | '*' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The `Source` field: a link back to the Notion page.
pub fn source_link(source: Option<&str>) -> String {
    match source {
        Some(url) => html! { a href=(url) { (url) } }.into_string(),
        None => String::new(),
    }
}

fn note_fields(record: &FlashcardRecord, kind: NoteKind) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    fields.insert("Front".to_string(), record.front.clone());
    if kind == NoteKind::Basic {
        fields.insert(
            "Back".to_string(),
            record.back.clone().unwrap_or_default(),
        );
    }
    fields.insert(
        "Source".to_string(),
        source_link(record.source.as_deref()),
    );
    fields
}

fn is_unchanged(info: &NoteInfo, fields: &BTreeMap<String, String>, tags: &[String]) -> bool {
    let same_fields = fields
        .iter()
        .all(|(name, value)| info.field(name) == Some(value.as_str()));
    let old_tags: BTreeSet<&String> = info.tags.iter().collect();
    let new_tags: BTreeSet<&String> = tags.iter().collect();
    same_fields && old_tags == new_tags
}
