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

//! Test helpers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::spawn;
use tokio::time::sleep;

use crate::anki::client::escape_query;
use crate::error::ErrorReport;
use crate::error::Fallible;

pub fn create_tmp_directory() -> Fallible<PathBuf> {
    let dir = tempfile::tempdir()?;
    Ok(dir.keep())
}

pub async fn wait_for_server(host: &str, port: u16) -> Fallible<()> {
    loop {
        if let Ok(stream) = TcpStream::connect(format!("{host}:{port}")).await {
            drop(stream);
            break;
        }
        sleep(Duration::from_millis(1)).await;
    }
    Ok(())
}

/// Serve the router built by `app` on a free local port in the background
/// and return the port once it accepts connections. The router is given the
/// port so it can hand out URLs pointing back at itself.
pub async fn spawn_server(app: impl FnOnce(u16) -> Router) -> Fallible<u16> {
    let port = portpicker::pick_unused_port()
        .ok_or_else(|| ErrorReport::new("No free port available"))?;
    let app = app(port);
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    wait_for_server("127.0.0.1", port).await?;
    Ok(port)
}

pub struct MockNote {
    pub id: u64,
    pub deck: String,
    pub model: String,
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

/// A tiny in-memory AnkiConnect.
#[derive(Default)]
pub struct MockAnki {
    pub next_id: u64,
    pub decks: Vec<String>,
    pub models: Vec<String>,
    pub model_updates: Vec<String>,
    pub notes: Vec<MockNote>,
    pub media: BTreeMap<String, Vec<u8>>,
    pub actions: Vec<String>,
}

pub type SharedAnki = Arc<Mutex<MockAnki>>;

impl MockAnki {
    fn find(&self, query: &str) -> Vec<u64> {
        self.notes
            .iter()
            .filter(|note| query.starts_with(&format!("deck:\"{}\"", escape_query(&note.deck))))
            .filter(|note| {
                !query.contains(" front:\"")
                    || query.ends_with(&format!(
                        " front:\"{}\"",
                        escape_query(&note.fields["Front"])
                    ))
            })
            .map(|note| note.id)
            .collect()
    }

    fn handle(&mut self, action: &str, params: &Value) -> Result<Value, String> {
        match action {
            "version" => Ok(json!(6)),
            "createDeck" => {
                self.decks.push(params["deck"].as_str().unwrap().to_string());
                Ok(json!(1))
            }
            "createModel" => {
                let name = params["modelName"].as_str().unwrap().to_string();
                if self.models.contains(&name) {
                    return Err("Model name already exists".to_string());
                }
                self.models.push(name);
                Ok(json!({}))
            }
            "updateModelTemplates" | "updateModelStyling" => {
                let name = params["model"]["name"].as_str().unwrap();
                self.model_updates.push(format!("{action}:{name}"));
                Ok(Value::Null)
            }
            "storeMediaFile" => {
                let filename = params["filename"].as_str().unwrap().to_string();
                let data = STANDARD.decode(params["data"].as_str().unwrap()).unwrap();
                self.media.insert(filename.clone(), data);
                Ok(json!(filename))
            }
            "findNotes" => Ok(json!(self.find(params["query"].as_str().unwrap()))),
            "notesInfo" => {
                let ids: Vec<u64> = serde_json::from_value(params["notes"].clone()).unwrap();
                let infos: Vec<Value> = self
                    .notes
                    .iter()
                    .filter(|note| ids.contains(&note.id))
                    .map(|note| {
                        let fields: BTreeMap<&String, Value> = note
                            .fields
                            .iter()
                            .enumerate()
                            .map(|(order, (name, value))| {
                                (name, json!({"value": value, "order": order}))
                            })
                            .collect();
                        json!({
                            "noteId": note.id,
                            "modelName": note.model,
                            "tags": note.tags,
                            "fields": fields,
                        })
                    })
                    .collect();
                Ok(json!(infos))
            }
            "addNote" => {
                let note = &params["note"];
                let deck = note["deckName"].as_str().unwrap().to_string();
                let fields: BTreeMap<String, String> =
                    serde_json::from_value(note["fields"].clone()).unwrap();
                if self
                    .notes
                    .iter()
                    .any(|n| n.deck == deck && n.fields["Front"] == fields["Front"])
                {
                    return Err("cannot create note because it is a duplicate".to_string());
                }
                self.next_id += 1;
                self.notes.push(MockNote {
                    id: self.next_id,
                    deck,
                    model: note["modelName"].as_str().unwrap().to_string(),
                    fields,
                    tags: serde_json::from_value(note["tags"].clone()).unwrap(),
                });
                Ok(json!(self.next_id))
            }
            "updateNote" => {
                let update = &params["note"];
                let id = update["id"].as_u64().unwrap();
                let Some(note) = self.notes.iter_mut().find(|n| n.id == id) else {
                    return Err(format!("Note was not found: {id}"));
                };
                let fields: BTreeMap<String, String> =
                    serde_json::from_value(update["fields"].clone()).unwrap();
                note.fields.extend(fields);
                note.tags = serde_json::from_value(update["tags"].clone()).unwrap();
                Ok(Value::Null)
            }
            "deleteNotes" => {
                let ids: Vec<u64> = serde_json::from_value(params["notes"].clone()).unwrap();
                self.notes.retain(|note| !ids.contains(&note.id));
                Ok(Value::Null)
            }
            "sync" => Ok(Value::Null),
            _ => Err(format!("unsupported action: {action}")),
        }
    }
}

async fn handler(State(state): State<SharedAnki>, Json(request): Json<Value>) -> Json<Value> {
    let mut anki = state.lock().unwrap();
    assert_eq!(request["version"], json!(6));
    let action = request["action"].as_str().unwrap().to_string();
    anki.actions.push(action.clone());
    match anki.handle(&action, &request["params"]) {
        Ok(result) => Json(json!({"result": result, "error": null})),
        Err(error) => Json(json!({"result": null, "error": error})),
    }
}

/// Start an in-memory AnkiConnect and return its state and port.
pub async fn start_mock_anki() -> Fallible<(SharedAnki, u16)> {
    let state = SharedAnki::default();
    let app_state = state.clone();
    let port = spawn_server(move |_| Router::new().route("/", post(handler)).with_state(app_state))
        .await?;
    Ok((state, port))
}
