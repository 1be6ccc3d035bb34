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

//! AnkiConnect request and response payloads.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// AnkiConnect API version spoken by the client.
pub const API_VERSION: u32 = 6;

#[derive(Serialize, Debug)]
pub struct Request<'a> {
    pub action: &'a str,
    pub version: u32,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Deserialize, Debug)]
pub struct Response {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub deck_name: String,
    pub model_name: String,
    pub fields: BTreeMap<String, String>,
    pub tags: Vec<String>,
    pub options: AddOptions,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            allow_duplicate: false,
            duplicate_scope: "deck".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    pub note_id: u64,
    pub model_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub value: String,
    pub order: u32,
}

impl NoteInfo {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|field| field.value.as_str())
    }
}

/// Error categories AnkiConnect reports as free-form messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnkiErrorKind {
    DuplicateNote,
    NoteNotFound,
    ModelExists,
    Unknown,
}

impl AnkiErrorKind {
    pub fn from_message(message: &str) -> Self {
        let message = message.trim().to_lowercase();
        if message == "cannot create note because it is a duplicate" {
            AnkiErrorKind::DuplicateNote
        } else if message == "model name already exists" {
            AnkiErrorKind::ModelExists
        } else if message.contains("note was not found") {
            AnkiErrorKind::NoteNotFound
        } else {
            AnkiErrorKind::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnkiError {
    /// AnkiConnect answered with an error.
    Remote { kind: AnkiErrorKind, message: String },
    /// AnkiConnect could not be reached.
    Transport(String),
    /// The response was not what the action returns.
    Decode(String),
}

impl AnkiError {
    pub fn remote(message: String) -> Self {
        AnkiError::Remote {
            kind: AnkiErrorKind::from_message(&message),
            message,
        }
    }

    pub fn is(&self, kind: AnkiErrorKind) -> bool {
        matches!(self, AnkiError::Remote { kind: k, .. } if *k == kind)
    }
}

impl Display for AnkiError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            AnkiError::Remote { message, .. } => write!(f, "{message}"),
            AnkiError::Transport(message) => write!(f, "cannot reach AnkiConnect: {message}"),
            AnkiError::Decode(message) => write!(f, "unexpected AnkiConnect response: {message}"),
        }
    }
}

impl std::error::Error for AnkiError {}
