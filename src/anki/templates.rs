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

use serde::Deserialize;

pub const MODEL_CSS: &str = include_str!("model.css");

/// Names, card templates and stylesheet of the note types synced notes use.
/// Every field can be overridden from the `[anki.templates]` table.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelTemplates {
    pub basic_model: String,
    pub cloze_model: String,
    pub card_name: String,
    pub front: String,
    pub back: String,
    pub cloze_front: String,
    pub cloze_back: String,
    pub css: String,
}

impl Default for ModelTemplates {
    fn default() -> Self {
        Self {
            basic_model: "notion-anki-sync".to_string(),
            cloze_model: "notion-anki-sync-cloze".to_string(),
            card_name: "Question-Answer".to_string(),
            front: r#"<div class="front">{{Front}}</div>"#.to_string(),
            back: concat!(
                r#"<div class="front-on-back">{{Front}}</div>"#,
                r#"<hr id="back">"#,
                r#"<div class="back">{{Back}}</div>"#,
                r#"<hr id="source">"#,
                r#"<div class="backlink">{{Source}}</div>"#
            )
            .to_string(),
            cloze_front: r#"<div class="front">{{cloze:Front}}</div>"#.to_string(),
            cloze_back: concat!(
                r#"<div class="front">{{cloze:Front}}</div>"#,
                r#"<hr id="source">"#,
                r#"<div class="backlink">{{Source}}</div>"#
            )
            .to_string(),
            css: MODEL_CSS.to_string(),
        }
    }
}

/// The note type a record is stored as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteKind {
    Basic,
    Cloze,
}

impl NoteKind {
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            NoteKind::Basic => &["Front", "Back", "Source"],
            NoteKind::Cloze => &["Front", "Source"],
        }
    }
}

impl ModelTemplates {
    pub fn model_name(&self, kind: NoteKind) -> &str {
        match kind {
            NoteKind::Basic => &self.basic_model,
            NoteKind::Cloze => &self.cloze_model,
        }
    }

    /// Front and back templates of the model's single card type.
    pub fn card(&self, kind: NoteKind) -> (&str, &str) {
        match kind {
            NoteKind::Basic => (&self.front, &self.back),
            NoteKind::Cloze => (&self.cloze_front, &self.cloze_back),
        }
    }
}
