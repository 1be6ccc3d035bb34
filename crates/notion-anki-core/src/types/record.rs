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

use std::path::PathBuf;

use serde::Serialize;

/// A flashcard extracted from one toggle block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlashcardRecord {
    /// The prompt. For cloze records, the answer is embedded here as
    /// `{{cN::...}}` markers.
    pub front: String,
    /// The answer, or `None` for cloze records.
    pub back: Option<String>,
    /// Tags, in the order they were written.
    pub tags: Option<Vec<String>>,
    /// Link to the Notion page the record came from. Filled in by the
    /// document driver.
    pub source: Option<String>,
    /// Images referenced by the record.
    pub images: Option<Vec<ImageRef>>,
}

impl FlashcardRecord {
    pub fn is_cloze(&self) -> bool {
        self.back.is_none()
    }

    pub fn images(&self) -> &[ImageRef] {
        self.images.as_deref().unwrap_or_default()
    }

    pub fn tags(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }
}

/// An image referenced by a record, read from the unpacked export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    /// The `src` attribute exactly as it appears in the markup.
    pub original_reference: String,
    /// The name the image is stored under in the flashcard store.
    pub storage_name: String,
    /// Absolute path to the image file.
    pub absolute_path: PathBuf,
    /// File contents.
    #[serde(skip)]
    pub bytes: Vec<u8>,
}
