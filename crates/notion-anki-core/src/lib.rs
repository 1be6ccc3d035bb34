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

//! notion-anki-core: Core library for notion-anki-sync.
//!
//! This library is synchronous and does no networking. It provides:
//! - Notion block id parsing and normalization
//! - Extraction of flashcards from toggle blocks in exported pages
//! - Image harvesting for those flashcards

pub mod block_id;
pub mod document;
pub mod error;
pub mod extract;
pub mod media;
pub mod types;

// Re-exports for convenience
pub use block_id::{BlockId, BlockIdError, normalize_block_id};
pub use document::{extract_document, extract_document_str, source_url};
pub use error::{ErrorReport, Fallible, fail};
pub use extract::extract;
pub use types::record::{FlashcardRecord, ImageRef};
