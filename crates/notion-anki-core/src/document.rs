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

use markup5ever_rcdom::Handle;

use crate::block_id::BlockId;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::error::fail;
use crate::extract::events::attribute;
use crate::extract::events::find_all;
use crate::extract::events::find_element;
use crate::extract::events::is_element;
use crate::extract::events::parse_html;
use crate::extract::extract_node;
use crate::types::record::FlashcardRecord;

/// Extract every flashcard from an exported Notion page.
pub fn extract_document(path: &Path, namespace: &str) -> Fallible<Vec<FlashcardRecord>> {
    let html = read_to_string(path).map_err(|e| {
        ErrorReport::new(format!("Failed to read {}: {e}", path.display()))
    })?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    extract_document_str(&html, base_dir, namespace)
}

/// Extract every flashcard from the markup of an exported page, resolving
/// images against `base_dir`.
pub fn extract_document_str(
    html: &str,
    base_dir: &Path,
    namespace: &str,
) -> Fallible<Vec<FlashcardRecord>> {
    let dom = parse_html(html);
    let Some(article) = find_element(&dom.document, "article") else {
        return fail("Document has no article element.");
    };
    let Some(article_id) = attribute(&article, "id") else {
        return fail("Article element has no id.");
    };
    let source = source_url(namespace, &BlockId::parse(&article_id)?);
    let toggles = find_all(&article, &is_toggle);
    log::debug!("Found {} toggle blocks in {}", toggles.len(), source);
    let mut records = Vec::new();
    for toggle in toggles {
        if let Some(mut record) = extract_node(&toggle, base_dir)? {
            record.source = Some(source.clone());
            records.push(record);
        }
    }
    Ok(records)
}

/// Back-link to a page.
pub fn source_url(namespace: &str, page: &BlockId) -> String {
    format!("https://notion.so/{}/{}", namespace, page.compact())
}

fn is_toggle(node: &Handle) -> bool {
    is_element(node, "ul")
        && attribute(node, "class")
            .is_some_and(|class| class.split_whitespace().any(|c| c == "toggle"))
}
