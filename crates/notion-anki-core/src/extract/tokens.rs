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

//! The output token list and the passes run over it once a region closes.

use std::sync::LazyLock;

use regex::Regex;

use crate::extract::admission::CLOZE_TAG;
use crate::extract::admission::escape_attr;
use crate::types::record::ImageRef;

/// Paragraphs with nothing but whitespace inside.
static EMPTY_PARAGRAPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<p(?: [^>]*)?>\s*</p>").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A copied start tag.
    Open { name: String, markup: String },
    /// A copied end tag.
    Close { name: String, markup: String },
    /// The end tag of an element that enclosed the summary.
    WrapperClose(String),
    /// Escaped text content.
    Text(String),
    /// Anything the extractor synthesizes: math delimiters, cloze markers.
    Marker(String),
}

impl Token {
    pub fn as_str(&self) -> &str {
        match self {
            Token::Open { markup, .. } => markup,
            Token::Close { markup, .. } => markup,
            Token::WrapperClose(markup) => markup,
            Token::Text(text) => text,
            Token::Marker(marker) => marker,
        }
    }

    /// Whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Token::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

pub fn render(tokens: &[Token]) -> String {
    tokens.iter().map(Token::as_str).collect()
}

/// Replace `<code>`/`</code>` pairs with numbered cloze markers, numbering
/// from `first`. Returns the number of deletions created.
pub fn apply_clozes(tokens: &mut [Token], first: usize) -> usize {
    let mut count = 0;
    for token in tokens.iter_mut() {
        match token {
            Token::Open { name, .. } if name == CLOZE_TAG => {
                count += 1;
                *token = Token::Marker(format!("{{{{c{}::", first + count));
            }
            Token::Close { name, .. } if name == CLOZE_TAG => {
                *token = Token::Marker("}}".to_string());
            }
            _ => {}
        }
    }
    count
}

/// Drop whitespace-only tokens from the end of the list.
pub fn trim_trailing_blanks(tokens: &mut Vec<Token>) {
    while tokens.last().is_some_and(Token::is_blank) {
        tokens.pop();
    }
}

/// Drop the last `wrappers` end tags of the elements that enclosed the
/// summary. Content between them is kept.
pub fn drop_wrapper_closes(tokens: &mut Vec<Token>, wrappers: usize) {
    let mut remaining = wrappers;
    let mut index = tokens.len();
    while remaining > 0 && index > 0 {
        index -= 1;
        if matches!(tokens[index], Token::WrapperClose(_)) {
            tokens.remove(index);
            remaining -= 1;
        }
    }
    trim_trailing_blanks(tokens);
}

/// Point image references at their storage names. Only whole, quoted
/// attribute values are replaced, so a reference that is a suffix of
/// another one leaves the longer one alone. References were escaped when
/// their tags were rendered, so the search key is escaped too.
pub fn rewrite_images(html: &str, images: &[ImageRef]) -> String {
    images.iter().fold(html.to_string(), |html, image| {
        html.replace(
            &format!("=\"{}\"", escape_attr(&image.original_reference)),
            &format!("=\"{}\"", escape_attr(&image.storage_name)),
        )
    })
}

/// Remove empty paragraphs and the empty class attributes Notion leaves on
/// them.
pub fn strip_artifacts(html: &str) -> String {
    let html = html.replace(" class=\"\"", "");
    EMPTY_PARAGRAPH.replace_all(&html, "").into_owned()
}

/// Assemble the back of a basic record from what followed the summary.
pub fn compose_back(mut tokens: Vec<Token>, wrappers: usize, images: &[ImageRef]) -> String {
    drop_wrapper_closes(&mut tokens, wrappers);
    let back = render(&tokens);
    let back = rewrite_images(&back, images);
    strip_artifacts(&back)
}
