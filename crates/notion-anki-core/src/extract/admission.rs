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

//! Which tags make it into a flashcard, and how they are rendered.

/// Presentational tags copied into the record verbatim.
const ALLOWED_TAGS: [&str; 20] = [
    "h1",
    "h2",
    "h3",
    "p",
    "strong",
    "em",
    "del",
    "pre",
    "code",
    "mark",
    "ul",
    "ol",
    "li",
    "div",
    "span",
    "blockquote",
    "hr",
    "figure",
    "a",
    "img",
];

/// Attributes dropped when a tag is copied.
const SKIPPED_ATTRIBUTES: [&str; 1] = ["id"];

/// Class Notion puts on the wrapper of an inline equation.
const INLINE_MATH_CLASS: &str = "notion-text-equation-token";

/// Class Notion puts on the wrapper of a block equation.
const BLOCK_MATH_CLASS: &str = "equation";

/// Tags that can wrap an equation.
const MATH_WRAPPER_TAGS: [&str; 2] = ["span", "figure"];

pub const SUMMARY_TAG: &str = "summary";

pub const ANNOTATION_TAG: &str = "annotation";

pub const IMAGE_TAG: &str = "img";

pub const CLOZE_TAG: &str = "code";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MathMode {
    Inline,
    Block,
}

impl MathMode {
    /// The delimiters Anki's MathJax renderer expects.
    pub fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            MathMode::Inline => ("\\(", "\\)"),
            MathMode::Block => ("\\[", "\\]"),
        }
    }
}

pub fn is_allowed(tag: &str) -> bool {
    ALLOWED_TAGS.contains(&tag)
}

pub fn get_attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(attr, _)| attr == name)
        .map(|(_, value)| value.as_str())
}

/// Whether a start tag opens an equation, and which kind.
pub fn math_mode(tag: &str, attrs: &[(String, String)]) -> Option<MathMode> {
    if !MATH_WRAPPER_TAGS.contains(&tag) {
        return None;
    }
    match get_attr(attrs, "class") {
        Some(BLOCK_MATH_CLASS) => Some(MathMode::Block),
        Some(INLINE_MATH_CLASS) => Some(MathMode::Inline),
        _ => None,
    }
}

pub fn render_start_tag(tag: &str, attrs: &[(String, String)]) -> String {
    let rendered: Vec<String> = attrs
        .iter()
        .filter(|(attr, _)| !SKIPPED_ATTRIBUTES.contains(&attr.as_str()))
        .map(|(attr, value)| format!("{attr}=\"{}\"", escape_attr(value)))
        .collect();
    if rendered.is_empty() {
        format!("<{tag}>")
    } else {
        format!("<{tag} {}>", rendered.join(" "))
    }
}

pub fn render_end_tag(tag: &str) -> String {
    format!("</{tag}>")
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
