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

//! Extraction of a flashcard from a single toggle block.
//!
//! Notion renders each toggle block like this:
//!
//! ```html
//! <ul id="..." class="toggle">
//!   <li>
//!     <details open="">
//!       <summary>Front side of a note</summary>
//!       <p>Back side paragraph 1.</p>
//!       <p>Back side paragraph 2.</p>
//!     </details>
//!   </li>
//! </ul>
//! ```
//!
//! The extractor walks the events of such a fragment once. Everything inside
//! `summary` becomes the front, everything after it the back. Each open
//! element has a [`Frame`] on a stack recording what was decided for it, so
//! an element that is not copied suppresses its whole subtree.
//!
//! Equations are rendered by Notion as KaTeX markup with the TeX source in a
//! MathML `annotation` element; only that source is kept, between the
//! delimiters Anki expects.

pub mod admission;
pub mod events;
pub mod tokens;

use std::path::Path;
use std::path::PathBuf;

use markup5ever_rcdom::Handle;

use crate::error::Fallible;
use crate::extract::admission::ANNOTATION_TAG;
use crate::extract::admission::IMAGE_TAG;
use crate::extract::admission::MathMode;
use crate::extract::admission::SUMMARY_TAG;
use crate::extract::admission::escape_text;
use crate::extract::admission::get_attr;
use crate::extract::admission::is_allowed;
use crate::extract::admission::math_mode;
use crate::extract::admission::render_end_tag;
use crate::extract::admission::render_start_tag;
use crate::extract::events::Event;
use crate::extract::events::fragment_events;
use crate::extract::events::node_events;
use crate::extract::tokens::Token;
use crate::extract::tokens::apply_clozes;
use crate::extract::tokens::compose_back;
use crate::extract::tokens::render;
use crate::extract::tokens::rewrite_images;
use crate::media::is_external;
use crate::types::record::FlashcardRecord;
use crate::types::record::ImageRef;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Initial state, inside the toggle's wrapper elements.
    BeforeSummary,
    /// Inside `summary`.
    InFront,
    /// After `summary` closed.
    InBack,
}

/// What was decided for an open element.
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    /// An element opened before the summary.
    Wrapper(String),
    /// The summary itself.
    Summary,
    /// An allow-listed element, copied to the output.
    Copied(String),
    /// An element dropped together with its content.
    Suppressed,
    /// An equation wrapper.
    Math(MathMode),
    /// Rendering markup inside an equation.
    MathMarkup,
    /// The TeX source of an equation.
    Annotation,
}

pub struct Extractor {
    /// Directory of the document being parsed; image sources are relative to
    /// it.
    base_dir: PathBuf,
    phase: Phase,
    /// Start tags seen before the summary. Their end tags arrive after the
    /// back content and are dropped from it.
    skipped_before: usize,
    stack: Vec<Frame>,
    buffer: Vec<Token>,
    front: Option<String>,
    tags: Option<Vec<String>>,
    images: Vec<ImageRef>,
    clozes: usize,
}

/// Extract a flashcard from the markup of one toggle block.
///
/// Returns `None` if the fragment has no front side. Fails only if an image
/// it references cannot be read.
pub fn extract(markup: &str, base_dir: &Path) -> Fallible<Option<FlashcardRecord>> {
    let mut extractor = Extractor::new(base_dir);
    extractor.feed(fragment_events(markup))?;
    Ok(extractor.finish())
}

/// Like [`extract`], for a toggle block already parsed as part of a document.
pub fn extract_node(node: &Handle, base_dir: &Path) -> Fallible<Option<FlashcardRecord>> {
    let mut extractor = Extractor::new(base_dir);
    extractor.feed(node_events(node))?;
    Ok(extractor.finish())
}

impl Extractor {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            phase: Phase::BeforeSummary,
            skipped_before: 0,
            stack: Vec::new(),
            buffer: Vec::new(),
            front: None,
            tags: None,
            images: Vec::new(),
            clozes: 0,
        }
    }

    pub fn feed(&mut self, events: impl IntoIterator<Item = Event>) -> Fallible<()> {
        for event in events {
            let tokens = self.step(&event)?;
            self.buffer.extend(tokens);
        }
        Ok(())
    }

    /// Handle one event, returning the tokens it emits.
    pub fn step(&mut self, event: &Event) -> Fallible<Vec<Token>> {
        match event {
            Event::Start { name, attrs } => self.start(name, attrs),
            Event::Text(data) => Ok(self.text(data)),
            Event::End { .. } => Ok(self.end()),
        }
    }

    fn start(&mut self, name: &str, attrs: &[(String, String)]) -> Fallible<Vec<Token>> {
        if self.phase == Phase::BeforeSummary {
            if name == SUMMARY_TAG {
                self.phase = Phase::InFront;
                self.stack.push(Frame::Summary);
            } else {
                self.skipped_before += 1;
                self.stack.push(Frame::Wrapper(name.to_string()));
            }
            return Ok(Vec::new());
        }
        if name == IMAGE_TAG {
            self.harvest_image(attrs)?;
        }
        let frame = match self.stack.last() {
            Some(Frame::Suppressed) => Frame::Suppressed,
            Some(Frame::Math(_) | Frame::MathMarkup | Frame::Annotation) => {
                if name == ANNOTATION_TAG {
                    Frame::Annotation
                } else {
                    Frame::MathMarkup
                }
            }
            _ => {
                if let Some(mode) = math_mode(name, attrs) {
                    self.stack.push(Frame::Math(mode));
                    let (open, _) = mode.delimiters();
                    return Ok(vec![Token::Marker(open.to_string())]);
                }
                if is_allowed(name) {
                    self.stack.push(Frame::Copied(name.to_string()));
                    return Ok(vec![Token::Open {
                        name: name.to_string(),
                        markup: render_start_tag(name, attrs),
                    }]);
                }
                Frame::Suppressed
            }
        };
        self.stack.push(frame);
        Ok(Vec::new())
    }

    fn text(&mut self, data: &str) -> Vec<Token> {
        let in_math = match self.stack.last() {
            Some(Frame::Summary | Frame::Copied(_)) => false,
            Some(Frame::Wrapper(_)) if self.phase != Phase::BeforeSummary => false,
            Some(Frame::Annotation) => true,
            _ => return Vec::new(),
        };
        if !in_math && self.phase == Phase::InFront && self.tags.is_none() && data.starts_with('#') {
            self.tags = Some(parse_tags(data));
            return Vec::new();
        }
        vec![Token::Text(escape_text(data))]
    }

    fn end(&mut self) -> Vec<Token> {
        let Some(frame) = self.stack.pop() else {
            return Vec::new();
        };
        match frame {
            Frame::Wrapper(name) => {
                if self.phase == Phase::BeforeSummary {
                    // A sibling of the element holding the summary.
                    self.skipped_before -= 1;
                    Vec::new()
                } else {
                    vec![Token::WrapperClose(render_end_tag(&name))]
                }
            }
            Frame::Summary => {
                self.close_front();
                Vec::new()
            }
            Frame::Copied(name) => vec![Token::Close {
                markup: render_end_tag(&name),
                name,
            }],
            Frame::Math(mode) => {
                let (_, close) = mode.delimiters();
                vec![Token::Marker(close.to_string())]
            }
            Frame::Suppressed | Frame::MathMarkup | Frame::Annotation => Vec::new(),
        }
    }

    /// The summary closed: turn code spans into clozes and set the front.
    fn close_front(&mut self) {
        let mut tokens = std::mem::take(&mut self.buffer);
        self.clozes += apply_clozes(&mut tokens, self.clozes);
        self.front = Some(render(&tokens));
        self.phase = Phase::InBack;
    }

    fn harvest_image(&mut self, attrs: &[(String, String)]) -> Fallible<()> {
        let Some(src) = get_attr(attrs, "src") else {
            return Ok(());
        };
        if is_external(src) {
            log::debug!("Skipping external image: {src}");
            return Ok(());
        }
        if self.images.iter().any(|image| image.original_reference == src) {
            return Ok(());
        }
        let image = ImageRef::load(&self.base_dir, src)?;
        self.images.push(image);
        Ok(())
    }

    /// Build the record. Returns `None` if the fragment never produced a
    /// front side.
    pub fn finish(self) -> Option<FlashcardRecord> {
        let front = match self.front {
            Some(front) if !front.trim().is_empty() => front,
            _ => {
                log::debug!("Toggle block without a front side, skipping");
                return None;
            }
        };
        let front = rewrite_images(&front, &self.images);
        let back = if self.clozes > 0 {
            None
        } else {
            Some(compose_back(self.buffer, self.skipped_before, &self.images))
        };
        Some(FlashcardRecord {
            front,
            back,
            tags: self.tags.filter(|tags| !tags.is_empty()),
            source: None,
            images: if self.images.is_empty() {
                None
            } else {
                Some(self.images)
            },
        })
    }
}

/// Split a `#tag1 #tag2` run into tags, dropping empties and repeats.
fn parse_tags(data: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in data.split('#').map(str::trim).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
