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

//! Flattening of parsed markup into a stream of start/text/end events.
//!
//! Markup is parsed with html5ever, so malformed input is repaired the way a
//! browser would repair it, and every element yields a matching end event,
//! void elements like `img` included.

use html5ever::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::Handle;
use markup5ever_rcdom::NodeData;
use markup5ever_rcdom::RcDom;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    End {
        name: String,
    },
}

impl Event {
    pub fn start(name: &str, attrs: &[(&str, &str)]) -> Self {
        Event::Start {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn text(data: &str) -> Self {
        Event::Text(data.to_string())
    }

    pub fn end(name: &str) -> Self {
        Event::End {
            name: name.to_string(),
        }
    }
}

/// Parse an HTML document.
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

/// Parse a markup fragment and return the events of the nodes that end up in
/// the document body.
pub fn fragment_events(markup: &str) -> Vec<Event> {
    let dom = parse_html(markup);
    let mut events = Vec::new();
    if let Some(body) = find_element(&dom.document, "body") {
        for child in body.children.borrow().iter() {
            push_events(child, &mut events);
        }
    }
    events
}

/// The events of a node and its descendants, in document order.
pub fn node_events(node: &Handle) -> Vec<Event> {
    let mut events = Vec::new();
    push_events(node, &mut events);
    events
}

fn push_events(node: &Handle, events: &mut Vec<Event>) {
    match node.data {
        NodeData::Element {
            ref name,
            ref attrs,
            ..
        } => {
            let name = name.local.to_string();
            let attrs = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            events.push(Event::Start {
                name: name.clone(),
                attrs,
            });
            for child in node.children.borrow().iter() {
                push_events(child, events);
            }
            events.push(Event::End { name });
        }
        NodeData::Text { ref contents } => {
            events.push(Event::Text(contents.borrow().to_string()));
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                push_events(child, events);
            }
        }
        _ => {}
    }
}

/// The value of an element's attribute, if the node is an element and has
/// it.
pub fn attribute(node: &Handle, attr_name: &str) -> Option<String> {
    match node.data {
        NodeData::Element { ref attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// Whether the node is an element with the given local name.
pub fn is_element(node: &Handle, local_name: &str) -> bool {
    match node.data {
        NodeData::Element { ref name, .. } => &*name.local == local_name,
        _ => false,
    }
}

/// Depth-first search for the first element with the given local name.
pub fn find_element(node: &Handle, local_name: &str) -> Option<Handle> {
    if is_element(node, local_name) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, local_name))
}

/// Every element, at any depth, for which `pred` holds, in document order.
pub fn find_all(node: &Handle, pred: &impl Fn(&Handle) -> bool) -> Vec<Handle> {
    let mut found = Vec::new();
    collect(node, pred, &mut found);
    found
}

fn collect(node: &Handle, pred: &impl Fn(&Handle) -> bool, found: &mut Vec<Handle>) {
    if pred(node) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect(child, pred, found);
    }
}
