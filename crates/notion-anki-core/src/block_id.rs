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

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Offsets of the dashes in the canonical form of a block id, counted in
/// hex digits.
const DASH_OFFSETS: [usize; 4] = [8, 12, 16, 20];

/// Number of hex digits in a block id.
const HEX_LEN: usize = 32;

/// A Notion block id, stored in its canonical dashed form, e.g.
/// `d151217a-e85f-4e79-a054-06f7db2bb0da`.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId {
    dashed: String,
}

/// Errors that can occur when parsing a block id.
#[derive(Debug, PartialEq)]
pub enum BlockIdError {
    /// The input is the empty string.
    Empty,
    /// The input does not contain exactly 32 hex digits.
    Length(usize),
    /// The input contains a character that is neither a hex digit nor a dash.
    InvalidCharacter(char),
    /// Dashes are present but not at the canonical offsets.
    MisplacedDash,
}

impl Display for BlockIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockIdError::Empty => write!(f, "block id is the empty string."),
            BlockIdError::Length(n) => {
                write!(f, "block id must have {HEX_LEN} hex digits, found {n}.")
            }
            BlockIdError::InvalidCharacter(c) => {
                write!(f, "block id contains an invalid character: {c:?}.")
            }
            BlockIdError::MisplacedDash => write!(f, "block id has misplaced dashes."),
        }
    }
}

impl std::error::Error for BlockIdError {}

impl BlockId {
    /// Parse a block id.
    ///
    /// Accepts the dashed form, the undashed 32-character form, and a page
    /// slug as it appears in Notion URLs (`Some-Page-Title-<32 hex digits>`).
    pub fn parse(input: &str) -> Result<Self, BlockIdError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(BlockIdError::Empty);
        }
        let candidate = slug_suffix(input).unwrap_or(input);
        let digits = hex_digits(candidate)?;
        Ok(Self {
            dashed: insert_dashes(&digits),
        })
    }

    /// The canonical dashed form.
    pub fn as_str(&self) -> &str {
        &self.dashed
    }

    /// The id without dashes, as used in notion.so URLs.
    pub fn compact(&self) -> String {
        self.dashed.replace('-', "")
    }
}

/// Normalize a block id to its canonical dashed form.
///
/// I.e. `d151217ae85f4e79a05406f7db2bb0da` becomes
/// `d151217a-e85f-4e79-a054-06f7db2bb0da`.
pub fn normalize_block_id(input: &str) -> Result<String, BlockIdError> {
    BlockId::parse(input).map(|id| id.dashed)
}

/// If the input looks like `Title-Words-<32 hex>`, return the hex suffix.
fn slug_suffix(input: &str) -> Option<&str> {
    let (_, tail) = input.rsplit_once('-')?;
    if tail.len() == HEX_LEN && tail.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(tail)
    } else {
        None
    }
}

/// Collect the lower-cased hex digits of a dashed or undashed id, checking
/// that any dashes sit at the canonical offsets.
fn hex_digits(input: &str) -> Result<String, BlockIdError> {
    let mut digits = String::with_capacity(HEX_LEN);
    let mut dashes = Vec::new();
    for c in input.chars() {
        if c == '-' {
            dashes.push(digits.len());
        } else if c.is_ascii_hexdigit() {
            digits.push(c.to_ascii_lowercase());
        } else {
            return Err(BlockIdError::InvalidCharacter(c));
        }
    }
    if digits.len() != HEX_LEN {
        return Err(BlockIdError::Length(digits.len()));
    }
    if !dashes.is_empty() && dashes != DASH_OFFSETS {
        return Err(BlockIdError::MisplacedDash);
    }
    Ok(digits)
}

fn insert_dashes(digits: &str) -> String {
    let mut dashed = String::with_capacity(HEX_LEN + DASH_OFFSETS.len());
    for (i, c) in digits.chars().enumerate() {
        if DASH_OFFSETS.contains(&i) {
            dashed.push('-');
        }
        dashed.push(c);
    }
    dashed
}

impl Display for BlockId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.dashed)
    }
}

impl FromStr for BlockId {
    type Err = BlockIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockId::parse(s)
    }
}

impl TryFrom<String> for BlockId {
    type Error = BlockIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        BlockId::parse(&value)
    }
}

impl From<BlockId> for String {
    fn from(id: BlockId) -> String {
        id.dashed
    }
}
