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

use std::fs::read;
use std::path::Path;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::types::record::ImageRef;

/// Decode percent-encoded characters in a URL path (e.g., %20 to space).
fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Whether an image source points outside the unpacked export.
pub fn is_external(src: &str) -> bool {
    src.contains("://") || src.starts_with("data:")
}

/// Resolve an image `src` against the directory of the document it appears
/// in.
pub fn resolve_image_path(base_dir: &Path, src: &str) -> PathBuf {
    base_dir.join(percent_decode(src))
}

/// Derive the name an image is stored under: the alphanumeric characters of
/// the original reference, an underscore, and the file name.
///
/// Exports of different pages routinely contain files with the same name
/// (`image.png`, `Untitled.png`), so the reference prefix keeps them apart.
pub fn storage_name(original_reference: &str, absolute_path: &Path) -> String {
    let prefix: String = original_reference
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let file_name = absolute_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{prefix}_{file_name}")
}

impl ImageRef {
    /// Resolve and read an image referenced from a document in `base_dir`.
    pub fn load(base_dir: &Path, src: &str) -> Fallible<Self> {
        let absolute_path = resolve_image_path(base_dir, src);
        let bytes = read(&absolute_path).map_err(|e| {
            ErrorReport::new(format!(
                "Failed to read image '{}': {e}",
                absolute_path.display()
            ))
        })?;
        Ok(Self {
            original_reference: src.to_string(),
            storage_name: storage_name(src, &absolute_path),
            absolute_path,
            bytes,
        })
    }
}
