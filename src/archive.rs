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

use std::fs::File;
use std::fs::remove_file;
use std::path::Path;
use std::path::PathBuf;

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::Fallible;

/// Unpack a Notion export into `destination` and return the HTML documents
/// in it, sorted by path.
///
/// Large exports come as an archive of archives; those are unpacked in place,
/// one level deep.
pub fn unpack_archive(archive: &Path, destination: &Path) -> Fallible<Vec<PathBuf>> {
    extract_zip(archive, destination)?;
    for nested in find_files(destination, "zip")? {
        if nested == archive {
            continue;
        }
        let parent = nested.parent().unwrap_or(destination);
        log::debug!("Unpacking nested archive {}", nested.display());
        extract_zip(&nested, parent)?;
        remove_file(&nested)?;
    }
    let documents = find_files(destination, "html")?;
    log::debug!(
        "Unpacked {} documents from {}",
        documents.len(),
        archive.display()
    );
    Ok(documents)
}

fn extract_zip(archive: &Path, destination: &Path) -> Fallible<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    zip.extract(destination)?;
    Ok(())
}

/// Every file under `root` with the given extension, sorted.
fn find_files(root: &Path, extension: &str) -> Fallible<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}
