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

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::Path;
use std::time::Duration;

use chrono::Local;
use chrono::TimeDelta;
use futures_util::future::join_all;
use notion_anki_core::BlockId;
use notion_anki_core::FlashcardRecord;
use notion_anki_core::extract_document;
use tokio::signal::ctrl_c;
use tokio::task::spawn_blocking;
use tokio::time::sleep;

use crate::anki::client::AnkiClient;
use crate::anki::client::Upsert;
use crate::archive::unpack_archive;
use crate::config::Config;
use crate::config::PageSpec;
use crate::error::Fallible;
use crate::error::fail;
use crate::notion::export::ExportPoller;
use crate::notion::retry::RetryPolicy;

const ANKI_WAIT: RetryPolicy = RetryPolicy {
    max_attempts: 30,
    backoff: Duration::from_secs(2),
};

/// Counts from one sync.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SyncStats {
    /// Records handed to Anki.
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed_pages: usize,
    /// Documents in an export that could not be read.
    pub failed_documents: usize,
    /// Records Anki rejected.
    pub failed_notes: usize,
}

impl SyncStats {
    /// Whether every page, document and note made it into Anki.
    pub fn is_complete(&self) -> bool {
        self.failed_pages == 0 && self.failed_documents == 0 && self.failed_notes == 0
    }
}

impl Display for SyncStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={}, created={}, updated={}, deleted={}, failed_pages={}, failed_documents={}, failed_notes={}",
            self.processed,
            self.created,
            self.updated,
            self.deleted,
            self.failed_pages,
            self.failed_documents,
            self.failed_notes
        )
    }
}

/// The records exported from one page.
#[derive(Debug, Default)]
pub struct PageRecords {
    pub records: Vec<FlashcardRecord>,
    pub failed_documents: usize,
}

pub struct Syncer {
    config: Config,
    poller: ExportPoller,
    anki: AnkiClient,
    anki_wait: RetryPolicy,
}

impl Syncer {
    pub fn new(config: Config, token: &str) -> Fallible<Self> {
        let poller = ExportPoller::new(token, config.notion.clone())?;
        let anki = AnkiClient::new(&config.anki)?;
        Ok(Self {
            config,
            poller,
            anki,
            anki_wait: ANKI_WAIT,
        })
    }

    /// How long to wait for Anki to come up before giving up on a sync.
    pub fn with_anki_wait(self, anki_wait: RetryPolicy) -> Self {
        Self { anki_wait, ..self }
    }

    /// Export one page and extract the flashcards in it.
    pub async fn sync_page(&self, page: &PageSpec) -> Fallible<PageRecords> {
        let block_id = BlockId::parse(&page.page_id)?;
        let workdir = tempfile::tempdir()?;
        let archive = workdir.path().join("export.zip");
        log::info!("Exporting page {block_id}");
        self.poller
            .export_document(&block_id, page.recursive, &archive)
            .await?;
        let unpacked = workdir.path().join("export");
        let namespace = self.config.namespace.clone();
        let page_records =
            spawn_blocking(move || extract_archive(&archive, &unpacked, &namespace)).await??;
        log::info!(
            "Page {block_id}: {} records",
            page_records.records.len()
        );
        Ok(page_records)
    }

    /// Export every configured page and bring the deck up to date.
    pub async fn sync_all(&self) -> Fallible<SyncStats> {
        self.anki.wait_until_available(self.anki_wait).await?;
        self.anki.ensure_deck().await?;
        self.anki.ensure_models().await?;

        let pages = &self.config.pages;
        let results = join_all(pages.iter().map(|page| self.sync_page(page))).await;

        let mut stats = SyncStats::default();
        let mut touched = BTreeSet::new();
        for (page, result) in pages.iter().zip(results) {
            let page_records = match result {
                Ok(page_records) => page_records,
                Err(e) => {
                    log::error!("Failed to sync page {}: {e}", page.page_id);
                    stats.failed_pages += 1;
                    continue;
                }
            };
            stats.failed_documents += page_records.failed_documents;
            for record in &page_records.records {
                stats.processed += 1;
                match self.anki.upsert(record).await {
                    Ok(outcome) => {
                        match outcome {
                            Upsert::Created(_) => stats.created += 1,
                            Upsert::Updated(_) | Upsert::Recreated(_) => stats.updated += 1,
                            Upsert::Unchanged(_) => {}
                        }
                        touched.insert(outcome.note_id());
                    }
                    Err(e) => {
                        log::warn!("Skipping note {:?}: {e}", record.front);
                        stats.failed_notes += 1;
                    }
                }
            }
        }

        if self.config.anki.remove_obsolete {
            if stats.is_complete() {
                let obsolete: Vec<u64> = self
                    .anki
                    .deck_note_ids()
                    .await?
                    .into_iter()
                    .filter(|id| !touched.contains(id))
                    .collect();
                self.anki.delete_notes(&obsolete).await?;
                stats.deleted = obsolete.len();
            } else {
                log::warn!("Not removing obsolete notes because some pages or notes failed.");
            }
        }

        if let Err(e) = self.anki.trigger_sync().await {
            log::warn!("Failed to trigger Anki sync: {e}");
        }
        log::info!("Sync finished: {stats}");
        Ok(stats)
    }

    /// Sync once, or forever at the configured interval until interrupted.
    pub async fn run(&self, once: bool) -> Fallible<()> {
        let interval = if once {
            None
        } else {
            self.config.sync_interval()
        };
        loop {
            let outcome = self.sync_all().await;
            let Some(interval) = interval else {
                let stats = outcome?;
                if stats.failed_pages > 0 {
                    return fail(format!("{} pages failed to sync.", stats.failed_pages));
                }
                return Ok(());
            };
            if let Err(e) = outcome {
                log::error!("Sync failed: {e}");
            }
            let next = Local::now() + TimeDelta::seconds(interval.as_secs() as i64);
            log::info!("Next sync at {}", next.format("%Y-%m-%d %H:%M:%S"));
            tokio::select! {
                _ = sleep(interval) => {}
                _ = ctrl_c() => {
                    log::info!("Interrupted.");
                    return Ok(());
                }
            }
        }
    }
}

/// Unpack an export and extract the records of every document in it. A
/// document that can't be read is logged and skipped.
fn extract_archive(archive: &Path, destination: &Path, namespace: &str) -> Fallible<PageRecords> {
    let mut page_records = PageRecords::default();
    for document in unpack_archive(archive, destination)? {
        match extract_document(&document, namespace) {
            Ok(records) => {
                log::debug!("{} records in {}", records.len(), document.display());
                page_records.records.extend(records);
            }
            Err(e) => {
                log::error!("Failed to extract {}: {e}", document.display());
                page_records.failed_documents += 1;
            }
        }
    }
    Ok(page_records)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use axum::Json;
    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::routing::post;
    use serde_json::Value;
    use serde_json::json;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::helper::MockNote;
    use crate::helper::SharedAnki;
    use crate::helper::create_tmp_directory;
    use crate::helper::spawn_server;
    use crate::helper::start_mock_anki;

    const PAGE: &str = "5f1a2b3c4d5e6f708192a3b4c5d6e7f8";
    const PIXEL: &[u8] = b"\x89PNG not really";

    fn page_html() -> String {
        concat!(
            "<html><body>",
            "<article id=\"5f1a2b3c-4d5e-6f70-8192-a3b4c5d6e7f8\" class=\"page sans\">",
            "<div class=\"page-body\">",
            "<ul class=\"toggle\"><li><details open=\"\">",
            "<summary>#bio<strong>What is ATP?</strong></summary>",
            "<p>Energy currency</p><img src=\"pic.png\"/>",
            "</details></li></ul>",
            "<ul class=\"toggle\"><li><details open=\"\">",
            "<summary>Mitochondria make <code>ATP</code></summary>",
            "</details></li></ul>",
            "</div></article></body></html>"
        )
        .to_string()
    }

    fn export_archive() -> Fallible<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file(format!("Biology {PAGE}.html"), options)?;
        zip.write_all(page_html().as_bytes())?;
        zip.start_file("pic.png", options)?;
        zip.write_all(PIXEL)?;
        Ok(zip.finish()?.into_inner())
    }

    #[derive(Clone)]
    struct MockNotion {
        port: u16,
        status: StatusCode,
        archive: Arc<Vec<u8>>,
        enqueues: Arc<AtomicUsize>,
    }

    async fn enqueue(State(mock): State<MockNotion>) -> (StatusCode, Json<Value>) {
        mock.enqueues.fetch_add(1, Ordering::SeqCst);
        (mock.status, Json(json!({"taskId": "task-1"})))
    }

    async fn get_tasks(State(mock): State<MockNotion>) -> Json<Value> {
        Json(json!({
            "results": [{
                "id": "task-1",
                "state": "success",
                "status": {
                    "type": "complete",
                    "pagesExported": 1,
                    "exportURL": format!("http://127.0.0.1:{}/export.zip", mock.port)
                }
            }]
        }))
    }

    async fn download(State(mock): State<MockNotion>) -> Vec<u8> {
        mock.archive.to_vec()
    }

    async fn start_notion(status: StatusCode) -> Fallible<(Arc<AtomicUsize>, u16)> {
        let archive = Arc::new(export_archive()?);
        let enqueues = Arc::new(AtomicUsize::new(0));
        let counter = enqueues.clone();
        let port = spawn_server(move |port| {
            let mock = MockNotion {
                port,
                status,
                archive,
                enqueues: counter,
            };
            Router::new()
                .route("/api/v3/enqueueTask", post(enqueue))
                .route("/api/v3/getTasks", post(get_tasks))
                .route("/export.zip", get(download))
                .with_state(mock)
        })
        .await?;
        Ok((enqueues, port))
    }

    fn config(notion: u16, anki: u16, remove_obsolete: bool) -> Fallible<Config> {
        Config::parse(&format!(
            r#"
namespace = "someone"
sync_every_minutes = 0

[[pages]]
page_id = "{PAGE}"

[notion]
enqueue_endpoint = "http://127.0.0.1:{notion}/api/v3/enqueueTask"
get_tasks_endpoint = "http://127.0.0.1:{notion}/api/v3/getTasks"
enqueue_max_attempts = 3
retry_interval_ms = 10

[anki]
endpoint = "http://127.0.0.1:{anki}"
remove_obsolete = {remove_obsolete}
"#
        ))
    }

    async fn setup(
        status: StatusCode,
        remove_obsolete: bool,
    ) -> Fallible<(Syncer, SharedAnki, Arc<AtomicUsize>)> {
        let (enqueues, notion) = start_notion(status).await?;
        let (anki, anki_port) = start_mock_anki().await?;
        let syncer = Syncer::new(config(notion, anki_port, remove_obsolete)?, "secret")?;
        Ok((syncer, anki, enqueues))
    }

    fn seed_note(anki: &SharedAnki, deck: &str, front: &str) {
        let mut anki = anki.lock().unwrap();
        anki.next_id += 1;
        let id = anki.next_id;
        anki.notes.push(MockNote {
            id,
            deck: deck.to_string(),
            model: "notion-anki-sync".to_string(),
            fields: [("Front".to_string(), front.to_string())].into_iter().collect(),
            tags: Vec::new(),
        });
    }

    #[tokio::test]
    async fn test_sync_page() -> Fallible<()> {
        let (syncer, _, _) = setup(StatusCode::OK, false).await?;
        let page = PageSpec {
            page_id: PAGE.to_string(),
            recursive: false,
        };
        let page_records = syncer.sync_page(&page).await?;
        assert_eq!(page_records.failed_documents, 0);
        let records = page_records.records;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].front, "<strong>What is ATP?</strong>");
        assert_eq!(records[0].tags(), ["bio".to_string()]);
        assert_eq!(records[0].images().len(), 1);
        assert_eq!(records[0].images()[0].bytes, PIXEL);
        assert_eq!(
            records[0].source.as_deref(),
            Some("https://notion.so/someone/5f1a2b3c4d5e6f708192a3b4c5d6e7f8")
        );
        assert_eq!(records[1].front, "Mitochondria make {{c1::ATP}}");
        assert!(records[1].is_cloze());
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_all_creates_then_leaves_notes_alone() -> Fallible<()> {
        let (syncer, anki, _) = setup(StatusCode::OK, false).await?;
        let first = syncer.sync_all().await?;
        assert_eq!(
            first,
            SyncStats {
                processed: 2,
                created: 2,
                ..SyncStats::default()
            }
        );
        {
            let anki = anki.lock().unwrap();
            assert_eq!(anki.decks, vec!["Notion Sync".to_string()]);
            assert_eq!(anki.notes.len(), 2);
            assert_eq!(anki.notes[0].tags, vec!["bio".to_string()]);
            assert_eq!(anki.media.get("picpng_pic.png").map(Vec::as_slice), Some(PIXEL));
            assert_eq!(anki.actions.last().map(String::as_str), Some("sync"));
        }
        let second = syncer.sync_all().await?;
        assert_eq!(
            second,
            SyncStats {
                processed: 2,
                ..SyncStats::default()
            }
        );
        assert_eq!(anki.lock().unwrap().notes.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_obsolete() -> Fallible<()> {
        let (syncer, anki, _) = setup(StatusCode::OK, true).await?;
        seed_note(&anki, "Notion Sync", "Deleted from Notion");
        seed_note(&anki, "Other deck", "Not ours");
        let stats = syncer.sync_all().await?;
        assert_eq!(stats.deleted, 1);
        let anki = anki.lock().unwrap();
        let fronts: Vec<&str> = anki
            .notes
            .iter()
            .map(|note| note.fields["Front"].as_str())
            .collect();
        assert_eq!(
            fronts,
            vec![
                "Not ours",
                "<strong>What is ATP?</strong>",
                "Mitochondria make {{c1::ATP}}"
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_page_keeps_notes() -> Fallible<()> {
        let (syncer, anki, enqueues) = setup(StatusCode::UNAUTHORIZED, true).await?;
        seed_note(&anki, "Notion Sync", "Still here");
        let stats = syncer.sync_all().await?;
        assert_eq!(
            stats,
            SyncStats {
                failed_pages: 1,
                ..SyncStats::default()
            }
        );
        assert_eq!(enqueues.load(Ordering::SeqCst), 1);
        assert_eq!(anki.lock().unwrap().notes.len(), 1);
        assert!(syncer.run(true).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_once() -> Fallible<()> {
        let (syncer, anki, _) = setup(StatusCode::OK, false).await?;
        syncer.run(true).await?;
        assert_eq!(anki.lock().unwrap().notes.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_anki_unavailable() -> Fallible<()> {
        let (_, notion) = start_notion(StatusCode::OK).await?;
        let unused = portpicker::pick_unused_port().unwrap();
        let syncer = Syncer::new(config(notion, unused, false)?, "secret")?.with_anki_wait(
            RetryPolicy {
                max_attempts: 2,
                backoff: Duration::from_millis(10),
            },
        );
        let result = syncer.sync_all().await;
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_unreadable_document_is_skipped() -> Fallible<()> {
        let dir = create_tmp_directory()?;
        let archive = dir.join("export.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&archive)?);
        let options = SimpleFileOptions::default();
        zip.start_file(format!("Biology {PAGE}.html"), options)?;
        zip.write_all(page_html().as_bytes())?;
        zip.start_file("pic.png", options)?;
        zip.write_all(PIXEL)?;
        zip.start_file("Broken.html", options)?;
        zip.write_all(b"<p>no article here</p>")?;
        zip.finish()?;
        let page_records = extract_archive(&archive, &dir.join("export"), "someone")?;
        assert_eq!(page_records.records.len(), 2);
        assert_eq!(page_records.failed_documents, 1);
        Ok(())
    }
}
