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
use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use reqwest::header::HeaderValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::NotionSettings;
use crate::error::Fallible;
use crate::notion::export::ExportError;
use crate::notion::models::EnqueueRequest;
use crate::notion::models::EnqueueResponse;
use crate::notion::models::GetTasksRequest;
use crate::notion::models::GetTasksResponse;
use crate::notion::models::TaskProgress;

/// Why a single request failed.
#[derive(Debug, PartialEq)]
pub enum Fault {
    /// Worth retrying: a network error, a 5xx, an unreadable body.
    Transient(String),
    Fatal(ExportError),
}

impl Fault {
    pub fn is_transient(&self) -> bool {
        matches!(self, Fault::Transient(_))
    }

    /// The error to report once retrying stops on this fault. A transient
    /// fault only stops retrying when the budget is spent.
    pub fn into_error(self, exhausted: ExportError) -> ExportError {
        match self {
            Fault::Fatal(e) => e,
            Fault::Transient(_) => exhausted,
        }
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Fault::Transient(message) => write!(f, "{message}"),
            Fault::Fatal(e) => write!(f, "{e}"),
        }
    }
}

/// Client for Notion's private export API, authenticated with a `token_v2`
/// cookie.
pub struct NotionClient {
    http: Client,
    cookie: HeaderValue,
    settings: NotionSettings,
}

impl NotionClient {
    pub fn new(token: &str, settings: NotionSettings) -> Fallible<Self> {
        let mut cookie = HeaderValue::from_str(&format!("token_v2={token}"))
            .map_err(|_| ExportError::InvalidCredential)?;
        cookie.set_sensitive(true);
        let http = Client::builder()
            .connect_timeout(settings.request_timeout())
            .read_timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            http,
            cookie,
            settings,
        })
    }

    pub fn settings(&self) -> &NotionSettings {
        &self.settings
    }

    async fn post<B: Serialize, R: DeserializeOwned>(&self, url: &str, body: &B) -> Result<R, Fault> {
        let response = self
            .http
            .post(url)
            .header(COOKIE, self.cookie.clone())
            .timeout(self.settings.request_timeout())
            .json(body)
            .send()
            .await
            .map_err(|e| Fault::Transient(format!("request failed: {e}")))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Fault::Fatal(ExportError::InvalidCredential));
        }
        if status.is_server_error() {
            return Err(Fault::Transient(format!("server error: {status}")));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| Fault::Transient(format!("cannot decode response ({status}): {e}")))
    }

    /// Ask Notion to export a block. Returns the export task's id.
    pub async fn enqueue(&self, block_id: &str, recursive: bool) -> Result<String, Fault> {
        let request = EnqueueRequest::export_block(block_id, recursive);
        let response: EnqueueResponse = self.post(&self.settings.enqueue_endpoint, &request).await?;
        Ok(response.task_id)
    }

    pub async fn task_progress(&self, task_id: &str) -> Result<TaskProgress, Fault> {
        let request = GetTasksRequest {
            task_ids: vec![task_id.to_string()],
        };
        let response: GetTasksResponse =
            self.post(&self.settings.get_tasks_endpoint, &request).await?;
        Ok(response.progress(task_id))
    }

    /// Stream a finished export to `destination`, replacing whatever is
    /// there. Returns the number of bytes written.
    ///
    /// The URL is pre-signed, so the session cookie is not sent.
    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64, Fault> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Fault::Transient(format!("download failed: {e}")))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(Fault::Transient(format!("server error: {status}")));
        }
        if !status.is_success() {
            return Err(Fault::Fatal(ExportError::DownloadRejected {
                status: status.as_u16(),
            }));
        }
        let io_error = |e: std::io::Error| {
            Fault::Fatal(ExportError::Io {
                message: format!("{}: {e}", destination.display()),
            })
        };
        let mut file = File::create(destination).await.map_err(io_error)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Fault::Transient(format!("download interrupted: {e}")))?;
            file.write_all(&chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;
        Ok(written)
    }
}
