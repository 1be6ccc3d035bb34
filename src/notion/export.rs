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

//! The export pipeline: enqueue an export task, poll it until Notion reports
//! a download URL, then download the archive. Each phase retries with its
//! own budget, so a fault in one phase never restarts an earlier one.

use std::fmt::Display;
use std::fmt::Formatter;
use std::path::Path;
use std::path::PathBuf;

use notion_anki_core::BlockId;

use crate::config::NotionSettings;
use crate::error::Fallible;
use crate::notion::client::Fault;
use crate::notion::client::NotionClient;
use crate::notion::models::TaskProgress;
use crate::notion::retry::RetryError;
use crate::notion::retry::Step;
use crate::notion::retry::Success;
use crate::notion::retry::retry;

#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    /// Notion rejected the token.
    InvalidCredential,
    EnqueueExhausted { attempts: u32 },
    PollTimeout { attempts: u32 },
    /// Notion reported that the export task failed.
    ServerReportedFailure { message: String },
    DownloadRejected { status: u16 },
    DownloadExhausted { attempts: u32 },
    Io { message: String },
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ExportError::InvalidCredential => write!(f, "invalid Notion token"),
            ExportError::EnqueueExhausted { attempts } => {
                write!(f, "could not enqueue export task after {attempts} attempts")
            }
            ExportError::PollTimeout { attempts } => {
                write!(f, "export not finished after {attempts} status checks")
            }
            ExportError::ServerReportedFailure { message } => {
                write!(f, "Notion reported an export failure: {message}")
            }
            ExportError::DownloadRejected { status } => {
                write!(f, "export download rejected with status {status}")
            }
            ExportError::DownloadExhausted { attempts } => {
                write!(f, "could not download export after {attempts} attempts")
            }
            ExportError::Io { message } => write!(f, "I/O error: {message}"),
        }
    }
}

impl std::error::Error for ExportError {}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Enqueuing,
    Polling { task_id: String },
    /// The export finished and can be downloaded.
    Ready { export_url: String },
    Failed,
}

/// Attempts used by each phase of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseAttempts {
    pub enqueue: u32,
    pub poll: u32,
    pub download: u32,
}

/// One export of one block.
#[derive(Debug)]
pub struct ExportJob {
    pub block_id: BlockId,
    pub recursive: bool,
    state: JobState,
    attempts_remaining: u32,
    attempts: PhaseAttempts,
}

impl ExportJob {
    pub fn new(block_id: BlockId, recursive: bool) -> Self {
        Self {
            block_id,
            recursive,
            state: JobState::Enqueuing,
            attempts_remaining: 0,
            attempts: PhaseAttempts::default(),
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Attempts left in the current phase's budget.
    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn attempts(&self) -> PhaseAttempts {
        self.attempts
    }

    fn enter(&mut self, state: JobState, budget: u32) {
        log::debug!(
            "Export of {}: {:?} ({budget} attempts)",
            self.block_id,
            state
        );
        self.state = state;
        self.attempts_remaining = budget;
    }

    fn attempts_used(&self, budget: u32) -> u32 {
        budget - self.attempts_remaining
    }

    fn spend(&mut self, used: u32) {
        self.attempts_remaining = self.attempts_remaining.saturating_sub(used);
    }

    fn fail(&mut self, error: ExportError) -> ExportError {
        log::debug!("Export of {} failed: {error}", self.block_id);
        self.state = JobState::Failed;
        self.attempts_remaining = 0;
        error
    }
}

pub struct ExportPoller {
    client: NotionClient,
}

impl ExportPoller {
    pub fn new(token: &str, settings: NotionSettings) -> Fallible<Self> {
        Ok(Self {
            client: NotionClient::new(token, settings)?,
        })
    }

    /// Export `block_id` and download the archive to `destination`.
    pub async fn export_document(
        &self,
        block_id: &BlockId,
        recursive: bool,
        destination: &Path,
    ) -> Result<PathBuf, ExportError> {
        let mut job = ExportJob::new(block_id.clone(), recursive);
        self.run(&mut job, destination).await
    }

    /// Drive a job through every phase.
    pub async fn run(&self, job: &mut ExportJob, destination: &Path) -> Result<PathBuf, ExportError> {
        let export_url = self.export_url(job).await?;
        self.download(job, &export_url, destination).await
    }

    /// Enqueue and poll until Notion hands out a download URL.
    pub async fn export_url(&self, job: &mut ExportJob) -> Result<String, ExportError> {
        let task_id = self.enqueue(job).await?;
        log::info!(
            "Export task posted: page_id={}, recursive={}, task_id={task_id}",
            job.block_id,
            job.recursive
        );
        self.poll(job, task_id).await
    }

    async fn enqueue(&self, job: &mut ExportJob) -> Result<String, ExportError> {
        let policy = self.client.settings().enqueue_policy();
        job.enter(JobState::Enqueuing, policy.max_attempts);
        let client = &self.client;
        let block_id = job.block_id.as_str();
        let recursive = job.recursive;
        let outcome = retry(policy, "enqueue", Fault::is_transient, move |_| async move {
            client.enqueue(block_id, recursive).await.map(Step::Ready)
        })
        .await;
        let exhausted = ExportError::EnqueueExhausted {
            attempts: policy.max_attempts,
        };
        let task_id = settle(job, outcome, exhausted)?;
        job.attempts.enqueue = job.attempts_used(policy.max_attempts);
        Ok(task_id)
    }

    async fn poll(&self, job: &mut ExportJob, task_id: String) -> Result<String, ExportError> {
        let policy = self.client.settings().poll_policy();
        job.enter(
            JobState::Polling {
                task_id: task_id.clone(),
            },
            policy.max_attempts,
        );
        let client = &self.client;
        let task_id = task_id.as_str();
        let outcome = retry(policy, "poll", Fault::is_transient, move |attempt| async move {
            match client.task_progress(task_id).await? {
                TaskProgress::Complete { export_url } => Ok(Step::Ready(export_url)),
                TaskProgress::InProgress { pages_exported } => {
                    log::debug!(
                        "Task {task_id} in progress: {} pages exported (check {attempt})",
                        pages_exported.map_or("?".to_string(), |n| n.to_string())
                    );
                    Ok(Step::Pending)
                }
                TaskProgress::Failed { message } => {
                    Err(Fault::Fatal(ExportError::ServerReportedFailure { message }))
                }
            }
        })
        .await;
        let exhausted = ExportError::PollTimeout {
            attempts: policy.max_attempts,
        };
        let export_url = settle(job, outcome, exhausted)?;
        job.attempts.poll = job.attempts_used(policy.max_attempts);
        log::info!("Export of {} complete, downloading", job.block_id);
        Ok(export_url)
    }

    async fn download(
        &self,
        job: &mut ExportJob,
        export_url: &str,
        destination: &Path,
    ) -> Result<PathBuf, ExportError> {
        let policy = self.client.settings().download_policy();
        job.enter(
            JobState::Ready {
                export_url: export_url.to_string(),
            },
            policy.max_attempts,
        );
        let client = &self.client;
        let outcome = retry(policy, "download", Fault::is_transient, move |_| async move {
            client.download(export_url, destination).await.map(Step::Ready)
        })
        .await;
        let exhausted = ExportError::DownloadExhausted {
            attempts: policy.max_attempts,
        };
        let bytes = settle(job, outcome, exhausted)?;
        job.attempts.download = job.attempts_used(policy.max_attempts);
        log::info!(
            "Downloaded export of {} ({bytes} bytes) to {}",
            job.block_id,
            destination.display()
        );
        log::debug!("Attempts used: {:?}", job.attempts());
        Ok(destination.to_path_buf())
    }
}

/// Fold a phase's retry outcome into the job.
fn settle<T>(
    job: &mut ExportJob,
    outcome: Result<Success<T>, RetryError<Fault>>,
    exhausted: ExportError,
) -> Result<T, ExportError> {
    match outcome {
        Ok(Success { value, attempts }) => {
            job.spend(attempts);
            Ok(value)
        }
        Err(RetryError::Exhausted { .. }) => Err(job.fail(exhausted)),
        Err(RetryError::Fatal(fault)) => Err(job.fail(fault.into_error(exhausted))),
    }
}
