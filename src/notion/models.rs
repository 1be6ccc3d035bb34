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

//! Payloads of Notion's private export API.

use serde::Deserialize;
use serde::Serialize;

/// Notion renders timestamps in exported pages in this zone.
pub const EXPORT_TIME_ZONE: &str = "Europe/Moscow";
pub const EXPORT_LOCALE: &str = "en";
pub const EXPORT_TYPE: &str = "html";
pub const EXPORT_EVENT: &str = "exportBlock";

#[derive(Serialize, Debug, PartialEq)]
pub struct EnqueueRequest {
    pub task: ExportTask,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportTask {
    pub event_name: String,
    pub request: ExportRequest,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub block_id: String,
    pub recursive: bool,
    pub export_options: ExportOptions,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub export_type: String,
    pub time_zone: String,
    pub locale: String,
}

impl EnqueueRequest {
    pub fn export_block(block_id: &str, recursive: bool) -> Self {
        EnqueueRequest {
            task: ExportTask {
                event_name: EXPORT_EVENT.to_string(),
                request: ExportRequest {
                    block_id: block_id.to_string(),
                    recursive,
                    export_options: ExportOptions {
                        export_type: EXPORT_TYPE.to_string(),
                        time_zone: EXPORT_TIME_ZONE.to_string(),
                        locale: EXPORT_LOCALE.to_string(),
                    },
                },
            },
        }
    }
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub task_id: String,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GetTasksRequest {
    pub task_ids: Vec<String>,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct GetTasksResponse {
    #[serde(default)]
    pub results: Vec<TaskResult>,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct TaskResult {
    pub id: Option<String>,
    /// `in_progress`, `success` or `failure`.
    pub state: Option<String>,
    pub error: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// `progress` or `complete`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub pages_exported: Option<u64>,
    #[serde(rename = "exportURL")]
    pub export_url: Option<String>,
}

/// How far along a task is, as far as the poller cares.
#[derive(Debug, PartialEq)]
pub enum TaskProgress {
    InProgress { pages_exported: Option<u64> },
    Complete { export_url: String },
    Failed { message: String },
}

impl GetTasksResponse {
    /// Interpret the response for the given task. Missing results count as
    /// in progress.
    pub fn progress(&self, task_id: &str) -> TaskProgress {
        let result = self
            .results
            .iter()
            .find(|result| result.id.as_deref() == Some(task_id))
            .or(self.results.first());
        let Some(result) = result else {
            return TaskProgress::InProgress {
                pages_exported: None,
            };
        };
        if let Some(error) = &result.error {
            return TaskProgress::Failed {
                message: error.clone(),
            };
        }
        if result.state.as_deref() == Some("failure") {
            return TaskProgress::Failed {
                message: "export task failed".to_string(),
            };
        }
        match &result.status {
            Some(status) if status.kind.as_deref() == Some("complete") => {
                match &status.export_url {
                    Some(url) => TaskProgress::Complete {
                        export_url: url.clone(),
                    },
                    None => TaskProgress::Failed {
                        message: "export completed without a download URL".to_string(),
                    },
                }
            }
            Some(status) => TaskProgress::InProgress {
                pages_exported: status.pages_exported,
            },
            None => TaskProgress::InProgress {
                pages_exported: None,
            },
        }
    }
}
