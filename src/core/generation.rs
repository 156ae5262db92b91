//! Client for the remote text-to-image task API.
//!
//! A generation is a two-step protocol: create a task, then poll it until it
//! reaches a terminal status. Polling tolerates short streaks of 5xx
//! responses; anything else that is not a success ends the attempt.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::core::http::{build_client, error_body, is_auth_failure};
use crate::core::models::{Credential, GenerationTask, TaskStatus};
use crate::error::{RelayError, Result};

/// Default API base for the generation service.
pub const DEFAULT_API_BASE: &str = "https://labs.openai.com/api/labs";

/// Images requested per task.
pub const DEFAULT_BATCH_SIZE: u32 = 4;

/// Tunables for [`GenerationClient`].
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// API base URL without trailing slash.
    pub api_base: String,
    pub batch_size: u32,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Upper bound on status polls for one task.
    pub max_poll_attempts: u32,
    /// A streak longer than this fails with `ServerUnavailable`.
    pub max_consecutive_server_errors: u32,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 600,
            max_consecutive_server_errors: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Anything that can turn a prompt into result image URLs.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Submit `prompt` with `credential` and wait for the result URLs.
    async fn submit(&self, prompt: &str, credential: &Credential) -> Result<Vec<String>>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct CreateTaskRequest<'a> {
    task_type: &'static str,
    prompt: TaskPrompt<'a>,
}

#[derive(Debug, Serialize)]
struct TaskPrompt<'a> {
    caption: &'a str,
    batch_size: u32,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    generations: Option<Generations>,
}

#[derive(Debug, Deserialize)]
struct Generations {
    #[serde(default)]
    data: Vec<GenerationItem>,
}

#[derive(Debug, Deserialize)]
struct GenerationItem {
    generation: GenerationPayload,
}

#[derive(Debug, Deserialize)]
struct GenerationPayload {
    image_path: String,
}

impl TaskResponse {
    fn into_task(self, fallback_id: &str) -> GenerationTask {
        let status = self
            .status
            .as_deref()
            .map_or(TaskStatus::Pending, TaskStatus::from_api);
        let result_urls = self
            .generations
            .map(|g| {
                g.data
                    .into_iter()
                    .map(|item| item.generation.image_path)
                    .collect()
            })
            .unwrap_or_default();
        GenerationTask {
            id: self.id.unwrap_or_else(|| fallback_id.to_string()),
            status,
            result_urls,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// HTTP implementation of [`GenerationBackend`].
pub struct GenerationClient {
    http: Client,
    settings: GenerationSettings,
}

impl GenerationClient {
    /// Build a client with its own HTTP connection pool.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: GenerationSettings) -> Result<Self> {
        let http = build_client(settings.request_timeout)?;
        Ok(Self::with_client(http, settings))
    }

    /// Build a client around an existing HTTP client.
    #[must_use]
    pub fn with_client(http: Client, mut settings: GenerationSettings) -> Self {
        settings.api_base = settings.api_base.trim_end_matches('/').to_string();
        Self { http, settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn tasks_endpoint(&self) -> String {
        format!("{}/tasks", self.settings.api_base)
    }

    fn timeout_secs(&self) -> u64 {
        self.settings.request_timeout.as_secs()
    }

    /// Create the remote task and return its id.
    async fn create_task(&self, prompt: &str, credential: &Credential) -> Result<String> {
        let body = CreateTaskRequest {
            task_type: "text2im",
            prompt: TaskPrompt {
                caption: prompt,
                batch_size: self.settings.batch_size,
            },
        };

        let response = self
            .http
            .post(self.tasks_endpoint())
            .bearer_auth(&credential.token)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::from_transport(&e, self.timeout_secs()))?;

        let status = response.status();
        if is_auth_failure(status) {
            return Err(RelayError::Auth {
                status: status.as_u16(),
            });
        }
        if status.is_server_error() {
            return Err(RelayError::ServerUnavailable {
                consecutive: 1,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(RelayError::Request {
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let task: TaskResponse = response
            .json()
            .await
            .map_err(|e| RelayError::ParseResponse(e.to_string()))?;
        task.id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| RelayError::ParseResponse("task creation returned no id".to_string()))
    }

    /// Poll until the task succeeds, fails, or the error/attempt budget runs out.
    async fn poll_task(&self, task_id: &str, credential: &Credential) -> Result<GenerationTask> {
        let url = format!("{}/{task_id}", self.tasks_endpoint());
        let mut consecutive_server_errors = 0u32;

        for attempt in 1..=self.settings.max_poll_attempts {
            tracing::debug!(task_id, attempt, "Polling task");
            let response = self
                .http
                .get(&url)
                .bearer_auth(&credential.token)
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| RelayError::from_transport(&e, self.timeout_secs()))?;

            let status = response.status();
            if status.is_server_error() {
                consecutive_server_errors += 1;
                tracing::warn!(
                    task_id,
                    status = status.as_u16(),
                    consecutive = consecutive_server_errors,
                    "Server error while polling"
                );
                if consecutive_server_errors > self.settings.max_consecutive_server_errors {
                    return Err(RelayError::ServerUnavailable {
                        consecutive: consecutive_server_errors,
                        status: status.as_u16(),
                    });
                }
            } else if !status.is_success() {
                return Err(RelayError::Request {
                    status: status.as_u16(),
                    message: error_body(response).await,
                });
            } else {
                consecutive_server_errors = 0;
                let body: TaskResponse = response
                    .json()
                    .await
                    .map_err(|e| RelayError::ParseResponse(e.to_string()))?;
                let task = body.into_task(task_id);
                match task.status {
                    TaskStatus::Succeeded => return Ok(task),
                    TaskStatus::Failed => {
                        return Err(RelayError::TaskFailed {
                            task_id: task.id,
                            status: "failed".to_string(),
                        });
                    }
                    TaskStatus::Pending => {}
                }
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }

        Err(RelayError::PollTimeout {
            task_id: task_id.to_string(),
            attempts: self.settings.max_poll_attempts,
        })
    }
}

#[async_trait]
impl GenerationBackend for GenerationClient {
    async fn submit(&self, prompt: &str, credential: &Credential) -> Result<Vec<String>> {
        let task_id = self.create_task(prompt, credential).await?;
        tracing::info!(task_id = %task_id, "Created generation task");

        let task = self.poll_task(&task_id, credential).await?;
        if task.result_urls.is_empty() {
            return Err(RelayError::ParseResponse(format!(
                "task {} succeeded without images",
                task.id
            )));
        }
        tracing::info!(
            task_id = %task.id,
            images = task.result_urls.len(),
            "Generation task succeeded"
        );
        Ok(task.result_urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_shape() {
        let body = CreateTaskRequest {
            task_type: "text2im",
            prompt: TaskPrompt {
                caption: "a red fox",
                batch_size: 4,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["task_type"], "text2im");
        assert_eq!(json["prompt"]["caption"], "a red fox");
        assert_eq!(json["prompt"]["batch_size"], 4);
    }

    #[test]
    fn task_response_extracts_urls_in_order() {
        let raw = serde_json::json!({
            "id": "task-1",
            "status": "succeeded",
            "generations": {"data": [
                {"generation": {"image_path": "https://img/1"}},
                {"generation": {"image_path": "https://img/2"}},
            ]}
        });
        let task = serde_json::from_value::<TaskResponse>(raw)
            .unwrap()
            .into_task("fallback");
        assert_eq!(task.id, "task-1");
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert_eq!(task.result_urls, vec!["https://img/1", "https://img/2"]);
    }

    #[test]
    fn pending_response_without_generations() {
        let raw = serde_json::json!({"status": "pending"});
        let task = serde_json::from_value::<TaskResponse>(raw)
            .unwrap()
            .into_task("task-9");
        assert_eq!(task.id, "task-9");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result_urls.is_empty());
    }

    #[test]
    fn api_base_is_normalized() {
        let client = GenerationClient::with_client(
            Client::new(),
            GenerationSettings {
                api_base: "http://localhost:9/api/".to_string(),
                ..GenerationSettings::default()
            },
        );
        assert_eq!(client.tasks_endpoint(), "http://localhost:9/api/tasks");
    }
}
