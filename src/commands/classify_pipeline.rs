use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::services::llm_service::ClassificationClient;
use crate::services::prompt_service::{build_batch_prompt, chunk_files};
use crate::services::response_parser::parse_classification_response;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub request_timeout: Duration,
}

/// Everything one classification run needs, frozen at start.
#[derive(Debug, Clone)]
pub struct ClassificationPlan {
    pub files: Vec<String>,
    pub categories: Vec<String>,
    pub descriptions: String,
    pub batch_size: usize,
    pub fallback_index: usize,
    pub retry: RetryPolicy,
}

impl ClassificationPlan {
    pub fn new(config: &AppConfig, files: Vec<String>, categories: Vec<String>) -> Self {
        Self {
            files,
            categories,
            descriptions: config.category_descriptions.clone(),
            batch_size: config.settings.batch_size,
            fallback_index: config.fallback_index(),
            retry: RetryPolicy {
                max_retries: config.settings.max_retries,
                request_timeout: config.request_timeout(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BatchEvent<'a> {
    Started {
        batch: usize,
        total_batches: usize,
        size: usize,
    },
    Finished {
        batch: usize,
        total_batches: usize,
        processed: usize,
        total_files: usize,
        indices: &'a [usize],
        /// Some or all of the batch fell back to the fallback category.
        degraded: bool,
    },
}

// ---------------------------------------------------------------------------
// Batch loop
// ---------------------------------------------------------------------------

/// Classifies every file in `plan`, one batch at a time.
///
/// Always returns exactly one in-range category index per file. A batch whose
/// request fails after retries is filed entirely under the fallback category,
/// and a reply that covers only part of a batch is padded with it.
pub async fn run_classification<F>(
    client: &dyn ClassificationClient,
    plan: &ClassificationPlan,
    mut on_event: F,
) -> Vec<usize>
where
    F: FnMut(BatchEvent<'_>),
{
    let batches = chunk_files(&plan.files, plan.batch_size);
    let total_batches = batches.len();
    let total_files = plan.files.len();
    let mut classifications = Vec::with_capacity(total_files);

    for (idx, batch) in batches.into_iter().enumerate() {
        let batch_number = idx + 1;
        on_event(BatchEvent::Started {
            batch: batch_number,
            total_batches,
            size: batch.len(),
        });

        let prompt = build_batch_prompt(batch, &plan.categories, &plan.descriptions);
        let parsed = match request_with_retry(client, &prompt, &plan.retry).await {
            Ok(reply) => parse_classification_response(&reply, batch.len(), plan.categories.len()),
            Err(err) => {
                warn!(
                    batch = batch_number,
                    error = %err,
                    "batch failed, assigning the fallback category"
                );
                Vec::new()
            }
        };

        let degraded = parsed.len() < batch.len();
        let mut indices = parsed;
        indices.truncate(batch.len());
        indices.resize(batch.len(), plan.fallback_index);
        classifications.extend_from_slice(&indices);

        info!(
            batch = batch_number,
            total_batches,
            processed = classifications.len(),
            degraded,
            "batch classified"
        );
        on_event(BatchEvent::Finished {
            batch: batch_number,
            total_batches,
            processed: classifications.len(),
            total_files,
            indices: &indices,
            degraded,
        });
    }

    classifications
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

async fn request_with_retry(
    client: &dyn ClassificationClient,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String, AppError> {
    let attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.request_timeout, client.classify(prompt)).await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(policy.request_timeout)),
        };

        match result {
            Ok(reply) => return Ok(reply),
            Err(err) if attempt < attempts && err.is_retryable() => {
                let delay = retry_backoff_duration(attempt);
                warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying batch");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn retry_backoff_duration(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5);
    let base = 250u64
        .saturating_mul(2u64.saturating_pow(exponent))
        .min(5_000);
    let jitter = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::from(d.subsec_nanos()) % 250)
        .unwrap_or(0);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every `[i] name` line with category 1, stalls on batches naming `stall_on`.
    struct ScriptedClient {
        stall_on: Option<&'static str>,
        fail_first: usize,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new() -> Self {
            Self {
                stall_on: None,
                fail_first: 0,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClassificationClient for ScriptedClient {
        async fn classify(&self, prompt: &str) -> Result<String, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(AppError::Transport {
                    status: Some(503),
                    message: "busy".to_string(),
                });
            }
            if self.stall_on.is_some_and(|name| prompt.contains(name)) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let lines = prompt
                .lines()
                .filter_map(|line| line.strip_prefix('['))
                .filter_map(|rest| rest.split_once(']'))
                .map(|(n, _)| format!("{n}:1"))
                .collect::<Vec<_>>();
            Ok(lines.join("\n"))
        }
    }

    fn plan(count: usize) -> ClassificationPlan {
        ClassificationPlan {
            files: (1..=count).map(|i| format!("file_{i:03}.txt")).collect(),
            categories: vec!["math".into(), "history".into(), "other".into()],
            descriptions: String::new(),
            batch_size: 30,
            fallback_index: 2,
            retry: RetryPolicy {
                max_retries: 1,
                request_timeout: Duration::from_secs(30),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_middle_batch_falls_back_and_run_completes() {
        let client = ScriptedClient {
            stall_on: Some("file_031.txt"),
            ..ScriptedClient::new()
        };
        let plan = plan(65);
        let mut progress = Vec::new();

        let result = run_classification(&client, &plan, |event| {
            if let BatchEvent::Finished {
                processed,
                total_files,
                ..
            } = event
            {
                progress.push(processed * 100 / total_files);
            }
        })
        .await;

        assert_eq!(result.len(), 65);
        assert!(result[..30].iter().all(|&c| c == 0));
        assert!(result[30..60].iter().all(|&c| c == 2));
        assert!(result[60..].iter().all(|&c| c == 0));
        assert_eq!(progress, vec![46, 92, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let client = ScriptedClient {
            fail_first: 1,
            ..ScriptedClient::new()
        };

        let result = run_classification(&client, &plan(3), |_| {}).await;

        assert_eq!(result, vec![0, 0, 0]);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_use_fallback() {
        let client = ScriptedClient {
            fail_first: 10,
            ..ScriptedClient::new()
        };

        let result = run_classification(&client, &plan(4), |_| {}).await;

        assert_eq!(result, vec![2, 2, 2, 2]);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let client = ScriptedClient::new();
        let result = run_classification(&client, &plan(0), |_| {}).await;
        assert!(result.is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let first = retry_backoff_duration(1);
        assert!(first >= Duration::from_millis(250) && first < Duration::from_millis(500));
        let late = retry_backoff_duration(10);
        assert!(late >= Duration::from_millis(5_000) && late < Duration::from_millis(5_250));
    }
}
