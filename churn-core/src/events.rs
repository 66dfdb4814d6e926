//! Churn event notifier.
//!
//! Reads inference results from object storage and posts one event per
//! account predicted to churn to a webhook.

use crate::context::PipelineContext;
use crate::error::ChurnError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const CHURN_EVENT_TYPE: &str = "churn_prediction";

/// One row of the inference output. Fields other than `user_id` and
/// `will_churn` are kept but ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub user_id: Value,
    pub will_churn: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InferenceResult {
    /// Only a numeric `1` counts; `"1"` or `true` do not.
    pub fn predicts_churn(&self) -> bool {
        self.will_churn.as_f64() == Some(1.0)
    }
}

/// Event posted to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChurnEvent {
    /// The user id; it is unique per results file.
    pub id: Value,
    pub timestamp: String,
    pub event_type: String,
    pub user_id: Value,
}

/// Build events for every churning result, all stamped with `timestamp`.
pub fn collect_churn_events(results: &[InferenceResult], timestamp: &str) -> Vec<ChurnEvent> {
    results
        .iter()
        .filter(|r| r.predicts_churn())
        .map(|r| ChurnEvent {
            id: r.user_id.clone(),
            timestamp: timestamp.to_string(),
            event_type: CHURN_EVENT_TYPE.to_string(),
            user_id: r.user_id.clone(),
        })
        .collect()
}

/// Load the configured results file.
pub async fn load_results(ctx: &PipelineContext) -> Result<Vec<InferenceResult>, ChurnError> {
    let events = &ctx.config().events;
    let data = ctx.store().get(&events.bucket, &events.results_key).await?;
    let results: Vec<InferenceResult> = serde_json::from_slice(&data)?;
    tracing::info!(
        bucket = %events.bucket,
        key = %events.results_key,
        results = results.len(),
        "Loaded inference results"
    );
    Ok(results)
}

/// Posts events to a webhook, one request at a time.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, ChurnError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post every event in order; the first failure aborts the rest.
    pub async fn send_all(&self, events: &[ChurnEvent]) -> Result<usize, ChurnError> {
        for event in events {
            let response = self.client.post(&self.url).json(event).send().await?;
            if !response.status().is_success() {
                return Err(ChurnError::Notify(format!(
                    "webhook returned status {} for user {}",
                    response.status(),
                    event.user_id
                )));
            }
            tracing::debug!(user_id = %event.user_id, "Posted churn event");
        }
        Ok(events.len())
    }
}

/// Load results, build events and post them. Returns the number sent.
pub async fn run_notify(ctx: &PipelineContext) -> Result<usize, ChurnError> {
    let url = ctx
        .config()
        .events
        .webhook_url
        .clone()
        .ok_or_else(|| ChurnError::config("events.webhook_url is not set"))?;
    let notifier = WebhookNotifier::new(url)?;

    let results = load_results(ctx).await?;
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let events = collect_churn_events(&results, &timestamp);
    let sent = notifier.send_all(&events).await?;
    tracing::info!(sent, url = %notifier.url(), "Churn events sent");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChurnConfig;
    use crate::storage::{InMemoryObjectStore, ObjectStore};
    use bytes::Bytes;
    use serde_json::json;
    use crate::test_support::webhook;
    use axum::http::StatusCode;
    use std::sync::Arc;

    fn results() -> Vec<InferenceResult> {
        serde_json::from_value(json!([
            {"user_id": "u1", "will_churn": 1, "score": 0.91},
            {"user_id": "u2", "will_churn": 0},
            {"user_id": "u3", "will_churn": 1.0},
            {"user_id": "u4", "will_churn": "1"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_extra_fields_preserved() {
        let r = &results()[0];
        assert_eq!(r.extra.get("score"), Some(&json!(0.91)));
    }

    #[test]
    fn test_collect_only_churning() {
        let events = collect_churn_events(&results(), "2024-06-22T00:00:00.000Z");
        let ids: Vec<_> = events.iter().map(|e| e.user_id.clone()).collect();
        assert_eq!(ids, vec![json!("u1"), json!("u3")]);
        assert!(events.iter().all(|e| e.event_type == "churn_prediction"));
        assert!(events.iter().all(|e| e.id == e.user_id));
        assert!(events.iter().all(|e| e.timestamp == "2024-06-22T00:00:00.000Z"));
    }

    async fn context(url: &str) -> PipelineContext {
        let store = InMemoryObjectStore::with_buckets(["churn-data"]);
        store
            .put(
                "churn-data",
                "inference/results.json",
                Bytes::from(serde_json::to_vec(&results()).unwrap()),
            )
            .await
            .unwrap();
        let mut config = ChurnConfig::default();
        config.events.webhook_url = Some(url.to_string());
        PipelineContext::with_store(config, Arc::new(store))
    }

    #[tokio::test]
    async fn test_run_notify_posts_each_event() {
        let (url, captured) = webhook(StatusCode::OK).await;
        let ctx = context(&url).await;
        assert_eq!(run_notify(&ctx).await.unwrap(), 2);

        let bodies = captured.lock().unwrap().clone();
        let posted: Vec<ChurnEvent> = bodies
            .into_iter()
            .map(|b| serde_json::from_value(b).unwrap())
            .collect();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].user_id, json!("u1"));
        assert_eq!(posted[1].user_id, json!("u3"));
        assert_eq!(posted[0].timestamp, posted[1].timestamp);
    }

    #[tokio::test]
    async fn test_failed_post_aborts() {
        let (url, captured) = webhook(StatusCode::INTERNAL_SERVER_ERROR).await;
        let ctx = context(&url).await;
        assert!(matches!(run_notify(&ctx).await, Err(ChurnError::Notify(_))));
        // The first rejection stops the run.
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_webhook_url_is_config_error() {
        let ctx = PipelineContext::with_store(
            ChurnConfig::default(),
            Arc::new(InMemoryObjectStore::new()),
        );
        assert!(matches!(run_notify(&ctx).await, Err(ChurnError::Config(_))));
    }

    #[tokio::test]
    async fn test_missing_results_is_storage_error() {
        let mut config = ChurnConfig::default();
        config.events.webhook_url = Some("http://127.0.0.1:9/".into());
        let ctx = PipelineContext::with_store(
            config,
            Arc::new(InMemoryObjectStore::with_buckets(["churn-data"])),
        );
        assert!(matches!(
            run_notify(&ctx).await,
            Err(ChurnError::StorageAccess(_))
        ));
    }
}
