//! Operational alarm notifier.
//!
//! Turns a CloudWatch alarm state-change event into a Slack Block Kit message
//! and posts it to an incoming webhook.

use crate::config::AlarmsConfig;
use crate::error::ChurnError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Alarm state as reported by CloudWatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateValue {
    Ok,
    Alarm,
    InsufficientData,
}

impl StateValue {
    /// Slack emoji shown in the message header.
    pub fn emoji(self) -> &'static str {
        match self {
            Self::Alarm => ":bangbang:",
            Self::Ok => ":white_check_mark:",
            Self::InsufficientData => ":warning:",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Alarm => "ALARM",
            Self::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmState {
    pub value: StateValue,
    pub reason: String,
    #[serde(default)]
    pub reason_data: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfiguration {
    #[serde(default)]
    pub description: String,
    /// Metric queries, kept verbatim.
    #[serde(default)]
    pub metrics: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmData {
    pub alarm_name: String,
    pub state: AlarmState,
    pub previous_state: AlarmState,
    pub configuration: AlarmConfiguration,
}

/// CloudWatch alarm state-change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmNotification {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub alarm_arn: String,
    #[serde(default)]
    pub time: String,
    pub region: String,
    #[serde(default)]
    pub source: String,
    pub alarm_data: AlarmData,
}

impl AlarmNotification {
    pub fn from_json(data: &[u8]) -> Result<Self, ChurnError> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Read an event from a JSON file.
    pub async fn from_file(path: &Path) -> Result<Self, ChurnError> {
        let data = tokio::fs::read(path).await?;
        Self::from_json(&data)
    }

    /// Console page of the alarm in its region.
    pub fn console_url(&self) -> String {
        format!(
            "https://{region}.console.aws.amazon.com/cloudwatch/home?region={region}#alarmsV2:alarm/{name}",
            region = self.region,
            name = self.alarm_data.alarm_name
        )
    }

    /// Slack Block Kit payload for this event.
    ///
    /// Header with the state emoji and alarm name, the alarm description with
    /// a link to the console, the state reason, then the state transition and
    /// the environment.
    pub fn to_block_kit(&self, environment: &str) -> Value {
        let data = &self.alarm_data;
        json!({
            "blocks": [
                {
                    "type": "header",
                    "text": {
                        "type": "plain_text",
                        "text": format!("{} {}", data.state.value.emoji(), data.alarm_name),
                        "emoji": true
                    }
                },
                { "type": "divider" },
                {
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": data.configuration.description },
                    "accessory": {
                        "type": "button",
                        "text": { "type": "plain_text", "text": "See More", "emoji": true },
                        "value": "see-more-call-to-action",
                        "url": self.console_url(),
                        "action_id": "see-more-action"
                    }
                },
                {
                    "type": "context",
                    "elements": [
                        { "type": "plain_text", "text": data.state.reason, "emoji": true }
                    ]
                },
                { "type": "divider" },
                {
                    "type": "context",
                    "elements": [
                        {
                            "type": "plain_text",
                            "text": format!(
                                "{} -> {} at {}",
                                data.previous_state.value, data.state.value, data.state.timestamp
                            ),
                            "emoji": true
                        },
                        {
                            "type": "plain_text",
                            "text": format!("Environment: {environment}"),
                            "emoji": true
                        }
                    ]
                }
            ]
        })
    }
}

/// Posts alarm messages to a Slack incoming webhook.
#[derive(Debug, Clone)]
pub struct AlarmNotifier {
    client: reqwest::Client,
    url: String,
    environment: String,
}

impl AlarmNotifier {
    pub fn new(url: impl Into<String>, environment: impl Into<String>) -> Result<Self, ChurnError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            environment: environment.into(),
        })
    }

    pub fn from_config(config: &AlarmsConfig) -> Result<Self, ChurnError> {
        let url = config
            .webhook_url
            .clone()
            .ok_or_else(|| ChurnError::config("alarms.webhook_url is not set"))?;
        Self::new(url, config.environment.clone())
    }

    pub async fn send(&self, alarm: &AlarmNotification) -> Result<(), ChurnError> {
        let payload = alarm.to_block_kit(&self.environment);
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(ChurnError::Notify(format!(
                "Slack webhook returned status {} for alarm {}",
                response.status(),
                alarm.alarm_data.alarm_name
            )));
        }
        tracing::info!(
            alarm = %alarm.alarm_data.alarm_name,
            state = %alarm.alarm_data.state.value,
            "Alarm notification sent"
        );
        Ok(())
    }
}

/// Read the event at `path` and post it.
pub async fn run_alarm(config: &AlarmsConfig, path: &Path) -> Result<AlarmNotification, ChurnError> {
    let notifier = AlarmNotifier::from_config(config)?;
    let alarm = AlarmNotification::from_file(path).await?;
    tracing::info!(alarm = %alarm.alarm_data.alarm_name, "Received alarm event");
    notifier.send(&alarm).await?;
    Ok(alarm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::webhook;
    use axum::http::StatusCode;

    fn event(state: &str) -> Value {
        json!({
            "accountId": "123456789012",
            "alarmArn": "arn:aws:cloudwatch:eu-west-1:123456789012:alarm:churn-endpoint-errors",
            "time": "2024-06-22T10:00:00Z",
            "region": "eu-west-1",
            "source": "aws.cloudwatch",
            "alarmData": {
                "alarmName": "churn-endpoint-errors",
                "state": {
                    "value": state,
                    "reason": "Threshold Crossed: 1 datapoint [5.0] was greater than the threshold (1.0).",
                    "reasonData": "{}",
                    "timestamp": "2024-06-22T10:00:00.000+0000"
                },
                "previousState": {
                    "value": "OK",
                    "reason": "ok",
                    "timestamp": "2024-06-22T09:00:00.000+0000"
                },
                "configuration": {
                    "description": "Inference endpoint 5xx errors",
                    "metrics": [{"id": "m1", "returnData": true}]
                }
            }
        })
    }

    fn alarm(state: &str) -> AlarmNotification {
        AlarmNotification::from_json(&serde_json::to_vec(&event(state)).unwrap()).unwrap()
    }

    #[test]
    fn test_parses_event() {
        let a = alarm("ALARM");
        assert_eq!(a.alarm_data.state.value, StateValue::Alarm);
        assert_eq!(a.alarm_data.previous_state.value, StateValue::Ok);
        assert_eq!(a.alarm_data.previous_state.reason_data, "");
        assert_eq!(a.alarm_data.configuration.metrics.len(), 1);
    }

    #[test]
    fn test_emoji_per_state() {
        assert_eq!(StateValue::Alarm.emoji(), ":bangbang:");
        assert_eq!(StateValue::Ok.emoji(), ":white_check_mark:");
        assert_eq!(alarm("INSUFFICIENT_DATA").alarm_data.state.value.emoji(), ":warning:");
    }

    #[test]
    fn test_block_kit_layout() {
        let payload = alarm("ALARM").to_block_kit("prod");
        let blocks = payload["blocks"].as_array().unwrap();
        let types: Vec<&str> = blocks.iter().map(|b| b["type"].as_str().unwrap()).collect();
        assert_eq!(
            types,
            vec!["header", "divider", "section", "context", "divider", "context"]
        );
        assert_eq!(blocks[0]["text"]["text"], ":bangbang: churn-endpoint-errors");
        assert_eq!(blocks[2]["text"]["text"], "Inference endpoint 5xx errors");
        assert_eq!(
            blocks[2]["accessory"]["url"],
            "https://eu-west-1.console.aws.amazon.com/cloudwatch/home?region=eu-west-1#alarmsV2:alarm/churn-endpoint-errors"
        );
        assert!(
            blocks[3]["elements"][0]["text"]
                .as_str()
                .unwrap()
                .starts_with("Threshold Crossed")
        );
        assert_eq!(
            blocks[5]["elements"][0]["text"],
            "OK -> ALARM at 2024-06-22T10:00:00.000+0000"
        );
        assert_eq!(blocks[5]["elements"][1]["text"], "Environment: prod");
    }

    #[test]
    fn test_missing_webhook_is_config_error() {
        assert!(matches!(
            AlarmNotifier::from_config(&AlarmsConfig::default()),
            Err(ChurnError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_run_alarm_posts_block_kit() {
        let (url, captured) = webhook(StatusCode::OK).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, serde_json::to_vec(&event("OK")).unwrap()).unwrap();
        let config = AlarmsConfig {
            webhook_url: Some(url),
            environment: "staging".into(),
        };

        let sent = run_alarm(&config, &path).await.unwrap();
        assert_eq!(sent.alarm_data.state.value, StateValue::Ok);

        let bodies = captured.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0], sent.to_block_kit("staging"));
        assert_eq!(
            bodies[0]["blocks"][0]["text"]["text"],
            ":white_check_mark: churn-endpoint-errors"
        );
    }

    #[tokio::test]
    async fn test_rejected_post_is_notify_error() {
        let (url, _captured) = webhook(StatusCode::FORBIDDEN).await;
        let notifier = AlarmNotifier::new(url, "dev").unwrap();
        assert!(matches!(
            notifier.send(&alarm("ALARM")).await,
            Err(ChurnError::Notify(_))
        ));
    }
}
