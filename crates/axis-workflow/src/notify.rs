//! Status notifications to Slack and Google Chat webhooks

use anyhow::{Context, Result};
use axis_core::StatusReport;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::NotifyConfig;

/// Slack message with one block per section
pub fn slack_message(report: &StatusReport) -> Value {
    let mut blocks = vec![
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("{}\n{}", report.title(), report.subtitle()),
            }
        }),
        json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("```\n{}\n```", report.resource_text()),
            }
        }),
    ];

    if let Some(error) = report.error() {
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": error }
        }));
    }

    json!({
        "icon_emoji": ":robot_face:",
        "username": "Provisioning Bot",
        "blocks": blocks,
    })
}

/// Google Chat card with the error, if any, as its own section
pub fn google_message(report: &StatusReport) -> Value {
    let mut sections = vec![json!({
        "widgets": [{ "textParagraph": { "text": report.resource_text() } }]
    })];

    if let Some(error) = report.error() {
        sections.push(json!({
            "widgets": [{ "textParagraph": { "text": error } }]
        }));
    }

    json!({
        "cardsV2": [{
            "cardId": "card_one",
            "card": {
                "header": {
                    "title": report.title(),
                    "subtitle": report.subtitle(),
                },
                "sections": sections,
            }
        }]
    })
}

pub struct Notifier {
    client: reqwest::Client,
    settings: NotifyConfig,
}

impl Notifier {
    pub fn new(settings: NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, settings })
    }

    /// Post the report to every configured webhook. Failures are logged only.
    pub async fn send(&self, report: &StatusReport) {
        match &self.settings.slack_webhook {
            Some(url) => self.post("slack", url, &slack_message(report)).await,
            None => info!("No Slack webhook configured, skipping"),
        }
        match &self.settings.google_webhook {
            Some(url) => self.post("google", url, &google_message(report)).await,
            None => info!("No Google Chat webhook configured, skipping"),
        }
    }

    async fn post(&self, target: &str, url: &str, message: &Value) {
        let result = self
            .client
            .post(url)
            .header("Content-Type", "application/json; charset=UTF-8")
            .json(message)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(target_name = target, "Sent workflow notification");
            }
            Ok(response) => {
                warn!(target_name = target, status = %response.status(), "Notification webhook rejected message");
            }
            Err(e) => {
                warn!(target_name = target, error = %e, "Failed to send notification");
            }
        }
    }
}
