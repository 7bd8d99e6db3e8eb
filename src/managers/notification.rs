//! Run summaries pushed to Discord, Slack-compatible webhooks and ntfy
//!
//! Every sink is fire-and-forget: a failing sink is logged and never changes
//! the outcome of the run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::report::{format_duration, RunReport, RunStatus};
use crate::config::NotificationConfig;
use crate::secrets::SecretResolver;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Discord embed color codes (decimal)
#[derive(Debug, Clone, Copy)]
pub enum NotificationColor {
    /// Red - for failures
    Failure = 15158332,
    /// Orange - for partial runs
    Warning = 15105570,
    /// Green - for success
    Success = 3066993,
}

impl NotificationColor {
    fn as_decimal(&self) -> u32 {
        *self as u32
    }

    fn for_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => NotificationColor::Success,
            RunStatus::Partial => NotificationColor::Warning,
            RunStatus::Failed => NotificationColor::Failure,
        }
    }
}

/// One place a run summary can be delivered to
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, report: &RunReport) -> Result<()>;
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

fn check_response(sink: &str, response: reqwest::blocking::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        debug!("{} notification sent", sink);
        Ok(())
    } else {
        let body = response.text().unwrap_or_default();
        anyhow::bail!("{} returned status {}: {}", sink, status, body)
    }
}

fn title(report: &RunReport) -> String {
    format!("stackvault {}: {}", report.operation, report.status())
}

// Discord

#[derive(Debug, Serialize)]
struct DiscordPayload {
    username: String,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordField>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

pub struct DiscordSink {
    url: String,
}

impl DiscordSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn build_payload(&self, report: &RunReport) -> DiscordPayload {
        let mut fields = vec![
            DiscordField {
                name: "Succeeded".to_string(),
                value: report.succeeded.len().to_string(),
                inline: true,
            },
            DiscordField {
                name: "Duration".to_string(),
                value: format_duration(report.duration.as_secs()),
                inline: true,
            },
        ];

        let failed = report.failed_targets();
        if !failed.is_empty() {
            fields.push(DiscordField {
                name: "Failed targets".to_string(),
                value: failed.join("\n"),
                inline: false,
            });
        }

        if let Some(ref failure) = report.run_failure {
            // Discord caps field values at 1024 characters
            let shown: String = if failure.chars().count() > 500 {
                format!("{}...", failure.chars().take(497).collect::<String>())
            } else {
                failure.clone()
            };
            fields.push(DiscordField {
                name: "Error".to_string(),
                value: format!("```\n{}\n```", shown),
                inline: false,
            });
        }

        if let Some(ref id) = report.snapshot_id {
            fields.push(DiscordField {
                name: "Snapshot".to_string(),
                value: id.clone(),
                inline: true,
            });
        }

        DiscordPayload {
            username: "stackvault".to_string(),
            embeds: vec![DiscordEmbed {
                title: title(report),
                description: report.summary_line(),
                color: NotificationColor::for_status(report.status()).as_decimal(),
                fields,
                timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            }],
        }
    }
}

impl NotificationSink for DiscordSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn send(&self, report: &RunReport) -> Result<()> {
        let response = http_client()?
            .post(&self.url)
            .json(&self.build_payload(report))
            .send()
            .context("Failed to send Discord webhook")?;
        check_response(self.name(), response)
    }
}

// Slack-compatible webhook

#[derive(Debug, Serialize)]
struct SlackPayload {
    text: String,
}

pub struct SlackSink {
    url: String,
}

impl SlackSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn build_payload(&self, report: &RunReport) -> SlackPayload {
        let mut text = format!("*{}*\n{}", title(report), report.summary_line());
        if let Some(ref path) = report.log_path {
            text.push_str(&format!("\nLog: `{}`", path.display()));
        }
        SlackPayload { text }
    }
}

impl NotificationSink for SlackSink {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn send(&self, report: &RunReport) -> Result<()> {
        let response = http_client()?
            .post(&self.url)
            .json(&self.build_payload(report))
            .send()
            .context("Failed to send Slack webhook")?;
        check_response(self.name(), response)
    }
}

// ntfy

pub struct NtfySink {
    url: String,
    token: Option<String>,
}

impl NtfySink {
    pub fn new(base_url: &str, topic: &str, token: Option<String>) -> Self {
        Self {
            url: format!("{}/{}", base_url.trim_end_matches('/'), topic),
            token,
        }
    }

    fn headers(&self, report: &RunReport) -> Vec<(&'static str, String)> {
        let (priority, tags) = match report.status() {
            RunStatus::Success => ("default", "white_check_mark"),
            RunStatus::Partial => ("high", "warning"),
            RunStatus::Failed => ("urgent", "x"),
        };
        vec![
            ("Title", title(report)),
            ("Priority", priority.to_string()),
            ("Tags", tags.to_string()),
        ]
    }
}

impl NotificationSink for NtfySink {
    fn name(&self) -> &'static str {
        "ntfy"
    }

    fn send(&self, report: &RunReport) -> Result<()> {
        let mut request = http_client()?.post(&self.url).body(report.summary_line());
        for (key, value) in self.headers(report) {
            request = request.header(key, value);
        }
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().context("Failed to send ntfy message")?;
        check_response(self.name(), response)
    }
}

/// Fans a run report out to every configured sink
pub struct NotificationManager {
    sinks: Vec<Box<dyn NotificationSink>>,
    notify_on_success: bool,
}

impl NotificationManager {
    /// Sinks for every non-empty URL in the config
    pub fn from_config(config: &NotificationConfig, secrets: &dyn SecretResolver) -> Self {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();

        if !config.discord_webhook_url.is_empty() {
            sinks.push(Box::new(DiscordSink::new(config.discord_webhook_url.clone())));
        }
        if !config.slack_webhook_url.is_empty() {
            sinks.push(Box::new(SlackSink::new(config.slack_webhook_url.clone())));
        }
        if !config.ntfy_url.is_empty() && !config.ntfy_topic.is_empty() {
            let token = match secrets.resolve_optional(config.ntfy_token_env.as_deref()) {
                Ok(token) => token,
                Err(e) => {
                    warn!("ntfy token unavailable, sending without it: {}", e);
                    None
                }
            };
            sinks.push(Box::new(NtfySink::new(&config.ntfy_url, &config.ntfy_topic, token)));
        }

        Self {
            sinks,
            notify_on_success: config.notify_on_success,
        }
    }

    pub fn with_sinks(sinks: Vec<Box<dyn NotificationSink>>, notify_on_success: bool) -> Self {
        Self {
            sinks,
            notify_on_success,
        }
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Deliver the report to every sink; returns how many accepted it
    pub fn notify(&self, report: &RunReport) -> usize {
        if report.status() == RunStatus::Success && !self.notify_on_success {
            debug!("Run succeeded and notify_on_success is off, not notifying");
            return 0;
        }

        let mut delivered = 0;
        for sink in &self.sinks {
            match sink.send(report) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send {} notification: {:#}", sink.name(), e),
            }
        }
        if delivered > 0 {
            info!("Sent run summary to {} sink(s)", delivered);
        }
        delivered
    }
}
