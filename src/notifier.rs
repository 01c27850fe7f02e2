//! Telegram delivery through the Bot API `sendMessage` endpoint.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::collab::Notifier;
use crate::error::WatchError;
use crate::event::Event;
use crate::report::format_location;
use crate::Result;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters MarkdownV2 requires to be backslash-escaped.
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize, Default)]
struct ApiResponse {
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    server_name: String,
    api_url: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str, server_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("oxiwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(SEND_TIMEOUT)
            .build()?;
        Ok(Self {
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            server_name: server_name.to_string(),
            api_url: TELEGRAM_API_URL.to_string(),
            client,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn login_alert_text(&self, event: &Event, country: &str, city: &str) -> String {
        let mut location = format_location(country, city);
        if location.is_empty() {
            location = event.ip.clone();
        }

        format!(
            "🔐 *SSH Login Alert*\n\
             🖥️ Server: {}\n\
             \n\
             👤 User: {}\n\
             📅 Time: {}\n\
             🔓 Method: {}\n\
             🌐 IP: {}\n\
             📍 Location: {}",
            escape_markdown(&self.server_name),
            escape_markdown(&event.username),
            escape_markdown(&event.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            escape_markdown(event.method.as_str()),
            escape_markdown(&event.ip),
            escape_markdown(&location),
        )
    }

    pub async fn send_test_message(&self) -> Result<()> {
        let text = format!(
            "✅ *OxiWatch Test Message*\n\
             🖥️ Server: {}\n\
             📅 Time: {}\n\
             \n\
             Connection successful\\!",
            escape_markdown(&self.server_name),
            escape_markdown(&Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()),
        );
        self.send(&text).await
    }

    pub async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(chars = text.chars().count(), "telegram message sent");
            return Ok(());
        }

        let body: ApiResponse = response.json().await.unwrap_or_default();
        Err(WatchError::Telegram {
            status: status.as_u16(),
            description: body
                .description
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string()),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_login_alert(&self, event: &Event, country: &str, city: &str) -> Result<()> {
        self.send(&self.login_alert_text(event, country, city)).await
    }

    async fn send_daily_report(&self, text: &str) -> Result<()> {
        self.send(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuthMethod, EventKind};
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn login() -> Event {
        Event {
            timestamp: Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).unwrap(),
            kind: EventKind::Success,
            username: "deploy_bot".into(),
            ip: "203.0.113.7".into(),
            port: 50000,
            method: AuthMethod::PublicKey,
            invalid_user: false,
        }
    }

    fn notifier(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new("TOKEN", "42", "web-01.prod")
            .unwrap()
            .with_api_url(server.uri())
    }

    #[test]
    fn escapes_every_special_character() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("1.2.3.4"), "1\\.2\\.3\\.4");
        assert_eq!(escape_markdown("x-y!(z)"), "x\\-y\\!\\(z\\)");
        assert_eq!(escape_markdown("plain"), "plain");
        assert_eq!(escape_markdown("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn alert_text_escapes_fields_and_falls_back_to_ip() {
        let n = TelegramNotifier::new("t", "c", "web-01.prod").unwrap();
        let text = n.login_alert_text(&login(), "", "");
        assert!(text.contains("Server: web\\-01\\.prod"));
        assert!(text.contains("User: deploy\\_bot"));
        assert!(text.contains("Time: 2026\\-02\\-03 04:05:06 UTC"));
        assert!(text.contains("Method: publickey"));
        assert!(text.contains("Location: 203\\.0\\.113\\.7"));

        let text = n.login_alert_text(&login(), "Germany", "Berlin");
        assert!(text.contains("Location: Berlin, Germany"));
    }

    #[tokio::test]
    async fn posts_markdown_v2_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "42",
                "parse_mode": "MarkdownV2",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server)
            .send_login_alert(&login(), "Germany", "Berlin")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn api_errors_carry_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found",
            })))
            .mount(&server)
            .await;

        let err = notifier(&server).send_test_message().await.unwrap_err();
        match err {
            WatchError::Telegram { status, description } => {
                assert_eq!(status, 400);
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_body_uses_status_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = notifier(&server).send_daily_report("report").await.unwrap_err();
        assert!(matches!(err, WatchError::Telegram { status: 502, .. }));
    }
}
