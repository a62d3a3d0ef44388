//! Gmail tools
//!
//! `fetch_inbox_messages` and `get_email_details` are safe; `send_email` is
//! sensitive and goes through human review.

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use super::google::GoogleApi;
use super::{json_schema, ToolHandler, ToolRegistry, ToolSafety};
use crate::credentials::CredentialProvider;

const GMAIL_API: &str = "https://gmail.googleapis.com/gmail/v1";

/// Registry with the full Gmail tool set
pub fn gmail_registry(credentials: Arc<dyn CredentialProvider>) -> ToolRegistry {
    let api = Arc::new(GoogleApi::new(credentials));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FetchInbox { api: api.clone() }));
    registry.register(Arc::new(GetEmailDetails { api: api.clone() }));
    registry.register(Arc::new(SendEmail { api }));
    registry
}

fn header<'a>(headers: &'a Value, name: &str, fallback: &'a str) -> &'a str {
    headers
        .as_array()
        .and_then(|hs| {
            hs.iter()
                .find(|h| h["name"].as_str() == Some(name))
                .and_then(|h| h["value"].as_str())
        })
        .unwrap_or(fallback)
}

fn decode_body(data: &str) -> String {
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data))
        .unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Strip tags from an HTML body, keeping the text with spaces between tags
fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

/// Pull readable text out of a Gmail message payload: prefer text/plain
/// parts, fall back to stripped text/html, drop invisible characters and
/// URLs, collapse whitespace.
fn extract_clean_text(payload: &Value) -> String {
    let mut body = String::new();

    let part_text = |part: &Value| -> Option<String> {
        let data = part["body"]["data"].as_str()?;
        match part["mimeType"].as_str() {
            Some("text/plain") => Some(decode_body(data)),
            Some("text/html") => Some(html_to_text(&decode_body(data))),
            _ => None,
        }
    };

    if let Some(parts) = payload["parts"].as_array() {
        for part in parts {
            if let Some(text) = part_text(part) {
                body = text;
            }
        }
    } else if let Some(text) = part_text(payload) {
        body = text;
    }

    let invisible = ['\u{200B}', '\u{200C}', '\u{00AD}', '\u{034F}'];
    let body: String = body.chars().filter(|c| !invisible.contains(c)).collect();
    body.split_whitespace()
        .filter(|word| !word.starts_with("http://") && !word.starts_with("https://"))
        .collect::<Vec<_>>()
        .join(" ")
}

struct FetchInbox {
    api: Arc<GoogleApi>,
}

#[async_trait]
impl ToolHandler for FetchInbox {
    fn name(&self) -> &str {
        "fetch_inbox_messages"
    }

    fn description(&self) -> &str {
        "Lists recent messages from the Gmail inbox with id, sender, and \
         subject, optionally limited to the last n days."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            json!({
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of messages to retrieve, default 5"
                },
                "last_n_days": {
                    "type": "integer",
                    "description": "Only list messages from the past n days"
                }
            }),
            vec![],
        )
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::Safe
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let max_results = input["max_results"].as_u64().unwrap_or(5);
        let mut query = "in:inbox".to_string();
        if let Some(days) = input["last_n_days"].as_u64() {
            let since = Utc::now() - Duration::days(days as i64);
            query.push_str(&format!(" after:{}", since.format("%Y/%m/%d")));
        }

        let url = format!("{}/users/me/messages", GMAIL_API);
        let list = self
            .api
            .get(
                &url,
                &[("maxResults", max_results.to_string()), ("q", query)],
            )
            .await?;

        let Some(messages) = list["messages"].as_array().filter(|m| !m.is_empty()) else {
            return Ok("No messages found in the specified time range.".to_string());
        };

        let mut lines = vec!["Inbox Messages".to_string(), "=".repeat(60)];
        for msg in messages {
            let Some(id) = msg["id"].as_str() else {
                continue;
            };
            let detail_url = format!("{}/users/me/messages/{}", GMAIL_API, id);
            let message = self
                .api
                .get(
                    &detail_url,
                    &[
                        ("format", "metadata".to_string()),
                        ("metadataHeaders", "Subject".to_string()),
                        ("metadataHeaders", "From".to_string()),
                    ],
                )
                .await?;
            let headers = &message["payload"]["headers"];
            lines.push(format!(
                "Message ID: {}\nFrom: {}\nSubject: {}\n{}",
                id,
                header(headers, "From", "Unknown Sender"),
                header(headers, "Subject", "No Subject"),
                "-".repeat(50),
            ));
        }
        Ok(lines.join("\n"))
    }
}

struct GetEmailDetails {
    api: Arc<GoogleApi>,
}

#[async_trait]
impl ToolHandler for GetEmailDetails {
    fn name(&self) -> &str {
        "get_email_details"
    }

    fn description(&self) -> &str {
        "Fetches the full details of one email: sender, subject, date, and \
         cleaned body text."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            json!({
                "message_id": {
                    "type": "string",
                    "description": "Id of the email message"
                }
            }),
            vec!["message_id"],
        )
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::Safe
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let message_id = input["message_id"].as_str().unwrap_or("");
        if message_id.is_empty() {
            return Ok("Error: 'message_id' is required.".to_string());
        }

        let url = format!("{}/users/me/messages/{}", GMAIL_API, message_id);
        let message = self
            .api
            .get(&url, &[("format", "full".to_string())])
            .await?;
        let payload = &message["payload"];
        let headers = &payload["headers"];

        Ok(format!(
            "Email Details\n{}\nFrom: {}\nSubject: {}\nDate: {}\nContent:\n\n{}\n",
            "=".repeat(60),
            header(headers, "From", "Unknown Sender"),
            header(headers, "Subject", "No Subject"),
            header(headers, "Date", "Unknown Date"),
            extract_clean_text(payload),
        ))
    }
}

struct SendEmail {
    api: Arc<GoogleApi>,
}

#[async_trait]
impl ToolHandler for SendEmail {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Sends an email from the user's Gmail account."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            json!({
                "to_email": {"type": "string", "description": "Recipient email address"},
                "subject": {"type": "string", "description": "Email subject"},
                "message_body": {"type": "string", "description": "Plain-text email body"}
            }),
            vec!["to_email", "subject", "message_body"],
        )
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::Sensitive
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let to_email = input["to_email"].as_str().unwrap_or("");
        let subject = input["subject"].as_str().unwrap_or("");
        let message_body = input["message_body"].as_str().unwrap_or("");
        if to_email.is_empty() || subject.is_empty() {
            return Ok("Error: 'to_email' and 'subject' are required.".to_string());
        }

        let mime = format!(
            "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"utf-8\"\r\nMIME-Version: 1.0\r\n\r\n{}",
            to_email, subject, message_body
        );
        let raw = URL_SAFE.encode(mime.as_bytes());

        let url = format!("{}/users/me/messages/send", GMAIL_API);
        match self.api.post(&url, &json!({"raw": raw})).await {
            Ok(_) => Ok(format!("Email successfully sent to {}", to_email)),
            Err(e) => Ok(format!("Error sending email: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;

    #[test]
    fn test_registry_safety_split() {
        let registry = gmail_registry(Arc::new(StaticCredentials::missing()));
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_sensitive("fetch_inbox_messages"));
        assert!(!registry.is_sensitive("get_email_details"));
        assert!(registry.is_sensitive("send_email"));
    }

    #[test]
    fn test_extract_clean_text_prefers_plain_part() {
        let plain = URL_SAFE.encode("Hello there,  see https://example.com/x for details");
        let payload = json!({
            "parts": [
                {"mimeType": "text/plain", "body": {"data": plain}}
            ]
        });
        assert_eq!(extract_clean_text(&payload), "Hello there, see for details");
    }

    #[test]
    fn test_extract_clean_text_strips_html() {
        let html = URL_SAFE.encode("<div><p>Meeting <b>moved</b> to Friday</p></div>");
        let payload = json!({
            "mimeType": "text/html",
            "body": {"data": html}
        });
        assert_eq!(extract_clean_text(&payload), "Meeting moved to Friday");
    }

    #[test]
    fn test_extract_clean_text_drops_invisible_chars() {
        let plain = URL_SAFE.encode("soft\u{00AD}ware up\u{200B}date");
        let payload = json!({
            "mimeType": "text/plain",
            "body": {"data": plain}
        });
        assert_eq!(extract_clean_text(&payload), "software update");
    }

    #[test]
    fn test_header_lookup() {
        let headers = json!([
            {"name": "From", "value": "a@b.c"},
            {"name": "Subject", "value": "Hi"}
        ]);
        assert_eq!(header(&headers, "From", "none"), "a@b.c");
        assert_eq!(header(&headers, "Date", "Unknown Date"), "Unknown Date");
    }

    #[tokio::test]
    async fn test_get_email_details_requires_id() {
        let registry = gmail_registry(Arc::new(StaticCredentials::missing()));
        let result = registry
            .execute("get_email_details", json!({}))
            .await
            .unwrap();
        assert!(result.contains("'message_id' is required"));
    }
}
