//! Google Calendar tools
//!
//! `get_next_n_calendar_events` is safe; `create_calendar_event` and
//! `delete_calendar_event` are sensitive and go through human review.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use super::google::GoogleApi;
use super::{json_schema, ToolHandler, ToolRegistry, ToolSafety};
use crate::credentials::CredentialProvider;

const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

/// Registry with the full calendar tool set
pub fn calendar_registry(credentials: Arc<dyn CredentialProvider>) -> ToolRegistry {
    let api = Arc::new(GoogleApi::new(credentials));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetNextEvents { api: api.clone() }));
    registry.register(Arc::new(CreateEvent { api: api.clone() }));
    registry.register(Arc::new(DeleteEvent { api }));
    registry
}

/// ISO 8601 with an explicit offset or trailing Z
fn valid_datetime(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// (summary, id) pairs from the user's calendar list
async fn calendar_list(api: &GoogleApi) -> Result<Vec<(String, String)>> {
    let response = api
        .get(&format!("{}/users/me/calendarList", CALENDAR_API), &[])
        .await?;
    let mut calendars = Vec::new();
    if let Some(items) = response["items"].as_array() {
        for item in items {
            if let (Some(summary), Some(id)) = (item["summary"].as_str(), item["id"].as_str()) {
                calendars.push((summary.to_string(), id.to_string()));
            }
        }
    }
    Ok(calendars)
}

fn find_calendar_id<'a>(calendars: &'a [(String, String)], name: &str) -> Option<&'a str> {
    calendars
        .iter()
        .find(|(summary, _)| summary.eq_ignore_ascii_case(name))
        .map(|(_, id)| id.as_str())
}

struct GetNextEvents {
    api: Arc<GoogleApi>,
}

#[async_trait]
impl ToolHandler for GetNextEvents {
    fn name(&self) -> &str {
        "get_next_n_calendar_events"
    }

    fn description(&self) -> &str {
        "Retrieves the next n upcoming events from Google Calendar, across all \
         calendars or filtered to one calendar, optionally limited to the next \
         day, week, or year."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            json!({
                "n": {
                    "type": "integer",
                    "description": "Number of upcoming events to retrieve"
                },
                "calendar_name": {
                    "type": "string",
                    "description": "Only list events from this calendar"
                },
                "duration": {
                    "type": "string",
                    "enum": ["day", "week", "year"],
                    "description": "Only list events within this time range"
                }
            }),
            vec!["n"],
        )
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::Safe
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let n = input["n"].as_u64().unwrap_or(5) as usize;
        let calendar_name = input["calendar_name"].as_str();
        let time_max = match input["duration"].as_str() {
            Some("day") => Some(Utc::now() + Duration::days(1)),
            Some("week") => Some(Utc::now() + Duration::weeks(1)),
            Some("year") => Some(Utc::now() + Duration::days(365)),
            Some(other) => {
                return Ok(format!(
                    "Invalid duration '{}'. Use 'day', 'week', or 'year'.",
                    other
                ));
            }
            None => None,
        };

        let calendars = calendar_list(&self.api).await?;
        if let Some(name) = calendar_name {
            if find_calendar_id(&calendars, name).is_none() {
                let known: Vec<&str> = calendars.iter().map(|(s, _)| s.as_str()).collect();
                return Ok(format!(
                    "Calendar name should be one of the following: {}",
                    known.join(", ")
                ));
            }
        }

        let now = now_rfc3339();
        let mut events_all: Vec<(String, String)> = Vec::new();
        for (summary, id) in &calendars {
            if let Some(name) = calendar_name {
                if !summary.eq_ignore_ascii_case(name) {
                    continue;
                }
            }
            let mut query = vec![
                ("timeMin", now.clone()),
                ("maxResults", "20".to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ];
            if let Some(max) = time_max {
                query.push(("timeMax", max.to_rfc3339_opts(SecondsFormat::Secs, true)));
            }
            let url = format!("{}/calendars/{}/events", CALENDAR_API, id);
            let response = self.api.get(&url, &query).await?;
            if let Some(items) = response["items"].as_array() {
                for event in items {
                    let start = event["start"]["dateTime"]
                        .as_str()
                        .or_else(|| event["start"]["date"].as_str())
                        .unwrap_or("?");
                    let end = event["end"]["dateTime"]
                        .as_str()
                        .or_else(|| event["end"]["date"].as_str())
                        .unwrap_or("?");
                    let mut entry = format!(
                        "Event ID: {}\nCalendar Name: {} | From {} To {} - {}\n",
                        event["id"].as_str().unwrap_or("?"),
                        summary,
                        start,
                        end,
                        event["summary"].as_str().unwrap_or("(untitled)"),
                    );
                    if let Some(location) = event["location"].as_str() {
                        entry.push_str(&format!("Location: {}\n", location));
                    }
                    if let Some(description) = event["description"].as_str() {
                        entry.push_str(&format!("Notes: {}\n", description));
                    }
                    events_all.push((start.to_string(), entry));
                }
            }
        }

        if events_all.is_empty() {
            return Ok("No events found".to_string());
        }

        events_all.sort_by(|a, b| a.0.cmp(&b.0));
        let mut results = format!("Next {} Events Across All Calendars:\n", n);
        for (_, entry) in events_all.into_iter().take(n) {
            results.push_str(&entry);
            results.push('\n');
        }
        Ok(results)
    }
}

struct CreateEvent {
    api: Arc<GoogleApi>,
}

#[async_trait]
impl ToolHandler for CreateEvent {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn description(&self) -> &str {
        "Creates an event in a Google Calendar. Start and end times must be \
         ISO 8601 (YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DDTHH:MM:SS±HH:MM)."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            json!({
                "start_time": {"type": "string", "description": "Event start, ISO 8601"},
                "end_time": {"type": "string", "description": "Event end, ISO 8601"},
                "calendar_name": {"type": "string", "description": "Calendar to create the event in"},
                "title": {"type": "string", "description": "Event title"},
                "location": {"type": "string", "description": "Optional event location"},
                "description": {"type": "string", "description": "Optional event description"}
            }),
            vec!["start_time", "end_time", "calendar_name", "title"],
        )
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::Sensitive
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let start_time = input["start_time"].as_str().unwrap_or("");
        let end_time = input["end_time"].as_str().unwrap_or("");
        let calendar_name = input["calendar_name"].as_str().unwrap_or("");
        let title = input["title"].as_str().unwrap_or("");

        if start_time.is_empty() || end_time.is_empty() || calendar_name.is_empty() || title.is_empty()
        {
            return Ok(
                "Error: 'start_time', 'end_time', 'calendar_name', and 'title' are required."
                    .to_string(),
            );
        }
        if !valid_datetime(start_time) || !valid_datetime(end_time) {
            return Ok(
                "Error: 'start_time' and 'end_time' must be in ISO 8601 format \
                 (YYYY-MM-DDTHH:MM:SSZ or YYYY-MM-DDTHH:MM:SS±HH:MM)."
                    .to_string(),
            );
        }

        let calendars = calendar_list(&self.api).await?;
        let Some(calendar_id) = find_calendar_id(&calendars, calendar_name) else {
            return Ok(format!("Error: Calendar '{}' not found.", calendar_name));
        };

        let event = json!({
            "summary": title,
            "location": input["location"].as_str().unwrap_or(""),
            "description": input["description"].as_str().unwrap_or(""),
            "start": {"dateTime": start_time},
            "end": {"dateTime": end_time},
        });
        let url = format!("{}/calendars/{}/events", CALENDAR_API, calendar_id);
        let created = self.api.post(&url, &event).await?;
        Ok(format!(
            "Event created: {}",
            created["htmlLink"].as_str().unwrap_or("(no link)")
        ))
    }
}

struct DeleteEvent {
    api: Arc<GoogleApi>,
}

#[async_trait]
impl ToolHandler for DeleteEvent {
    fn name(&self) -> &str {
        "delete_calendar_event"
    }

    fn description(&self) -> &str {
        "Deletes an event from a Google Calendar by event id."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            json!({
                "calendar_name": {"type": "string", "description": "Calendar containing the event"},
                "event_id": {"type": "string", "description": "Id of the event to delete"}
            }),
            vec!["calendar_name", "event_id"],
        )
    }

    fn safety(&self) -> ToolSafety {
        ToolSafety::Sensitive
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let calendar_name = input["calendar_name"].as_str().unwrap_or("");
        let event_id = input["event_id"].as_str().unwrap_or("");
        if calendar_name.is_empty() || event_id.is_empty() {
            return Ok("Error: 'calendar_name' and 'event_id' are required.".to_string());
        }

        let calendars = calendar_list(&self.api).await?;
        let Some(calendar_id) = find_calendar_id(&calendars, calendar_name) else {
            return Ok(format!("Error: Calendar '{}' not found.", calendar_name));
        };

        let url = format!("{}/calendars/{}/events/{}", CALENDAR_API, calendar_id, event_id);
        match self.api.delete(&url).await {
            Ok(()) => Ok(format!(
                "Event '{}' deleted successfully from '{}'.",
                event_id, calendar_name
            )),
            Err(e) => Ok(format!("Event '{}' cannot be deleted. Error {}", event_id, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;

    #[test]
    fn test_valid_datetime() {
        assert!(valid_datetime("2026-03-01T09:00:00Z"));
        assert!(valid_datetime("2026-03-01T09:00:00+07:00"));
        assert!(!valid_datetime("2026-03-01 09:00"));
        assert!(!valid_datetime("tomorrow at nine"));
    }

    #[test]
    fn test_find_calendar_id_case_insensitive() {
        let calendars = vec![
            ("Work".to_string(), "work@group.calendar".to_string()),
            ("Personal".to_string(), "personal@group.calendar".to_string()),
        ];
        assert_eq!(find_calendar_id(&calendars, "work"), Some("work@group.calendar"));
        assert_eq!(find_calendar_id(&calendars, "Holidays"), None);
    }

    #[test]
    fn test_registry_safety_split() {
        let registry = calendar_registry(Arc::new(StaticCredentials::missing()));
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_sensitive("get_next_n_calendar_events"));
        assert!(registry.is_sensitive("create_calendar_event"));
        assert!(registry.is_sensitive("delete_calendar_event"));
    }

    #[tokio::test]
    async fn test_create_event_rejects_bad_datetime() {
        let registry = calendar_registry(Arc::new(StaticCredentials::missing()));
        let result = registry
            .execute(
                "create_calendar_event",
                json!({
                    "start_time": "next tuesday",
                    "end_time": "2026-03-01T10:00:00Z",
                    "calendar_name": "Work",
                    "title": "Standup"
                }),
            )
            .await
            .unwrap();
        assert!(result.contains("ISO 8601"));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_tool_error() {
        let registry = calendar_registry(Arc::new(StaticCredentials::missing()));
        let err = registry
            .execute("get_next_n_calendar_events", json!({"n": 3}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("get_next_n_calendar_events"));
    }
}
