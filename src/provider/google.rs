//! Gmail REST v1 and Calendar v3 client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    LabelChange, MailProvider, MessageDetail, MessageSummary, ProviderError, ProviderEvent,
};
use crate::constants::REDACTED_BODY_MAX_LEN;
use crate::retry::{RetryConfig, with_retry_if};
use crate::token::Credential;
use crate::types::Attendee;

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar pages fetched per pass before giving up on the rest.
const MAX_EVENT_PAGES: usize = 10;
const EVENT_PAGE_SIZE: &str = "250";

pub struct GoogleProvider {
    client: Client,
    gmail_base: String,
    calendar_base: String,
    retry: RetryConfig,
}

impl GoogleProvider {
    pub fn new(
        gmail_base: &str,
        calendar_base: &str,
        request_timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            gmail_base: gmail_base.trim_end_matches('/').to_string(),
            calendar_base: calendar_base.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn message_url(&self, id: &str) -> String {
        format!("{}/users/me/messages/{}", self.gmail_base, id)
    }

    /// Send with retry on transient failures, returning the response body.
    async fn send<F>(&self, target: &str, build: F) -> Result<String, ProviderError>
    where
        F: Fn() -> RequestBuilder,
    {
        let build = &build;
        with_retry_if(&self.retry, ProviderError::is_retryable, || async move {
            let response = build()
                .header("accept", "application/json")
                .send()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;

            if status.is_success() {
                Ok(body)
            } else {
                Err(status_error(status, &body, target))
            }
        })
        .await
    }

    async fn get_json<T, F>(&self, target: &str, build: F) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let body = self.send(target, build).await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

fn status_error(status: StatusCode, body: &str, target: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized,
        StatusCode::NOT_FOUND => ProviderError::NotFound(target.to_string()),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        // Gmail reports per-user quota exhaustion as 403
        StatusCode::FORBIDDEN if body.to_ascii_lowercase().contains("ratelimitexceeded") => {
            ProviderError::RateLimited
        }
        _ => ProviderError::Status {
            code: status.as_u16(),
            body: redact_response_body(body),
        },
    }
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(REDACTED_BODY_MAX_LEN) {
        None => trimmed.to_string(),
        Some((cut, _)) => format!("{}…[truncated {} bytes]", &trimmed[..cut], trimmed.len()),
    }
}

#[async_trait]
impl MailProvider for GoogleProvider {
    async fn list_messages_since(
        &self,
        cred: &Credential,
        since: i64,
        max: u32,
    ) -> Result<Vec<MessageSummary>, ProviderError> {
        let url = format!("{}/users/me/messages", self.gmail_base);
        let query = format!("after:{}", since);
        let max_results = max.to_string();

        let list: GmailMessageList = self
            .get_json("messages", || {
                self.client
                    .get(&url)
                    .bearer_auth(&cred.access_token)
                    .query(&[("q", query.as_str()), ("maxResults", max_results.as_str())])
            })
            .await?;

        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|stub| MessageSummary {
                id: stub.id,
                thread_id: stub.thread_id,
            })
            .collect())
    }

    async fn get_message(
        &self,
        cred: &Credential,
        id: &str,
    ) -> Result<MessageDetail, ProviderError> {
        let url = self.message_url(id);
        let message: GmailMessage = self
            .get_json(id, || {
                self.client
                    .get(&url)
                    .bearer_auth(&cred.access_token)
                    .query(&[("format", "full")])
            })
            .await?;
        Ok(message.into_detail())
    }

    async fn list_events(
        &self,
        cred: &Credential,
        start: i64,
        end: i64,
    ) -> Result<Vec<ProviderEvent>, ProviderError> {
        let url = format!("{}/calendars/primary/events", self.calendar_base);
        let time_min = rfc3339(start)?;
        let time_max = rfc3339(end)?;

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_EVENT_PAGES {
            let page: CalendarEventList = self
                .get_json("events", || {
                    let mut request = self
                        .client
                        .get(&url)
                        .bearer_auth(&cred.access_token)
                        .query(&[
                            ("timeMin", time_min.as_str()),
                            ("timeMax", time_max.as_str()),
                            ("singleEvents", "true"),
                            ("orderBy", "startTime"),
                            ("maxResults", EVENT_PAGE_SIZE),
                        ]);
                    if let Some(token) = &page_token {
                        request = request.query(&[("pageToken", token.as_str())]);
                    }
                    request
                })
                .await?;

            events.extend(page.items.into_iter().map(CalendarEvent::into_provider_event));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(events),
            }
        }

        tracing::warn!(count = events.len(), "Calendar listing truncated at page limit");
        Ok(events)
    }

    async fn modify_message(
        &self,
        cred: &Credential,
        id: &str,
        change: &LabelChange,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/modify", self.message_url(id));
        let body = serde_json::json!({
            "addLabelIds": change.add,
            "removeLabelIds": change.remove,
        });
        self.send(id, || {
            self.client
                .post(&url)
                .bearer_auth(&cred.access_token)
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn trash_message(&self, cred: &Credential, id: &str) -> Result<(), ProviderError> {
        let url = format!("{}/trash", self.message_url(id));
        self.send(id, || self.client.post(&url).bearer_auth(&cred.access_token))
            .await?;
        Ok(())
    }

    async fn delete_message(&self, cred: &Credential, id: &str) -> Result<(), ProviderError> {
        let url = self.message_url(id);
        self.send(id, || self.client.delete(&url).bearer_auth(&cred.access_token))
            .await?;
        Ok(())
    }
}

fn rfc3339(epoch: i64) -> Result<String, ProviderError> {
    Utc.timestamp_opt(epoch, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| ProviderError::Decode(format!("timestamp out of range: {}", epoch)))
}

fn decode_body_data(data: &str) -> Option<String> {
    // Gmail emits base64url, usually padded; accept both forms
    let bytes = URL_SAFE
        .decode(data)
        .or_else(|_| URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

//
// Gmail wire types
//

#[derive(Debug, Deserialize)]
struct GmailMessageList {
    messages: Option<Vec<GmailMessageStub>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageStub {
    id: String,
    thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: String,
    internal_date: Option<String>,
    payload: Option<GmailPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPayload {
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<GmailHeader>,
    body: Option<GmailBody>,
    #[serde(default)]
    parts: Vec<GmailPayload>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailBody {
    data: Option<String>,
}

impl GmailMessage {
    fn into_detail(self) -> MessageDetail {
        let mut text_body = None;
        let mut html_body = None;
        let mut headers = Vec::new();

        if let Some(payload) = &self.payload {
            headers = payload
                .headers
                .iter()
                .map(|h| (h.name.clone(), h.value.clone()))
                .collect();
            collect_body_parts(payload, &mut text_body, &mut html_body);
        }

        MessageDetail {
            id: self.id,
            thread_id: self.thread_id,
            label_ids: self.label_ids,
            snippet: self.snippet,
            internal_date_ms: self.internal_date.and_then(|d| d.parse().ok()),
            headers,
            text_body,
            html_body,
        }
    }
}

/// First text/plain and first text/html leaf, depth first.
fn collect_body_parts(
    payload: &GmailPayload,
    text_body: &mut Option<String>,
    html_body: &mut Option<String>,
) {
    let mime_type = payload
        .mime_type
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();

    if let Some(data) = payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .filter(|d| !d.is_empty())
        && let Some(decoded) = decode_body_data(data)
    {
        if mime_type == "text/plain" && text_body.is_none() {
            *text_body = Some(decoded);
        } else if mime_type == "text/html" && html_body.is_none() {
            *html_body = Some(decoded);
        }
    }

    for part in &payload.parts {
        collect_body_parts(part, text_body, html_body);
    }
}

//
// Calendar wire types
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarEventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    html_link: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(default)]
    attendees: Vec<CalendarAttendee>,
    organizer: Option<CalendarOrganizer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarAttendee {
    email: Option<String>,
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarOrganizer {
    email: Option<String>,
}

impl EventTime {
    fn to_epoch(&self) -> Option<i64> {
        if let Some(dt) = &self.date_time {
            return chrono::DateTime::parse_from_rfc3339(dt)
                .ok()
                .map(|dt| dt.timestamp());
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
    }
}

impl CalendarEvent {
    fn into_provider_event(self) -> ProviderEvent {
        let calendar_id = self
            .organizer
            .and_then(|o| o.email)
            .unwrap_or_else(|| "primary".to_string());

        ProviderEvent {
            id: self.id,
            calendar_id,
            summary: self.summary,
            description: self.description,
            start: self.start.as_ref().and_then(EventTime::to_epoch),
            end: self.end.as_ref().and_then(EventTime::to_epoch),
            location: self.location,
            attendees: self
                .attendees
                .into_iter()
                .filter_map(|a| {
                    Some(Attendee {
                        email: a.email?,
                        response_status: a.response_status,
                    })
                })
                .collect(),
            status: self.status,
            html_link: self.html_link,
        }
    }
}
