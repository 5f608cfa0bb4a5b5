//! Provider payloads to local records.

use mail_parser::{Address, MessageParser};
use sha2::{Digest, Sha256};

use crate::constants::{LABEL_INBOX, LABEL_TRASH, LABEL_UNREAD};
use crate::provider::{MessageDetail, ProviderEvent};
use crate::types::{EventStatus, MailStatus, NewCalendarEvent, NewMailRecord};

/// Headers we decode; anything else on the message is ignored.
const DECODED_HEADERS: [&str; 6] = ["From", "To", "Cc", "Bcc", "Subject", "Date"];

pub fn status_from_labels(labels: &[String]) -> MailStatus {
    let has = |label: &str| labels.iter().any(|l| l == label);
    if has(LABEL_TRASH) {
        MailStatus::Trashed
    } else if !labels.is_empty() && !has(LABEL_INBOX) {
        MailStatus::Archived
    } else {
        MailStatus::Active
    }
}

pub fn normalize_message(detail: &MessageDetail) -> Result<NewMailRecord, String> {
    let headers = DecodedHeaders::parse(detail);

    let internal_date = detail
        .internal_date_ms
        .map(|ms| ms / 1000)
        .or(headers.date)
        .ok_or_else(|| format!("message {} has no internal date", detail.id))?;

    let raw_body_hash = detail
        .text_body
        .as_deref()
        .or(detail.html_body.as_deref())
        .map(|body| format!("{:x}", Sha256::digest(body.as_bytes())));

    Ok(NewMailRecord {
        provider_message_id: detail.id.clone(),
        thread_id: detail.thread_id.clone(),
        from: headers.from,
        to: headers.to,
        cc: headers.cc,
        bcc: headers.bcc,
        subject: headers.subject,
        snippet: detail.snippet.clone(),
        internal_date,
        is_read: !detail.label_ids.iter().any(|l| l == LABEL_UNREAD),
        labels: detail.label_ids.clone(),
        status: status_from_labels(&detail.label_ids),
        raw_body_hash,
    })
}

pub fn normalize_event(event: ProviderEvent) -> NewCalendarEvent {
    NewCalendarEvent {
        status: EventStatus::normalize(event.status.as_deref()),
        provider_event_id: event.id,
        calendar_id: event.calendar_id,
        summary: event.summary,
        description: event.description,
        start_time: event.start,
        end_time: event.end,
        location: event.location,
        attendees: event.attendees,
        html_link: event.html_link,
    }
}

#[derive(Debug, Default)]
struct DecodedHeaders {
    from: String,
    to: Vec<String>,
    cc: Vec<String>,
    bcc: Vec<String>,
    subject: String,
    date: Option<i64>,
}

impl DecodedHeaders {
    /// Run the provider's header values through a MIME parser so encoded words
    /// (`=?UTF-8?B?...?=`) and address groups come out decoded.
    fn parse(detail: &MessageDetail) -> Self {
        let mut block = String::new();
        for name in DECODED_HEADERS {
            if let Some(value) = detail.header(name) {
                let value = value.replace(['\r', '\n'], " ");
                block.push_str(&format!("{}: {}\r\n", name, value));
            }
        }
        block.push_str("\r\n");

        let Some(message) = MessageParser::default().parse(block.as_bytes()) else {
            return Self::raw(detail);
        };

        let from = message
            .from()
            .and_then(|addrs| addrs.first())
            .map(|addr| match (addr.name(), addr.address()) {
                (Some(name), Some(address)) => format!("{} <{}>", name, address),
                (None, Some(address)) => address.to_string(),
                (Some(name), None) => name.to_string(),
                (None, None) => String::new(),
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| detail.header("From").unwrap_or_default().trim().to_string());

        Self {
            from,
            to: addresses(message.to()),
            cc: addresses(message.cc()),
            bcc: addresses(message.bcc()),
            subject: message
                .subject()
                .map(|s| s.to_string())
                .unwrap_or_else(|| detail.header("Subject").unwrap_or_default().to_string()),
            date: message.date().map(|d| d.to_timestamp()),
        }
    }

    fn raw(detail: &MessageDetail) -> Self {
        let split = |name: &str| -> Vec<String> {
            detail
                .header(name)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            from: detail.header("From").unwrap_or_default().trim().to_string(),
            to: split("To"),
            cc: split("Cc"),
            bcc: split("Bcc"),
            subject: detail.header("Subject").unwrap_or_default().to_string(),
            date: None,
        }
    }
}

fn addresses(list: Option<&Address>) -> Vec<String> {
    list.map(|addrs| {
        addrs
            .iter()
            .filter_map(|addr| addr.address())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
