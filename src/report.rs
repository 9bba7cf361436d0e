//! Human-readable reports of tracked errors.
//!
//! Produces the text an inspection surface copies to the clipboard or
//! posts to a team channel: a line of `@team` tags followed by a fenced
//! JSON block with the errors grouped by team.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use url::Url;

use crate::types::ErrorEvent;

/// Standard reason phrase for a status code.
pub fn status_message(status_code: u16) -> &'static str {
    match status_code {
        0 => "Network Error",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Error",
    }
}

/// Group errors by team, teams in order of first appearance.
pub fn group_by_team(errors: &[ErrorEvent]) -> Vec<(&str, Vec<&ErrorEvent>)> {
    let mut groups: Vec<(&str, Vec<&ErrorEvent>)> = Vec::new();
    for error in errors {
        match groups.iter_mut().find(|(team, _)| *team == error.team) {
            Some((_, members)) => members.push(error),
            None => groups.push((error.team.as_str(), vec![error])),
        }
    }
    groups
}

/// Identifier attached to each reported error so a conversation about it
/// can be traced back: `sentinel-{now}-{9 base36 chars}`.
pub fn correlation_id(now_ms: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let suffix: String = (0..9)
        .map(|_| ALPHABET[fastrand::usize(..ALPHABET.len())] as char)
        .collect();
    format!("sentinel-{}-{}", now_ms, suffix)
}

/// ISO-8601 rendering of a millisecond timestamp.
pub fn format_timestamp(timestamp_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp_ms.to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportEntry<'a> {
    endpoint: &'a str,
    method: &'a str,
    status_code: u16,
    status_message: &'static str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<&'a str>,
    username: &'a str,
    correlation_id: String,
    response_payload: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<&'a BTreeMap<String, String>>,
}

impl<'a> ReportEntry<'a> {
    fn new(error: &'a ErrorEvent, now_ms: u64, with_team: bool) -> Self {
        Self {
            endpoint: &error.endpoint,
            method: &error.method,
            status_code: error.status_code,
            status_message: status_message(error.status_code),
            timestamp: format_timestamp(error.timestamp),
            team: with_team.then_some(error.team.as_str()),
            username: error.username.as_deref().unwrap_or("unknown"),
            correlation_id: correlation_id(now_ms),
            response_payload: error.response_payload.as_deref(),
            headers: error.headers.as_ref().filter(|h| !h.is_empty()),
        }
    }
}

/// Team name -> entries, serialized as a JSON object in group order.
struct TeamGroups<'a>(Vec<(&'a str, Vec<ReportEntry<'a>>)>);

impl Serialize for TeamGroups<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (team, entries) in &self.0 {
            map.serialize_entry(team, entries)?;
        }
        map.end()
    }
}

/// Render every error, grouped by team, behind a line of `@team` tags.
pub fn render_team_report(errors: &[ErrorEvent], now_ms: u64) -> String {
    let groups = group_by_team(errors);
    let tags = groups
        .iter()
        .map(|(team, _)| format!("@{}", team))
        .collect::<Vec<_>>()
        .join(" ");

    let body = TeamGroups(
        groups
            .into_iter()
            .map(|(team, members)| {
                let entries = members
                    .into_iter()
                    .map(|e| ReportEntry::new(e, now_ms, false))
                    .collect();
                (team, entries)
            })
            .collect(),
    );

    fenced(&tags, &body)
}

/// Render a single error, including its team.
pub fn render_error_report(error: &ErrorEvent, now_ms: u64) -> String {
    fenced(&format!("@{}", error.team), &ReportEntry::new(error, now_ms, true))
}

/// Link that opens `channel` with `message` prefilled, appended as the
/// `message` query parameter after any existing query.
pub fn channel_deep_link(channel: &Url, message: &str) -> String {
    let mut link = channel.clone();
    link.query_pairs_mut().append_pair("message", message);
    link.into()
}

fn fenced<T: Serialize>(tags: &str, body: &T) -> String {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    format!("{}\n\n```json\n{}\n```", tags, json)
}
