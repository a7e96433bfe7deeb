//! Request and response types for the HTTP surface.
//!
//! Wire field names (`wizardid`, `chatid`, `time`, `shift`) match the
//! deployed payload format. Fields are optional at the serde layer so a
//! missing one produces a descriptive rejection instead of a generic
//! deserialization error.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /chat`: a message exchanged between a wizard and a
/// traveler. A traveler is identified by their chat id.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub wizardid: Option<String>,
    pub chatid: Option<String>,
    pub time: Option<String>,
}

/// Body of `POST /wizard/traveler`: assign a traveler to a wizard.
#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub wizardid: Option<String>,
    pub chatid: Option<String>,
}

/// Body of `POST /wizard/shift`: toggle a wizard's shift.
#[derive(Debug, Deserialize)]
pub struct ShiftRequest {
    pub wizardid: Option<String>,
    pub shift: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmationResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ShiftResponse {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct OverloadResponse {
    pub overloaded: bool,
    pub travelers: Vec<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Parse a chat timestamp. Accepts RFC 3339 or the legacy
/// `YYYY-MM-DD HH:MM:SS` form (interpreted as UTC).
pub fn parse_chat_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|n| n.and_utc())
        .map_err(|_| {
            format!("invalid time '{s}', expected RFC 3339 or 'YYYY-MM-DD HH:MM:SS'")
        })
}
