//! Google Calendar REST client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use secrecy::SecretString;
use tracing::{debug, info};

use super::{endpoint, get_json};
use crate::error::SourceError;
use crate::pipeline::types::{CalendarEvent, CalendarSource, EventWindow};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

const SOURCE: &str = "calendar";

mod api {
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    pub struct CalendarList {
        #[serde(default)]
        pub items: Vec<CalendarRef>,
    }

    #[derive(Debug, Deserialize)]
    pub struct CalendarRef {
        pub id: String,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Events {
        #[serde(default)]
        pub items: Vec<Event>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Event {
        #[serde(default)]
        pub summary: String,
        pub creator: Option<Person>,
        pub organizer: Option<Person>,
        #[serde(default)]
        pub attendees: Vec<Person>,
        pub start: Option<When>,
        pub end: Option<When>,
        #[serde(default)]
        pub description: String,
        #[serde(default)]
        pub location: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Person {
        #[serde(default)]
        pub email: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct When {
        pub date_time: Option<String>,
        pub date: Option<String>,
    }
}

/// Calendar client for one user's access token.
///
/// Events from every calendar in the user's list are merged and ordered by
/// start time.
pub struct GoogleCalendarClient {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(client: reqwest::Client, token: SecretString) -> Self {
        Self {
            client,
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn calendar_ids(&self) -> Result<Vec<String>, SourceError> {
        let url = endpoint(
            &self.base_url,
            &["calendar", "v3", "users", "me", "calendarList"],
            SOURCE,
        )?;
        let list: api::CalendarList = get_json(&self.client, url, &self.token, &[], SOURCE).await?;
        Ok(list.items.into_iter().map(|c| c.id).collect())
    }

    async fn events_for(
        &self,
        calendar_id: &str,
        window: EventWindow,
    ) -> Result<Vec<CalendarEvent>, SourceError> {
        let url = endpoint(
            &self.base_url,
            &["calendar", "v3", "calendars", calendar_id, "events"],
            SOURCE,
        )?;
        let params = [
            ("timeMin", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("timeMax", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        let events: api::Events = get_json(&self.client, url, &self.token, &params, SOURCE).await?;
        debug!(calendar_id, count = events.items.len(), "Fetched calendar events");

        events.items.into_iter().map(convert_event).collect()
    }
}

#[async_trait]
impl CalendarSource for GoogleCalendarClient {
    async fn fetch_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, SourceError> {
        let ids = self.calendar_ids().await?;

        let per_calendar = futures::future::join_all(
            ids.iter().map(|id| self.events_for(id, window)),
        )
        .await;

        let mut events = Vec::new();
        for batch in per_calendar {
            events.extend(batch?);
        }
        events.sort_by_key(|e| e.start);

        info!(
            calendars = ids.len(),
            count = events.len(),
            "Fetched calendar events"
        );
        Ok(events)
    }
}

// ── Payload conversion ──────────────────────────────────────────────

fn convert_event(raw: api::Event) -> Result<CalendarEvent, SourceError> {
    let start = parse_when(raw.start.as_ref())?;
    let end = parse_when(raw.end.as_ref())?;

    let mut attendees: Vec<String> = Vec::new();
    for person in raw.attendees {
        let email = person.email.trim();
        if !email.is_empty() && !attendees.iter().any(|a| a.eq_ignore_ascii_case(email)) {
            attendees.push(email.to_string());
        }
    }

    Ok(CalendarEvent {
        summary: raw.summary,
        creator: raw.creator.map(|p| p.email).unwrap_or_default(),
        organizer: raw.organizer.map(|p| p.email).unwrap_or_default(),
        attendees,
        start,
        end,
        description: raw.description,
        location: raw.location,
        context: String::new(),
    })
}

/// Timed events carry `dateTime`; all-day events carry `date` and start at
/// midnight UTC.
fn parse_when(when: Option<&api::When>) -> Result<DateTime<Utc>, SourceError> {
    let parse_err = |reason: String| SourceError::Parse {
        source_name: SOURCE.to_string(),
        reason,
    };

    let when = when.ok_or_else(|| parse_err("event without start/end".into()))?;

    if let Some(dt) = &when.date_time {
        return DateTime::parse_from_rfc3339(dt)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| parse_err(format!("bad dateTime {dt:?}: {e}")));
    }
    if let Some(date) = &when.date {
        return NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
            .map_err(|e| parse_err(format!("bad date {date:?}: {e}")));
    }
    Err(parse_err("event time has neither dateTime nor date".into()))
}
