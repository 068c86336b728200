//! Calendar briefing: attaches related email context to upcoming events.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::summarizer::Summarizer;
use super::threads::{DEFAULT_MAX_THREADS_PER_ATTENDEE, ThreadAggregator};
use super::types::{CalendarBriefing, CalendarEvent, CalendarSource, EventWindow, MailSource};
use crate::error::PipelineError;
use crate::llm::{CostAccountant, LlmProvider};
use crate::sources::email_types::address_of;

/// Calendar briefing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BriefingConfig {
    /// The user's own address, left out of attendee lists.
    pub self_email: Option<String>,
    /// Whole days before today included in the window.
    pub days_before: i64,
    /// Whole days after today included in the window.
    pub days_after: i64,
    pub max_threads_per_attendee: usize,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            self_email: None,
            days_before: 2,
            days_after: 0,
            max_threads_per_attendee: DEFAULT_MAX_THREADS_PER_ATTENDEE,
        }
    }
}

pub struct CalendarBriefer {
    calendar: Arc<dyn CalendarSource>,
    aggregator: ThreadAggregator,
    summarizer: Summarizer,
    config: BriefingConfig,
}

impl CalendarBriefer {
    pub fn new(
        calendar: Arc<dyn CalendarSource>,
        mail: Arc<dyn MailSource>,
        llm: Arc<dyn LlmProvider>,
        config: BriefingConfig,
    ) -> Self {
        Self {
            calendar,
            aggregator: ThreadAggregator::new(mail, config.max_threads_per_attendee),
            summarizer: Summarizer::new(llm),
            config,
        }
    }

    /// Fetch events in the configured window and fill in each event's
    /// `context` from threads shared by its attendees.
    ///
    /// Calendar, mail and LLM failures are all fatal to the batch. Output
    /// order equals fetch order.
    pub async fn run_calendar_briefing(
        &self,
        self_email: Option<&str>,
    ) -> Result<(CalendarBriefing, Decimal), PipelineError> {
        let window = event_window(Local::now(), self.config.days_before, self.config.days_after);
        let events = self.calendar.fetch_events(window).await?;
        info!(
            count = events.len(),
            start = %window.start,
            end = %window.end,
            "Starting calendar briefing"
        );

        let briefed = join_all(events.into_iter().map(|e| self.brief_event(e, self_email)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let mut costs = CostAccountant::new();
        let mut events = Vec::with_capacity(briefed.len());
        for (event, cost) in briefed {
            if let Some(cost) = cost {
                costs.add(cost);
            }
            events.push(event);
        }

        info!(
            events = events.len(),
            with_context = events.iter().filter(|e| !e.context.is_empty()).count(),
            cost = %costs.total(),
            "Calendar briefing complete"
        );
        Ok((CalendarBriefing { events }, costs.total()))
    }

    async fn brief_event(
        &self,
        mut event: CalendarEvent,
        self_email: Option<&str>,
    ) -> Result<(CalendarEvent, Option<Decimal>), PipelineError> {
        let attendees = others(&event.attendees, self_email);
        let threads = self.aggregator.threads_for_attendees(&attendees).await?;
        if threads.is_empty() {
            debug!(event = %event.summary, "No shared threads");
            return Ok((event, None));
        }

        let (context, cost) = self
            .summarizer
            .summarize_threads(&threads, &attendees)
            .await?;
        debug!(event = %event.summary, threads = threads.len(), "Attached thread context");
        event.context = context;
        Ok((event, Some(cost)))
    }
}

/// Attendees other than `self_email`, compared case-insensitively.
fn others(attendees: &[String], self_email: Option<&str>) -> Vec<String> {
    let me = self_email.map(|s| address_of(s).to_ascii_lowercase());
    attendees
        .iter()
        .filter(|a| me.as_deref() != Some(address_of(a).to_ascii_lowercase().as_str()))
        .cloned()
        .collect()
}

/// From local midnight `days_before` days ago to the end of the day
/// `days_after` days ahead.
pub fn event_window(now: DateTime<Local>, days_before: i64, days_after: i64) -> EventWindow {
    let today = now.date_naive();
    let at_midnight = |date: chrono::NaiveDate| {
        date.and_time(NaiveTime::MIN)
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc())
    };

    EventWindow {
        start: at_midnight(today - Duration::days(days_before)),
        end: at_midnight(today + Duration::days(days_after + 1)),
    }
}
