//! Thread aggregator: finds email threads shared by several attendees.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use super::types::{EmailThread, MailSource};
use crate::error::SourceError;
use crate::sources::email_types::address_of;

/// Default per-attendee thread bound.
pub const DEFAULT_MAX_THREADS_PER_ATTENDEE: usize = 10;

/// A thread together with the requested attendees that took part in it.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedThread {
    pub thread: EmailThread,
    /// Normalized attendee addresses, in request order.
    pub covered: Vec<String>,
}

/// Collects threads per attendee and keeps the ones that connect more than
/// one of them.
pub struct ThreadAggregator {
    mail: Arc<dyn MailSource>,
    max_threads_per_attendee: usize,
}

impl ThreadAggregator {
    pub fn new(mail: Arc<dyn MailSource>, max_threads_per_attendee: usize) -> Self {
        Self {
            mail,
            max_threads_per_attendee,
        }
    }

    /// Threads covering at least two of `attendees`, most-covering first.
    ///
    /// Any failed attendee lookup fails the whole aggregation.
    pub async fn threads_for_attendees(
        &self,
        attendees: &[String],
    ) -> Result<Vec<RankedThread>, SourceError> {
        let attendees = normalize_attendees(attendees);
        if attendees.len() < 2 {
            return Ok(Vec::new());
        }

        let lookups = attendees
            .iter()
            .map(|a| self.mail.fetch_threads(a, self.max_threads_per_attendee));
        let per_attendee: Vec<Vec<EmailThread>> = join_all(lookups)
            .await
            .into_iter()
            .collect::<Result<_, _>>()?;

        let ranked = rank_threads(&attendees, per_attendee);
        debug!(
            attendees = attendees.len(),
            threads = ranked.len(),
            "Aggregated attendee threads"
        );
        Ok(ranked)
    }
}

/// Lower-cased addresses, de-duplicated in first-seen order.
fn normalize_attendees(attendees: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    attendees
        .iter()
        .map(|a| address_of(a).to_ascii_lowercase())
        .filter(|a| !a.is_empty() && seen.insert(a.clone()))
        .collect()
}

/// Union threads by id in discovery order, keep those covering more than
/// one attendee, and sort by coverage. The sort is stable, so equal
/// coverage keeps discovery order.
pub fn rank_threads(
    attendees: &[String],
    per_attendee: Vec<Vec<EmailThread>>,
) -> Vec<RankedThread> {
    let mut seen = HashSet::new();
    let mut unique: Vec<EmailThread> = Vec::new();
    for thread in per_attendee.into_iter().flatten() {
        if seen.insert(thread.id.clone()) {
            unique.push(thread);
        }
    }

    let mut ranked: Vec<RankedThread> = unique
        .into_iter()
        .filter_map(|thread| {
            let participants = thread.participants();
            let covered: Vec<String> = attendees
                .iter()
                .filter(|a| participants.contains(a.as_str()))
                .cloned()
                .collect();
            (covered.len() > 1).then_some(RankedThread { thread, covered })
        })
        .collect();

    sort_by_coverage(&mut ranked);
    ranked
}

/// Most-covering threads first; stable for equal coverage.
pub fn sort_by_coverage(threads: &mut [RankedThread]) {
    threads.sort_by(|a, b| b.covered.len().cmp(&a.covered.len()));
}
