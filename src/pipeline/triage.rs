//! Email triage orchestrator.
//!
//! fetch → classify (concurrent) → partition → summarize personal and news
//! (concurrent) → attach summaries → total cost.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use super::classifier::Classifier;
use super::summarizer::Summarizer;
use super::types::{Classification, EmailTriageResult, MailSource, TriageOutcome};
use crate::error::PipelineError;
use crate::llm::{CostAccountant, LlmProvider};

/// Classifies and summarizes the last day of mail.
pub struct TriagePipeline {
    mail: Arc<dyn MailSource>,
    classifier: Classifier,
    summarizer: Summarizer,
}

impl TriagePipeline {
    pub fn new(mail: Arc<dyn MailSource>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            mail,
            classifier: Classifier::new(llm.clone()),
            summarizer: Summarizer::new(llm),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Triage everything received since the start of yesterday (local time).
    pub async fn run_email_triage(&self) -> Result<TriageOutcome, PipelineError> {
        self.triage_since(previous_day_start(Local::now())).await
    }

    /// Triage everything received since `since`.
    pub async fn triage_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<TriageOutcome, PipelineError> {
        let mut messages = self.mail.fetch_recent_messages(since).await?;
        info!(count = messages.len(), since = %since, "Starting email triage");

        let mut costs = CostAccountant::new();

        // Classify every message; one failure fails the batch.
        let labels: Vec<Classification> =
            join_all(messages.iter().map(|m| self.classifier.classify(m)))
                .await
                .into_iter()
                .map(|result| {
                    result.map(|(label, cost)| {
                        costs.add(cost);
                        label
                    })
                })
                .collect::<Result<_, _>>()?;

        for (message, label) in messages.iter_mut().zip(&labels) {
            message.classification = Some(*label);
        }

        // Summarize the useful ones with the variant matching their label.
        let useful: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| matches!(label, Classification::Personal | Classification::News))
            .map(|(i, _)| i)
            .collect();

        let summaries = join_all(
            useful
                .iter()
                .map(|&i| self.summarizer.summarize(&messages[i], labels[i])),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        let (summaries, summary_costs): (Vec<_>, Vec<_>) = summaries.into_iter().unzip();
        costs.extend(summary_costs);
        for (&i, summary) in useful.iter().zip(summaries) {
            messages[i].summary = summary;
        }

        // Partition, preserving fetch order.
        let mut result = EmailTriageResult::default();
        let mut excluded = Vec::new();
        for message in messages {
            match message.classification {
                Some(Classification::Personal) => result.personal.push(message),
                Some(Classification::News) => result.news.push(message),
                Some(Classification::Spam) => result.spam.push(message),
                Some(Classification::Unclassified) | None => {
                    warn!(id = %message.id, subject = %message.subject, "Message left unclassified");
                    excluded.push(message.id);
                }
            }
        }

        info!(
            personal = result.personal.len(),
            news = result.news.len(),
            spam = result.spam.len(),
            excluded = excluded.len(),
            llm_calls = costs.calls(),
            cost = %costs.total(),
            "Email triage complete"
        );

        Ok(TriageOutcome {
            result,
            excluded,
            cost: costs.total(),
        })
    }
}

/// Midnight at the start of the previous local day, in UTC.
pub fn previous_day_start(now: DateTime<Local>) -> DateTime<Utc> {
    let yesterday = now.date_naive() - Duration::days(1);
    yesterday
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc) - Duration::days(1))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rust_decimal::Decimal;

    use super::*;
    use crate::error::LlmError;
    use crate::pipeline::testing::{ScriptedLlm, StubMail, call_cost, user_text};
    use crate::pipeline::types::{Message, Summary};
    use crate::pipeline::types::fixtures::message;

    /// Label by subject keyword; summaries echo the subject.
    fn scripted() -> ScriptedLlm {
        ScriptedLlm::new(|request| {
            let text = user_text(request);
            match request.prefill() {
                Some("<category>") => Ok(if text.contains("Subject: personal") {
                    "personal"
                } else if text.contains("Subject: news") {
                    "news"
                } else if text.contains("Subject: spam") {
                    "spam"
                } else {
                    "unsure"
                }
                .to_string()),
                Some("<summary>") => {
                    let subject = text
                        .lines()
                        .find_map(|l| l.strip_prefix("Subject: "))
                        .unwrap_or_default();
                    Ok(format!("summary of {subject}"))
                }
                Some("{") => Ok(r#""topic_summaries": ["topic"]}"#.to_string()),
                _ => Err(LlmError::InvalidResponse {
                    provider: "scripted".into(),
                    reason: "unexpected request".into(),
                }),
            }
        })
    }

    fn inbox() -> Vec<Message> {
        vec![
            message("1", "alice@example.com", "personal lunch", "Friday?"),
            message("2", "digest@news.example", "news daily", "headlines"),
            message("3", "deals@shop.example", "spam sale", "50% off"),
            message("4", "robot@ci.example", "build status", "green"),
            message("5", "bob@example.com", "personal trip", "tickets"),
        ]
    }

    async fn run(llm: ScriptedLlm, messages: Vec<Message>) -> (TriageOutcome, Arc<ScriptedLlm>) {
        let llm = Arc::new(llm);
        let mail = Arc::new(StubMail {
            messages,
            ..StubMail::default()
        });
        let pipeline = TriagePipeline::new(mail, llm.clone());
        (pipeline.triage_since(Utc::now()).await.unwrap(), llm)
    }

    fn ids(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn partition_is_disjoint_and_excludes_unclassified() {
        let (outcome, _) = run(scripted(), inbox()).await;
        let result = &outcome.result;

        assert_eq!(ids(&result.personal), vec!["1", "5"]);
        assert_eq!(ids(&result.news), vec!["2"]);
        assert_eq!(ids(&result.spam), vec!["3"]);
        assert_eq!(outcome.excluded, vec!["4"]);

        let mut all = HashSet::new();
        for id in ids(&result.personal)
            .into_iter()
            .chain(ids(&result.news))
            .chain(ids(&result.spam))
        {
            assert!(all.insert(id), "message {id} appears twice");
        }
        assert_eq!(all.len() + outcome.excluded.len(), inbox().len());
    }

    #[tokio::test]
    async fn summaries_attach_to_their_own_message_under_jitter() {
        let messages: Vec<Message> = (0..12)
            .map(|i| message(&i.to_string(), "a@example.com", &format!("personal #{i}"), "body"))
            .collect();
        let (outcome, _) = run(scripted().with_jitter(), messages).await;

        assert_eq!(outcome.result.personal.len(), 12);
        for (i, msg) in outcome.result.personal.iter().enumerate() {
            assert_eq!(msg.id, i.to_string());
            assert_eq!(msg.summary, Summary::Text(format!("summary of personal #{i}")));
            assert_eq!(msg.classification, Some(Classification::Personal));
        }
    }

    #[tokio::test]
    async fn labels_and_summaries_are_written_in_place() {
        let (outcome, _) = run(scripted(), inbox()).await;
        let news = &outcome.result.news[0];
        assert_eq!(news.classification, Some(Classification::News));
        assert_eq!(news.summary, Summary::Topics(vec!["topic".into()]));

        let spam = &outcome.result.spam[0];
        assert_eq!(spam.classification, Some(Classification::Spam));
        assert!(spam.summary.is_empty());
    }

    #[tokio::test]
    async fn cost_is_sum_of_every_call() {
        let (outcome, llm) = run(scripted(), inbox()).await;
        // 5 classifications + 2 personal + 1 news summary.
        assert_eq!(llm.calls(), 8);
        assert_eq!(outcome.cost, call_cost() * Decimal::from(8));
    }

    #[tokio::test]
    async fn empty_inbox_costs_nothing() {
        let (outcome, llm) = run(scripted(), Vec::new()).await;
        assert!(outcome.result.is_empty());
        assert!(outcome.excluded.is_empty());
        assert_eq!(outcome.cost, Decimal::ZERO);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal() {
        let mail = Arc::new(StubMail {
            fail: true,
            ..StubMail::default()
        });
        let pipeline = TriagePipeline::new(mail, Arc::new(scripted()));
        let err = pipeline.triage_since(Utc::now()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
    }

    #[tokio::test]
    async fn classification_failure_fails_the_batch() {
        let llm = ScriptedLlm::new(|_| {
            Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "overloaded".into(),
            })
        });
        let llm = Arc::new(llm);
        let mail = Arc::new(StubMail {
            messages: inbox(),
            ..StubMail::default()
        });
        let pipeline = TriagePipeline::new(mail, llm);
        let err = pipeline.triage_since(Utc::now()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Llm(_)));
    }

    #[test]
    fn previous_day_start_is_local_midnight() {
        let now = Local::now();
        let since = previous_day_start(now).with_timezone(&Local);
        assert_eq!(since.date_naive(), now.date_naive() - Duration::days(1));
        assert_eq!(since.time(), NaiveTime::MIN);
    }
}
