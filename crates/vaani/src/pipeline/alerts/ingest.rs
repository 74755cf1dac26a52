use std::collections::BTreeSet;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::domain::{Opportunity, OpportunityDraft, OpportunityId, ValidationError};
use super::repository::{OpportunityStore, StoreError};
use super::retry::{with_retries, BackoffPolicy};

static OPPORTUNITY_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_opportunity_id() -> OpportunityId {
    let id = OPPORTUNITY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    OpportunityId(format!("opp-{id:06}"))
}

/// Opportunity intake: single records, JSON batches, and CSV uploads.
///
/// Validation happens here at the boundary; stored opportunities are always
/// complete. A malformed record in a batch is logged and skipped while the
/// rest of the batch proceeds.
pub struct IngestService<O> {
    opportunities: Arc<O>,
    retry: BackoffPolicy,
}

/// Outcome of a batch ingestion, listing accepted ids and rejected rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted: Vec<OpportunityId>,
    pub rejected: Vec<RejectedRecord>,
}

/// One rejected batch entry with its position and the full reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub index: usize,
    pub reason: String,
}

impl<O> IngestService<O>
where
    O: OpportunityStore + 'static,
{
    pub fn new(opportunities: Arc<O>) -> Self {
        Self::with_retry_policy(opportunities, BackoffPolicy::default())
    }

    pub fn with_retry_policy(opportunities: Arc<O>, retry: BackoffPolicy) -> Self {
        Self {
            opportunities,
            retry,
        }
    }

    pub fn ingest_one(
        &self,
        draft: OpportunityDraft,
        now: DateTime<Utc>,
    ) -> Result<Opportunity, IngestError> {
        let opportunity = draft.into_opportunity(next_opportunity_id(), now)?;
        with_retries(self.retry, "opportunity_put", || {
            self.opportunities.put(opportunity.clone())
        })?;
        info!(
            opportunity_id = %opportunity.opportunity_id.0,
            deadline = %opportunity.deadline,
            "opportunity ingested"
        );
        Ok(opportunity)
    }

    /// Ingests a batch; validation failures reject the record, store failures
    /// abort the remainder.
    pub fn ingest_batch(
        &self,
        drafts: Vec<OpportunityDraft>,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, StoreError> {
        let mut report = IngestReport::default();
        for (index, draft) in drafts.into_iter().enumerate() {
            match draft.into_opportunity(next_opportunity_id(), now) {
                Ok(opportunity) => {
                    with_retries(self.retry, "opportunity_put", || {
                        self.opportunities.put(opportunity.clone())
                    })?;
                    report.accepted.push(opportunity.opportunity_id);
                }
                Err(validation) => {
                    warn!(index, error = %validation, "batch record rejected");
                    report.rejected.push(RejectedRecord {
                        index,
                        reason: validation.to_string(),
                    });
                }
            }
        }
        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "batch ingestion complete"
        );
        Ok(report)
    }

    /// Ingests a CSV upload with the same partial-batch semantics; rows that
    /// fail to parse are rejected alongside rows that fail validation.
    pub fn ingest_csv<R: Read>(
        &self,
        reader: R,
        now: DateTime<Utc>,
    ) -> Result<IngestReport, StoreError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut report = IngestReport::default();
        for (index, record) in csv_reader.deserialize::<OpportunityRow>().enumerate() {
            let draft = match record {
                Ok(row) => row.into_draft(),
                Err(parse_error) => {
                    warn!(index, error = %parse_error, "csv row unreadable");
                    report.rejected.push(RejectedRecord {
                        index,
                        reason: parse_error.to_string(),
                    });
                    continue;
                }
            };
            match draft.into_opportunity(next_opportunity_id(), now) {
                Ok(opportunity) => {
                    with_retries(self.retry, "opportunity_put", || {
                        self.opportunities.put(opportunity.clone())
                    })?;
                    report.accepted.push(opportunity.opportunity_id);
                }
                Err(validation) => {
                    warn!(index, error = %validation, "csv row rejected");
                    report.rejected.push(RejectedRecord {
                        index,
                        reason: validation.to_string(),
                    });
                }
            }
        }
        info!(
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "csv ingestion complete"
        );
        Ok(report)
    }
}

#[derive(Debug, Deserialize)]
struct OpportunityRow {
    #[serde(rename = "Title", default, deserialize_with = "empty_string_as_none")]
    title: Option<String>,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "Deadline", default, deserialize_with = "empty_string_as_none")]
    deadline: Option<String>,
    #[serde(
        rename = "Application URL",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    application_url: Option<String>,
    #[serde(rename = "Min Age", default, deserialize_with = "empty_string_as_none")]
    min_age: Option<String>,
    #[serde(rename = "Max Age", default, deserialize_with = "empty_string_as_none")]
    max_age: Option<String>,
    #[serde(
        rename = "Min Education",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    min_education: Option<String>,
    #[serde(rename = "Locations", default)]
    locations: String,
    #[serde(rename = "Categories", default)]
    categories: String,
    #[serde(rename = "Source", default)]
    source: String,
}

impl OpportunityRow {
    fn into_draft(self) -> OpportunityDraft {
        OpportunityDraft {
            title: self.title,
            description: self.description,
            deadline: self
                .deadline
                .as_deref()
                .and_then(|value| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()),
            application_url: self.application_url,
            min_age: self.min_age.as_deref().and_then(|value| value.parse().ok()),
            max_age: self.max_age.as_deref().and_then(|value| value.parse().ok()),
            min_education: self.min_education,
            eligible_locations: split_tokens(&self.locations),
            categories: split_tokens(&self.categories),
            source: self.source,
        }
    }
}

fn split_tokens(value: &str) -> BTreeSet<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Error raised by single-record ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
