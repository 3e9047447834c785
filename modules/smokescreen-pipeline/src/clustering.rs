//! Article clustering: the oracle groups articles into event descriptors,
//! this side validates them and maps article indices back to the full batch.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use smokescreen_common::{AffectedPopulation, Article, MechanismOfHarm, Scope, SmokescreenError};

use crate::oracle::{strip_code_blocks, Oracle};

/// A validated event candidate. `article_indices` index into the article
/// slice handed to [`EventClusterer::cluster`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventDescriptor {
    pub title: String,
    pub event_date: Option<NaiveDate>,
    pub summary: String,
    pub mechanism: Option<MechanismOfHarm>,
    pub scope: Option<Scope>,
    pub population: Option<AffectedPopulation>,
    pub actors: Vec<String>,
    pub institution: Option<String>,
    pub topic_tags: Vec<String>,
    pub article_indices: Vec<usize>,
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    title: String,
    #[serde(default)]
    event_date: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    mechanism_of_harm: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    affected_population: Option<String>,
    #[serde(default)]
    actors: Vec<String>,
    #[serde(default)]
    institution: Option<String>,
    #[serde(default)]
    topic_tags: Vec<String>,
    article_indices: Vec<i64>,
    #[serde(default)]
    confidence: Option<f64>,
}

impl RawDescriptor {
    fn validate(self, batch_len: usize) -> Option<EventDescriptor> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }

        let mut article_indices: Vec<usize> = self
            .article_indices
            .into_iter()
            .filter_map(|i| usize::try_from(i).ok())
            .filter(|&i| i < batch_len)
            .collect();
        article_indices.sort_unstable();
        article_indices.dedup();
        if article_indices.is_empty() {
            return None;
        }

        let confidence = self
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        Some(EventDescriptor {
            title,
            event_date: self
                .event_date
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
            summary: self.summary.unwrap_or_default().trim().to_string(),
            mechanism: self.mechanism_of_harm.as_deref().and_then(MechanismOfHarm::from_tag),
            scope: self.scope.as_deref().and_then(Scope::from_tag),
            population: self
                .affected_population
                .as_deref()
                .and_then(AffectedPopulation::from_tag),
            actors: non_empty(self.actors),
            institution: self
                .institution
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            topic_tags: non_empty(self.topic_tags),
            article_indices,
            confidence,
        })
    }
}

fn non_empty(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Descriptors parsed from one oracle reply, plus how many were dropped.
#[derive(Debug, Default)]
pub struct ParsedDescriptors {
    pub descriptors: Vec<EventDescriptor>,
    pub dropped: usize,
}

/// Parse a clustering reply for a batch of `batch_len` articles.
///
/// Anything that is not a JSON array is an `OracleParse` error. Individual
/// elements that are malformed, untitled, or left with no in-range article
/// index are dropped and counted.
pub fn parse_descriptors(raw: &str, batch_len: usize) -> Result<ParsedDescriptors, SmokescreenError> {
    let elements: Vec<serde_json::Value> = serde_json::from_str(strip_code_blocks(raw))
        .map_err(|e| SmokescreenError::OracleParse(format!("clustering response: {e}")))?;

    let mut parsed = ParsedDescriptors::default();
    for element in elements {
        let descriptor = serde_json::from_value::<RawDescriptor>(element)
            .ok()
            .and_then(|r| r.validate(batch_len));
        match descriptor {
            Some(d) => parsed.descriptors.push(d),
            None => parsed.dropped += 1,
        }
    }
    Ok(parsed)
}

/// Result of one batch, kept for the run log.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub batch: usize,
    /// Position of the batch's first article in the clustered slice.
    pub offset: usize,
    pub articles: usize,
    pub descriptors: usize,
    pub dropped: usize,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct ClusterOutcome {
    pub descriptors: Vec<EventDescriptor>,
    pub batches: Vec<BatchReport>,
}

impl ClusterOutcome {
    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.batches.iter().filter_map(|b| b.error.as_deref())
    }
}

pub struct EventClusterer {
    oracle: Arc<dyn Oracle>,
    batch_size: usize,
}

impl EventClusterer {
    pub fn new(oracle: Arc<dyn Oracle>, batch_size: usize) -> Self {
        Self {
            oracle,
            batch_size: batch_size.max(1),
        }
    }

    /// Cluster `articles` in batches. A failed batch is reported and its
    /// articles stay unassigned for the next run; other batches proceed.
    pub async fn cluster(&self, articles: &[Article], existing_titles: &[String]) -> ClusterOutcome {
        let mut outcome = ClusterOutcome::default();

        for (batch, chunk) in articles.chunks(self.batch_size).enumerate() {
            let offset = batch * self.batch_size;

            let parsed = match self.oracle.cluster_articles(chunk, existing_titles).await {
                Ok(raw) => parse_descriptors(&raw, chunk.len()),
                Err(e) => Err(SmokescreenError::Anyhow(e)),
            };

            match parsed {
                Ok(parsed) => {
                    info!(
                        batch,
                        articles = chunk.len(),
                        descriptors = parsed.descriptors.len(),
                        dropped = parsed.dropped,
                        "Clustered article batch"
                    );
                    outcome.batches.push(BatchReport {
                        batch,
                        offset,
                        articles: chunk.len(),
                        descriptors: parsed.descriptors.len(),
                        dropped: parsed.dropped,
                        error: None,
                    });
                    outcome
                        .descriptors
                        .extend(parsed.descriptors.into_iter().map(|mut d| {
                            for i in &mut d.article_indices {
                                *i += offset;
                            }
                            d
                        }));
                }
                Err(e) => {
                    warn!(batch, error = %e, "Clustering batch failed");
                    outcome.batches.push(BatchReport {
                        batch,
                        offset,
                        articles: chunk.len(),
                        descriptors: 0,
                        dropped: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcome
    }
}
