//! Record and result types for wikirag.
//!
//! These types are the data flowing from dataset to result log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One question from the dataset, normalized across dataset layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    /// Zero-based position in the dataset file
    pub index: usize,

    /// The question text
    pub question: String,

    /// Topic entity identifiers, most relevant first
    pub topic_entity: Vec<String>,
}

impl QuestionRecord {
    /// The entity used as the lookup key. A blank first id counts as missing.
    pub fn primary_entity(&self) -> Option<&str> {
        self.topic_entity
            .first()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
    }
}

/// One persisted line of the result log.
///
/// Field names are the log's wire format; downstream evaluation scripts read
/// `results`, `question` and `topic_entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Generated completion text
    pub results: String,

    /// Original question
    pub question: String,

    /// Topic entity ids in dataset order. An `{id: label}` map in the
    /// dataset is reduced to its ids; labels are not logged.
    pub topic_entity: Vec<String>,
}

impl ResultRecord {
    pub fn new(record: &QuestionRecord, completion: String) -> Self {
        Self {
            results: completion,
            question: record.question.clone(),
            topic_entity: record.topic_entity.clone(),
        }
    }
}

/// Statistics for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Records considered
    pub total_records: usize,

    /// Records appended to the result log
    pub written: usize,

    /// Records skipped after a failure
    pub skipped: usize,

    /// Whole-record retries performed
    pub retries: usize,

    /// Whether the run stopped early on an interrupt
    pub interrupted: bool,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Written records per hour
    pub throughput_per_hour: f64,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_records: 0,
            written: 0,
            skipped: 0,
            retries: 0,
            interrupted: false,
            runtime_secs: 0.0,
            throughput_per_hour: 0.0,
        }
    }
}

impl RunStats {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = self.written as f64 / self.runtime_secs * 3600.0;
        }
    }
}
