//! Classifier port and the ingest path
//!
//! Classification is synchronous and may be slow, so ingest always runs it on
//! the blocking pool and awaits the result.

use flagbot_common::categories::{is_flagged, Category, ScoreVector};
use flagbot_common::config::ReviewConfig;
use flagbot_common::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::consensus::ReviewQueue;
use crate::text::TextCleaner;

/// Scores text per category; must be free of side effects
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<ScoreVector>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

/// Classifier served over HTTP: `POST {url}` with `{"text": ...}` answers a
/// JSON object of category name to probability
pub struct HttpClassifier {
    http_client: reqwest::blocking::Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

impl Classifier for HttpClassifier {
    fn classify(&self, text: &str) -> Result<ScoreVector> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&ClassifyRequest { text })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transient(format!("Classifier returned {}", status)));
        }

        let raw: BTreeMap<String, f64> = response.json()?;
        let mut scores = ScoreVector::new();
        for (name, score) in raw {
            match name.parse::<Category>() {
                Ok(category) => {
                    scores.insert(category, score);
                }
                Err(_) => debug!(category = %name, "Ignoring unknown classifier category"),
            }
        }
        Ok(scores)
    }
}

/// What happened to an incoming message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Channel not scanned, or nothing reviewable left after cleaning
    Ignored,
    /// Classified below the flag threshold
    NotFlagged,
    /// Queued for human review
    Queued { review_item_id: i64 },
    /// Below the flag threshold but drawn into review as a control sample
    Sampled { review_item_id: i64 },
}

/// Why a scored message enters review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Flagged,
    Sampled,
}

impl Admission {
    /// Decide admission for one score vector; `None` keeps it out of review
    pub fn for_scores(scores: &ScoreVector, flag_threshold: f64, sample_rate: f64) -> Option<Self> {
        if is_flagged(scores, flag_threshold) {
            return Some(Admission::Flagged);
        }
        if sample_rate > 0.0 && rand::thread_rng().gen_bool(sample_rate.min(1.0)) {
            return Some(Admission::Sampled);
        }
        None
    }

    pub fn outcome(self, review_item_id: i64) -> IngestOutcome {
        match self {
            Admission::Flagged => IngestOutcome::Queued { review_item_id },
            Admission::Sampled => IngestOutcome::Sampled { review_item_id },
        }
    }
}

/// Settings that decide whether and how a message is ingested
pub struct IngestSettings {
    pub flag_threshold: f64,
    pub sample_rate: f64,
    pub scan_channels: Vec<i64>,
    pub blacklist: Vec<String>,
    pub cleaner: TextCleaner,
}

impl IngestSettings {
    pub fn from_config(review: &ReviewConfig) -> Result<Self> {
        Ok(Self {
            flag_threshold: review.flag_threshold,
            sample_rate: review.sample_rate,
            scan_channels: review.scan_channels.clone(),
            blacklist: review.blacklist.clone(),
            cleaner: TextCleaner::new(&review.blacklist)?,
        })
    }

    /// An empty scan list means every channel is scanned
    pub fn scans(&self, channel_id: i64) -> bool {
        self.scan_channels.is_empty() || self.scan_channels.contains(&channel_id)
    }
}

/// Run the classifier off the async runtime
pub async fn classify_blocking(classifier: Arc<dyn Classifier>, text: String) -> Result<ScoreVector> {
    tokio::task::spawn_blocking(move || classifier.classify(&text))
        .await
        .map_err(|e| Error::Internal(format!("Classifier task failed: {}", e)))?
}

/// Clean, classify and (if flagged or sampled) queue one message
pub async fn ingest_message(
    queue: &ReviewQueue,
    classifier: Arc<dyn Classifier>,
    flag_threshold: f64,
    sample_rate: f64,
    content: &str,
    clean_content: &str,
) -> Result<IngestOutcome> {
    if clean_content.is_empty() {
        debug!("Message has nothing reviewable after cleaning");
        return Ok(IngestOutcome::Ignored);
    }

    let scores = classify_blocking(classifier, content.to_string()).await?;
    let Some(admission) = Admission::for_scores(&scores, flag_threshold, sample_rate) else {
        return Ok(IngestOutcome::NotFlagged);
    };

    let review_item_id = queue.submit_cleaned(content, clean_content, &scores).await?;
    info!(review_item_id, ?admission, "Message queued for review");
    Ok(admission.outcome(review_item_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    impl Classifier for Fixed {
        fn classify(&self, _text: &str) -> Result<ScoreVector> {
            let mut scores = ScoreVector::new();
            scores.insert(Category::Insult, self.0);
            Ok(scores)
        }
    }

    #[tokio::test]
    async fn test_classify_runs_on_blocking_pool() {
        let scores = classify_blocking(Arc::new(Fixed(0.75)), "text".to_string())
            .await
            .unwrap();
        assert_eq!(scores[&Category::Insult], 0.75);
    }

    #[test]
    fn test_admission_by_threshold_and_sample_rate() {
        let mut low = ScoreVector::new();
        low.insert(Category::Insult, 0.1);
        let mut high = ScoreVector::new();
        high.insert(Category::Insult, 0.9);

        assert_eq!(Admission::for_scores(&high, 0.5, 0.0), Some(Admission::Flagged));
        assert_eq!(Admission::for_scores(&high, 0.5, 1.0), Some(Admission::Flagged));
        assert_eq!(Admission::for_scores(&low, 0.5, 1.0), Some(Admission::Sampled));
        assert_eq!(Admission::for_scores(&low, 0.5, 0.0), None);
    }

    #[test]
    fn test_sampled_outcome_is_tagged() {
        let value = serde_json::to_value(Admission::Sampled.outcome(4)).unwrap();
        assert_eq!(value, serde_json::json!({"status": "sampled", "review_item_id": 4}));
    }

    #[test]
    fn test_empty_scan_list_scans_everything() {
        let mut review = ReviewConfig::default();
        let settings = IngestSettings::from_config(&review).unwrap();
        assert!(settings.scans(99));

        review.scan_channels = vec![1];
        let settings = IngestSettings::from_config(&review).unwrap();
        assert!(settings.scans(1));
        assert!(!settings.scans(2));
    }
}
