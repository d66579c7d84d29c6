//! Shared fixtures for flagbot-review integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flagbot_common::config::{ReviewConfig, SanitizeOrder};
use flagbot_common::db::{init_database, ExternalRef};
use flagbot_common::presenter::Presenter;
use flagbot_common::{Category, Error, Result, ScoreVector, VoteVector};
use flagbot_review::consensus::{ReviewQueue, ReviewSettings};
use flagbot_review::sanitize::SanitizeDesk;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SANITIZE_CHANNEL: i64 = 900;

/// Everything a presenter was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Sent {
        channel_id: i64,
        view: ExternalRef,
        content: String,
    },
    Edited {
        view: ExternalRef,
        content: String,
    },
    Deleted {
        view: ExternalRef,
    },
}

#[derive(Default)]
pub struct RecordingPresenter {
    next_id: AtomicU64,
    events: Mutex<Vec<ViewEvent>>,
    fail_sends: std::sync::atomic::AtomicBool,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn deleted(&self) -> Vec<ExternalRef> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::Deleted { view } => Some(view),
                _ => None,
            })
            .collect()
    }

    /// Views sent to one channel, in send order
    pub fn sent_to(&self, channel_id: i64) -> Vec<(ExternalRef, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ViewEvent::Sent {
                    channel_id: c,
                    view,
                    content,
                } if c == channel_id => Some((view, content)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn render_and_send(
        &self,
        channel_id: i64,
        content: &str,
        _scores: Option<&ScoreVector>,
    ) -> Result<ExternalRef> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transient("presenter offline".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let view = ExternalRef(format!("view-{}", id));
        self.events.lock().unwrap().push(ViewEvent::Sent {
            channel_id,
            view: view.clone(),
            content: content.to_string(),
        });
        Ok(view)
    }

    async fn edit_by_ref(
        &self,
        external_ref: &ExternalRef,
        content: &str,
        _scores: Option<&ScoreVector>,
    ) -> Result<()> {
        self.events.lock().unwrap().push(ViewEvent::Edited {
            view: external_ref.clone(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn delete_by_ref(&self, external_ref: &ExternalRef) -> Result<()> {
        self.events.lock().unwrap().push(ViewEvent::Deleted {
            view: external_ref.clone(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub _dir: TempDir,
    pub queue: Arc<ReviewQueue>,
    pub desk: Arc<SanitizeDesk>,
    pub presenter: Arc<RecordingPresenter>,
}

pub async fn harness(min_votes: u32) -> Harness {
    harness_with_order(min_votes, SanitizeOrder::Fifo).await
}

pub async fn harness_with_order(min_votes: u32, order: SanitizeOrder) -> Harness {
    build_harness(min_votes, order, None).await
}

/// Harness whose decisions are exported to `train.csv` in its temp dir
pub async fn harness_with_export(min_votes: u32) -> Harness {
    build_harness(min_votes, SanitizeOrder::Fifo, Some("train.csv")).await
}

async fn build_harness(min_votes: u32, order: SanitizeOrder, export: Option<&str>) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = init_database(&dir.path().join("flagbot.db")).await.unwrap();
    let presenter = Arc::new(RecordingPresenter::default());

    let settings = ReviewSettings {
        min_votes,
        review_emojis: ReviewConfig::default().review_emojis,
        training_export: export.map(|name| dir.path().join(name)),
    };
    let queue = Arc::new(ReviewQueue::new(db, settings, presenter.clone()));
    let desk = Arc::new(SanitizeDesk::new(
        queue.clone(),
        presenter.clone(),
        SANITIZE_CHANNEL,
        order,
    ));

    Harness {
        _dir: dir,
        queue,
        desk,
        presenter,
    }
}

pub fn scores(insult: f64, threat: f64) -> ScoreVector {
    let mut scores = ScoreVector::new();
    scores.insert(Category::Insult, insult);
    scores.insert(Category::Threat, threat);
    scores
}

pub fn votes(marked: &[Category]) -> VoteVector {
    marked.iter().map(|c| (*c, 1)).collect()
}
