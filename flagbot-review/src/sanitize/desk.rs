//! The sanitize desk: one live session, the rest waiting in the store
//!
//! Pending requests are not held in memory. Any item that is active and
//! `in_sanitize` is waiting, so requests survive a restart and `restore`
//! simply reopens the next one.

use flagbot_common::config::SanitizeOrder;
use flagbot_common::db::{ActiveAssignment, ExternalRef};
use flagbot_common::presenter::Presenter;
use flagbot_common::Result;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::session::{SanitizeMode, SanitizeSession, SanitizeStep};
use crate::consensus::ReviewQueue;
use crate::db::review_items;

struct LiveSession {
    session: SanitizeSession,
    view: Option<ExternalRef>,
}

/// Public view of the live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub review_item_id: i64,
    pub mode: SanitizeMode,
    pub working: String,
}

impl LiveSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            review_item_id: self.session.review_item_id(),
            mode: self.session.mode(),
            working: self.session.working().to_string(),
        }
    }
}

/// Result of feeding input to the live session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputOutcome {
    pub step: SanitizeStep,
    pub session: SessionSnapshot,
}

pub struct SanitizeDesk {
    queue: Arc<ReviewQueue>,
    presenter: Arc<dyn Presenter>,
    channel_id: i64,
    order: SanitizeOrder,
    live: Mutex<Option<LiveSession>>,
}

impl SanitizeDesk {
    pub fn new(
        queue: Arc<ReviewQueue>,
        presenter: Arc<dyn Presenter>,
        channel_id: i64,
        order: SanitizeOrder,
    ) -> Self {
        Self {
            queue,
            presenter,
            channel_id,
            order,
            live: Mutex::new(None),
        }
    }

    /// Send an item a reviewer holds to the desk
    ///
    /// `None` when the reviewer does not hold the item (stale request).
    pub async fn request(
        &self,
        review_item_id: i64,
        reviewer_id: i64,
    ) -> Result<Option<Vec<ActiveAssignment>>> {
        let affected = self
            .queue
            .handle_sanitize_request(review_item_id, reviewer_id)
            .await?;

        if affected.is_some() {
            let mut live = self.live.lock().await;
            if live.is_none() {
                *live = self.open_next().await?;
            }
        }
        Ok(affected)
    }

    /// Open a session for a waiting item if none is live (e.g. after restart)
    pub async fn restore(&self) -> Result<Option<SessionSnapshot>> {
        let mut live = self.live.lock().await;
        if live.is_none() {
            *live = self.open_next().await?;
        }
        Ok(live.as_ref().map(LiveSession::snapshot))
    }

    pub async fn current(&self) -> Option<SessionSnapshot> {
        self.live.lock().await.as_ref().map(LiveSession::snapshot)
    }

    /// Feed reviewer input to the live session; `None` when the desk is idle
    pub async fn input(&self, text: &str) -> Result<Option<InputOutcome>> {
        let mut live = self.live.lock().await;
        let Some(current) = live.as_mut() else {
            return Ok(None);
        };

        let step = current.session.apply(text);
        debug!(
            review_item_id = current.session.review_item_id(),
            step = ?step,
            "Sanitize input applied"
        );

        if let Some(view) = &current.view {
            let rendered = current.session.render(Some(step));
            if let Err(e) = self.presenter.edit_by_ref(view, &rendered, None).await {
                warn!(view = %view, error = %e, "Could not update sanitize view");
            }
        }

        Ok(Some(InputOutcome {
            step,
            session: current.snapshot(),
        }))
    }

    /// Commit the working content and move on; returns the approved item id
    pub async fn approve(&self) -> Result<Option<i64>> {
        let mut live = self.live.lock().await;
        let Some(current) = live.take() else {
            return Ok(None);
        };

        let review_item_id = current.session.review_item_id();
        let committed = self
            .queue
            .approve_sanitize(review_item_id, current.session.working())
            .await;
        if let Err(e) = committed {
            *live = Some(current);
            return Err(e);
        }

        self.close_view(&current).await;
        *live = self.open_next().await?;
        Ok(Some(review_item_id))
    }

    /// Drop the item for good and move on; returns the rejected item id
    pub async fn reject(&self) -> Result<Option<i64>> {
        let mut live = self.live.lock().await;
        let Some(current) = live.take() else {
            return Ok(None);
        };

        let review_item_id = current.session.review_item_id();
        let dropped = self.queue.reject_sanitize(review_item_id).await;
        if let Err(e) = dropped {
            *live = Some(current);
            return Err(e);
        }

        self.close_view(&current).await;
        *live = self.open_next().await?;
        Ok(Some(review_item_id))
    }

    async fn close_view(&self, live: &LiveSession) {
        if let Some(view) = &live.view {
            if let Err(e) = self.presenter.delete_by_ref(view).await {
                warn!(view = %view, error = %e, "Could not delete sanitize view");
            }
        }
    }

    /// Start a session for the next waiting item, in the configured order
    async fn open_next(&self) -> Result<Option<LiveSession>> {
        let Some(item) = review_items::next_pending_sanitize(self.queue.db(), self.order).await?
        else {
            debug!("Sanitize desk idle");
            return Ok(None);
        };

        let session = SanitizeSession::new(item.id, item.clean_content);
        let view = match self
            .presenter
            .render_and_send(self.channel_id, &session.render(None), None)
            .await
        {
            Ok(view) => Some(view),
            Err(e) => {
                warn!(review_item_id = item.id, error = %e, "Could not send sanitize view");
                None
            }
        };

        info!(review_item_id = item.id, "Sanitize session opened");
        Ok(Some(LiveSession { session, view }))
    }
}
