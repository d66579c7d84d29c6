//! Presentation port
//!
//! The core never talks to a chat platform directly. Anything a human should
//! see (a review view, the sanitize view, the stats summary) goes through a
//! [`Presenter`], which hands back an opaque [`ExternalRef`] for later edits.

use crate::categories::ScoreVector;
use crate::db::models::ExternalRef;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Renders views and delivers them to a channel
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Render `content` (with optional score annotations) and send it
    async fn render_and_send(
        &self,
        channel_id: i64,
        content: &str,
        scores: Option<&ScoreVector>,
    ) -> Result<ExternalRef>;

    /// Replace the content of a previously sent view
    async fn edit_by_ref(
        &self,
        external_ref: &ExternalRef,
        content: &str,
        scores: Option<&ScoreVector>,
    ) -> Result<()>;

    /// Withdraw a previously sent view
    async fn delete_by_ref(&self, external_ref: &ExternalRef) -> Result<()>;
}

/// Plain-text rendering shared by the bundled presenters
pub fn render_view(content: &str, scores: Option<&ScoreVector>) -> String {
    let mut view = content.to_string();
    if let Some(scores) = scores {
        view.push('\n');
        for (category, score) in scores {
            let _ = write!(view, "\n{}: {}%", category, (score * 100.0).round() as i64);
        }
    }
    view
}

/// Presenter that only logs; used when no webhook is configured
#[derive(Debug, Default)]
pub struct LogPresenter;

#[async_trait]
impl Presenter for LogPresenter {
    async fn render_and_send(
        &self,
        channel_id: i64,
        content: &str,
        scores: Option<&ScoreVector>,
    ) -> Result<ExternalRef> {
        let external_ref = ExternalRef(format!("log-{}", Uuid::new_v4()));
        info!(
            channel_id,
            external_ref = %external_ref,
            view = %render_view(content, scores),
            "View sent"
        );
        Ok(external_ref)
    }

    async fn edit_by_ref(
        &self,
        external_ref: &ExternalRef,
        content: &str,
        scores: Option<&ScoreVector>,
    ) -> Result<()> {
        info!(
            external_ref = %external_ref,
            view = %render_view(content, scores),
            "View edited"
        );
        Ok(())
    }

    async fn delete_by_ref(&self, external_ref: &ExternalRef) -> Result<()> {
        info!(external_ref = %external_ref, "View deleted");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ViewRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<i64>,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scores: Option<&'a ScoreVector>,
}

#[derive(Debug, Deserialize)]
struct ViewResponse {
    id: String,
}

/// Presenter backed by an HTTP relay
///
/// `POST {base}/views` creates a view and answers `{"id": ...}`;
/// `PATCH` and `DELETE` on `{base}/views/{id}` edit and withdraw it.
pub struct WebhookPresenter {
    http_client: reqwest::Client,
    base_url: String,
}

impl WebhookPresenter {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn view_url(&self, external_ref: &ExternalRef) -> String {
        format!("{}/views/{}", self.base_url, external_ref)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            Err(Error::Transient(format!("Presenter returned {}: {}", status, body)))
        } else if status.as_u16() == 404 {
            Err(Error::NotFound(format!("View not found: {}", body)))
        } else {
            Err(Error::Internal(format!("Presenter returned {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl Presenter for WebhookPresenter {
    async fn render_and_send(
        &self,
        channel_id: i64,
        content: &str,
        scores: Option<&ScoreVector>,
    ) -> Result<ExternalRef> {
        let request = ViewRequest {
            channel_id: Some(channel_id),
            content: render_view(content, scores),
            scores,
        };

        let response = self
            .http_client
            .post(format!("{}/views", self.base_url))
            .json(&request)
            .send()
            .await?;
        let view: ViewResponse = Self::check(response).await?.json().await?;

        debug!(channel_id, view_id = %view.id, "View sent");
        Ok(ExternalRef(view.id))
    }

    async fn edit_by_ref(
        &self,
        external_ref: &ExternalRef,
        content: &str,
        scores: Option<&ScoreVector>,
    ) -> Result<()> {
        let request = ViewRequest {
            channel_id: None,
            content: render_view(content, scores),
            scores,
        };

        let response = self
            .http_client
            .patch(self.view_url(external_ref))
            .json(&request)
            .send()
            .await?;
        Self::check(response).await?;

        debug!(view_id = %external_ref, "View edited");
        Ok(())
    }

    async fn delete_by_ref(&self, external_ref: &ExternalRef) -> Result<()> {
        let response = self
            .http_client
            .delete(self.view_url(external_ref))
            .send()
            .await?;
        Self::check(response).await?;

        debug!(view_id = %external_ref, "View deleted");
        Ok(())
    }
}
