//! Reaction cleanup against the chat platform's REST API

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use flagbot_common::db::ExternalRef;
use flagbot_common::{Error, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Url;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Reactor lookups are capped at this many users per job
pub const REACTION_USER_LIMIT: u32 = 10;

/// Operations the `delete_reactions` job needs
#[async_trait]
pub trait ReactionApi: Send + Sync {
    /// Up to `limit` user ids that reacted with `emoji`
    async fn reaction_users(
        &self,
        channel_id: i64,
        message_ref: &ExternalRef,
        emoji: &str,
        limit: u32,
    ) -> Result<Vec<i64>>;

    async fn remove_reaction(
        &self,
        channel_id: i64,
        message_ref: &ExternalRef,
        emoji: &str,
        user_id: i64,
    ) -> Result<()>;
}

/// Credentials start with the base64-encoded id of the account they belong to
pub fn account_id(credential: &str) -> Result<i64> {
    let engine = GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    );

    let head = credential.split('.').next().unwrap_or_default();
    let decoded = engine
        .decode(head)
        .map_err(|e| Error::Config(format!("Credential does not start with an account id: {}", e)))?;
    let text = String::from_utf8(decoded)
        .map_err(|_| Error::Config("Credential account id is not UTF-8".to_string()))?;

    text.parse()
        .map_err(|_| Error::Config(format!("Credential account id {:?} is not numeric", text)))
}

#[derive(Debug, Deserialize)]
struct ReactionUser {
    id: String,
}

/// REST client for one claimed identity, throttled by a token bucket
pub struct HttpReactionApi {
    http_client: reqwest::Client,
    base_url: Url,
    credential: String,
    limiter: DefaultDirectRateLimiter,
}

impl HttpReactionApi {
    pub fn new(base_url: &str, credential: String, requests_per_second: u32) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid worker.api_base_url: {}", e)))?;
        let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| {
            Error::Config("worker.requests_per_second must be at least 1".to_string())
        })?;

        Ok(Self {
            http_client,
            base_url,
            credential,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    /// `{base}/channels/{c}/messages/{m}/reactions/{emoji}[/{rest}]`, each
    /// segment percent-encoded
    fn reaction_url(
        &self,
        channel_id: i64,
        message_ref: &ExternalRef,
        emoji: &str,
        rest: Option<&str>,
    ) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config("worker.api_base_url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.extend([
                "channels",
                &channel_id.to_string(),
                "messages",
                message_ref.as_str(),
                "reactions",
                emoji,
            ]);
            if let Some(rest) = rest {
                segments.push(rest);
            }
        }
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            Err(Error::Transient(format!("Chat API returned {}: {}", status, body)))
        } else if status.as_u16() == 404 {
            Err(Error::NotFound(format!("Reaction target gone: {}", body)))
        } else {
            Err(Error::Internal(format!("Chat API returned {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl ReactionApi for HttpReactionApi {
    async fn reaction_users(
        &self,
        channel_id: i64,
        message_ref: &ExternalRef,
        emoji: &str,
        limit: u32,
    ) -> Result<Vec<i64>> {
        let mut url = self.reaction_url(channel_id, message_ref, emoji, None)?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());

        self.limiter.until_ready().await;
        let response = self
            .http_client
            .get(url)
            .header("Authorization", format!("Bot {}", self.credential))
            .send()
            .await?;
        let users: Vec<ReactionUser> = Self::check(response).await?.json().await?;

        Ok(users.into_iter().filter_map(|u| u.id.parse().ok()).collect())
    }

    async fn remove_reaction(
        &self,
        channel_id: i64,
        message_ref: &ExternalRef,
        emoji: &str,
        user_id: i64,
    ) -> Result<()> {
        let url = self.reaction_url(channel_id, message_ref, emoji, Some(&user_id.to_string()))?;

        self.limiter.until_ready().await;
        let response = self
            .http_client
            .delete(url)
            .header("Authorization", format!("Bot {}", self.credential))
            .send()
            .await?;
        Self::check(response).await?;

        debug!(channel_id, message = %message_ref, user_id, "Reaction removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_from_credential() {
        // "123456789012345678"
        let credential = "MTIzNDU2Nzg5MDEyMzQ1Njc4.GhIjKl.secret";
        assert_eq!(account_id(credential).unwrap(), 123456789012345678);
    }

    #[test]
    fn test_malformed_credential_is_config_error() {
        assert!(matches!(account_id("not base64!.x"), Err(Error::Config(_))));
        // Valid base64, but not a number
        assert!(matches!(account_id("aGVsbG8.x"), Err(Error::Config(_))));
    }

    #[test]
    fn test_reaction_url_encodes_emoji() {
        let api = HttpReactionApi::new("https://chat.example/api/v10/", "t".to_string(), 5).unwrap();
        let url = api
            .reaction_url(1, &ExternalRef("2".to_string()), "✅", Some("3"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://chat.example/api/v10/channels/1/messages/2/reactions/%E2%9C%85/3"
        );
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(matches!(
            HttpReactionApi::new("https://chat.example", "t".to_string(), 0),
            Err(Error::Config(_))
        ));
    }
}
