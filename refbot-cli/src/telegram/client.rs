//! Minimal Bot API client over reqwest

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::types::{ApiResponse, GetUpdates, Message, SendMessage, Update};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram API error {code}: {description}")]
    Api { code: i64, description: String },
}

pub type Result<T> = std::result::Result<T, TelegramError>;

/// Bot API endpoint bound to one bot token.
#[derive(Clone)]
pub struct BotApi {
    client: Client,
    base: String,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // base embeds the token
        f.debug_struct("BotApi").finish_non_exhaustive()
    }
}

impl BotApi {
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    /// Long-poll for message updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: timeout.as_secs(),
                allowed_updates: &["message"],
            },
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<Message> {
        self.call(
            "sendMessage",
            &SendMessage {
                chat_id,
                text,
                parse_mode: "HTML",
            },
        )
        .await
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method, "telegram request");
        let resp: ApiResponse<T> = self
            .client
            .post(format!("{}/{}", self.base, method))
            .json(body)
            .send()
            .await
            .map_err(strip_url)?
            .json()
            .await
            .map_err(strip_url)?;

        match resp {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(TelegramError::Api {
                code: error_code.unwrap_or_default(),
                description: description.unwrap_or_else(|| "empty response".to_owned()),
            }),
        }
    }
}

// Request URLs carry the bot token.
fn strip_url(err: reqwest::Error) -> TelegramError {
    TelegramError::Http(err.without_url())
}
