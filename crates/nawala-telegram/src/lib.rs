//! Telegram adapter (teloxide).
//!
//! Implements the `nawala-core` messaging ports over the Telegram Bot API:
//! outbound HTML messages and cursor-based `getUpdates` polling.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ParseMode, Update, UpdateKind},
};

use tokio::time::sleep;
use tracing::warn;

use nawala_core::{
    domain::{ChatId, UpdateId},
    errors::Error,
    messaging::{
        port::{MessagingPort, UpdateFeed},
        types::{InboundUpdate, MessagingCapabilities},
    },
    Result,
};

/// Build a bot whose HTTP timeout outlives the `getUpdates` long-poll window.
pub fn build_bot(token: &str, long_poll: Duration) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(long_poll + Duration::from_secs(10))
        .build()
        .map_err(|e| Error::External(format!("telegram http client build failed: {e}")))?;
    Ok(Bot::with_client(token, client))
}

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        warn!(retry_after = ?d, "telegram rate limited, retrying once");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(chat_id), html.to_string())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }
}

/// Long-polling inbound feed.
#[derive(Clone)]
pub struct TelegramFeed {
    bot: Bot,
    long_poll: Duration,
}

impl TelegramFeed {
    pub fn new(bot: Bot, long_poll: Duration) -> Self {
        Self { bot, long_poll }
    }
}

#[async_trait]
impl UpdateFeed for TelegramFeed {
    async fn poll(&self, offset: Option<UpdateId>) -> Result<Vec<InboundUpdate>> {
        let mut req = self
            .bot
            .get_updates()
            .timeout(u32::try_from(self.long_poll.as_secs()).unwrap_or(u32::MAX));
        if let Some(offset) = offset {
            let offset = i32::try_from(offset.0)
                .map_err(|_| Error::External(format!("update offset out of range: {}", offset.0)))?;
            req = req.offset(offset);
        }

        let updates = req.await.map_err(map_err)?;
        Ok(updates.into_iter().map(to_inbound).collect())
    }
}

fn to_inbound(update: Update) -> InboundUpdate {
    let update_id = UpdateId(i64::from(update.id));
    match update.kind {
        UpdateKind::Message(msg) => InboundUpdate {
            update_id,
            chat_id: Some(ChatId(msg.chat.id.0)),
            text: msg.text().map(str::to_string),
        },
        _ => InboundUpdate {
            update_id,
            chat_id: None,
            text: None,
        },
    }
}
