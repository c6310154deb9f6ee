use async_trait::async_trait;

use crate::{
    domain::{ChatId, UpdateId},
    messaging::types::{InboundUpdate, MessagingCapabilities},
    Result,
};

/// Outbound chat port.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;
}

/// Inbound chat port: cursor-based polling of operator messages.
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    /// Fetch updates with id >= `offset` (all pending updates when `None`), oldest first.
    async fn poll(&self, offset: Option<UpdateId>) -> Result<Vec<InboundUpdate>>;
}
