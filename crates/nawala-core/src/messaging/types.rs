use crate::domain::{ChatId, UpdateId};

/// Cross-messenger inbound update.
///
/// Telegram-specific fields stay in the Telegram adapter. Updates that are not
/// text messages still surface (with `text: None`) so the cursor can move past them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundUpdate {
    pub update_id: UpdateId,
    pub chat_id: Option<ChatId>,
    pub text: Option<String>,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub max_message_len: usize,
}
