use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::{domain::ChatId, messaging::port::MessagingPort};

/// Outcome of a fire-and-forget send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// No destination configured; the message was only logged.
    NoDestination,
    Failed,
}

/// Notification sink shared by the monitor and the command channel.
///
/// Holds the in-memory copy of the destination chat. Sends never fail the caller:
/// errors are logged and dropped (no retry, no queue).
pub struct Notifier {
    messenger: Arc<dyn MessagingPort>,
    destination: RwLock<Option<ChatId>>,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn MessagingPort>, destination: Option<ChatId>) -> Self {
        Self {
            messenger,
            destination: RwLock::new(destination),
        }
    }

    pub fn destination(&self) -> Option<ChatId> {
        match self.destination.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_destination(&self, chat_id: ChatId) {
        match self.destination.write() {
            Ok(mut guard) => *guard = Some(chat_id),
            Err(poisoned) => *poisoned.into_inner() = Some(chat_id),
        }
    }

    /// Longest message the underlying messenger accepts.
    pub fn max_message_len(&self) -> usize {
        self.messenger.capabilities().max_message_len
    }

    /// Send to the configured destination (no-op while unset).
    pub async fn notify(&self, html: &str) -> Delivery {
        let Some(chat_id) = self.destination() else {
            warn!("no destination chat configured (use /installnawalabot); dropping: {html}");
            return Delivery::NoDestination;
        };
        self.send_to(chat_id, html).await
    }

    /// Send to an explicit chat, e.g. a command reply to its sender.
    pub async fn send_to(&self, chat_id: ChatId, html: &str) -> Delivery {
        match self.messenger.send_html(chat_id, html).await {
            Ok(()) => {
                debug!(chat_id = chat_id.0, "message sent");
                Delivery::Sent
            }
            Err(e) => {
                warn!(chat_id = chat_id.0, "failed to send message: {e}");
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::{
        domain::ChatId,
        errors::Error,
        messaging::{port::MessagingPort, types::MessagingCapabilities},
        Result,
    };

    /// Messenger that records every send; optionally fails them.
    #[derive(Default)]
    pub struct FakeMessenger {
        sends: Mutex<Vec<(ChatId, String)>>,
        pub fail: bool,
    }

    impl FakeMessenger {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<(ChatId, String)> {
            self.sends.lock().unwrap().clone()
        }

        pub fn sent_html(&self) -> Vec<String> {
            self.sent().into_iter().map(|(_, html)| html).collect()
        }

        pub fn count_containing(&self, needle: &str) -> usize {
            self.sent_html()
                .iter()
                .filter(|h| h.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                max_message_len: 4096,
            }
        }

        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
            if self.fail {
                return Err(Error::External("telegram down".to_string()));
            }
            self.sends.lock().unwrap().push((chat_id, html.to_string()));
            Ok(())
        }
    }
}
