//! Operator command channel: polls the chat feed and applies commands to the store.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    domain::{ChatId, UpdateId},
    formatting,
    messaging::{port::UpdateFeed, types::InboundUpdate},
    notifier::Notifier,
    store::{replace_domain, StateStore},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Install,
    Replace { old: String, new: String },
    /// `/replace` with the wrong number of arguments.
    ReplaceUsage,
    List,
}

impl Command {
    /// Parse the leading token of a message. Unknown commands and plain text yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let head = tokens.next()?;
        // Telegram may send `/cmd@botname` in groups.
        let name = head.split('@').next().unwrap_or(head);
        let args: Vec<&str> = tokens.collect();

        match name {
            "/installnawalabot" => Some(Self::Install),
            "/replace" => match args.as_slice() {
                [old, new] => Some(Self::Replace {
                    old: old.to_string(),
                    new: new.to_string(),
                }),
                _ => Some(Self::ReplaceUsage),
            },
            "/list" => Some(Self::List),
            _ => None,
        }
    }
}

pub struct CommandChannel {
    cfg: Arc<Config>,
    feed: Arc<dyn UpdateFeed>,
    store: Arc<dyn StateStore>,
    notifier: Arc<Notifier>,
    /// Next update id to request; every received update moves it forward.
    cursor: Option<UpdateId>,
}

impl CommandChannel {
    pub fn new(
        cfg: Arc<Config>,
        feed: Arc<dyn UpdateFeed>,
        store: Arc<dyn StateStore>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            cfg,
            feed,
            store,
            notifier,
            cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<UpdateId> {
        self.cursor
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("command channel started");
        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              n = self.poll_once() => {
                if n > 0 {
                  debug!(updates = n, "processed updates");
                }
              }
            }

            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(self.cfg.command_poll_tick) => {}
            }
        }
        info!("command channel stopped");
        Ok(())
    }

    /// Fetch and handle one round of updates. Returns how many were received.
    pub async fn poll_once(&mut self) -> usize {
        let updates = match self.feed.poll(self.cursor).await {
            Ok(v) => v,
            Err(e) => {
                warn!("fetching updates failed: {e}");
                return 0;
            }
        };

        let n = updates.len();
        for update in updates {
            // Advance first so a failing command is never re-delivered.
            let next = UpdateId(update.update_id.0 + 1);
            if self.cursor.map_or(true, |c| next > c) {
                self.cursor = Some(next);
            }
            self.handle(update).await;
        }
        n
    }

    async fn handle(&self, update: InboundUpdate) {
        let (Some(chat_id), Some(text)) = (update.chat_id, update.text.as_deref()) else {
            return;
        };
        let Some(command) = Command::parse(text) else {
            return;
        };

        info!(chat_id = chat_id.0, ?command, "operator command");
        for reply in self.execute(chat_id, command) {
            self.notifier.send_to(chat_id, &reply).await;
        }
    }

    /// Apply a command and build its reply, split to fit the messenger's length limit.
    pub fn execute(&self, chat_id: ChatId, command: Command) -> Vec<String> {
        let reply = match command {
            Command::Install => match self.store.save_destination(chat_id) {
                // Memory only follows a successful write.
                Ok(()) => {
                    self.notifier.set_destination(chat_id);
                    formatting::destination_installed(chat_id)
                }
                Err(e) => {
                    warn!(chat_id = chat_id.0, "saving destination failed: {e}");
                    formatting::destination_save_failed(chat_id, &e.to_string())
                }
            },
            Command::Replace { old, new } => {
                let mut domains = self.store.read_domains();
                if replace_domain(&mut domains, &old, &new) == 0 {
                    formatting::replace_not_found(&old)
                } else {
                    match self.store.write_domains(&domains) {
                        Ok(()) => {
                            info!(old = %old, new = %new, "domain replaced by operator");
                            formatting::replace_done(&old, &new)
                        }
                        Err(e) => {
                            warn!("saving domain list failed: {e}");
                            formatting::domain_list_write_failed(&e.to_string())
                        }
                    }
                }
            }
            Command::ReplaceUsage => formatting::replace_usage(),
            Command::List => formatting::domain_list(&self.store.read_domains()),
        };
        formatting::split_lines_chunks(&reply, self.notifier.max_message_len())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;

    use crate::{
        domain::UpdateId,
        messaging::{port::UpdateFeed, types::InboundUpdate},
        Result,
    };

    /// Feed that replays queued rounds and records the offsets it was polled with.
    #[derive(Default)]
    pub struct FakeFeed {
        rounds: Mutex<VecDeque<Result<Vec<InboundUpdate>>>>,
        offsets: Mutex<Vec<Option<UpdateId>>>,
    }

    impl FakeFeed {
        pub fn push(&self, round: Result<Vec<InboundUpdate>>) {
            self.rounds.lock().unwrap().push_back(round);
        }

        pub fn offsets(&self) -> Vec<Option<UpdateId>> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateFeed for FakeFeed {
        async fn poll(&self, offset: Option<UpdateId>) -> Result<Vec<InboundUpdate>> {
            self.offsets.lock().unwrap().push(offset);
            self.rounds
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
