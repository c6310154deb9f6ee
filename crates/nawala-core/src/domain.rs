/// Telegram chat id (numeric). Doubles as the notification destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Identifier of an inbound chat update; strictly increasing within a feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UpdateId(pub i64);

/// Block status reported by the filtering registry for one domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockStatus {
    /// The registry lists the domain as actively filtered.
    Present,
    Absent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainStatus {
    pub domain: String,
    pub status: BlockStatus,
}

impl DomainStatus {
    pub fn is_blocked(&self) -> bool {
        self.status == BlockStatus::Present
    }
}

/// A redirect record held by the shortlink provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShortlinkRecord {
    pub id: String,
    pub target: String,
}
