use async_trait::async_trait;

use crate::{
    domain::{DomainStatus, ShortlinkRecord},
    Result,
};

/// Hexagonal port for the filtering registry.
///
/// One call per batch. Implementations classify every domain they find and may omit
/// unknown ones (the caller treats them as absent). Any failure is batch-level: no
/// partial results.
#[async_trait]
pub trait BlocklistQuery: Send + Sync {
    async fn query_batch(&self, domains: &[String]) -> Result<Vec<DomainStatus>>;
}

/// Hexagonal port for the shortlink provider.
#[async_trait]
pub trait ShortlinkApi: Send + Sync {
    /// Every shortlink owned by the account.
    async fn list(&self) -> Result<Vec<ShortlinkRecord>>;

    async fn patch(&self, id: &str, target: &str, description: &str) -> Result<()>;
}
