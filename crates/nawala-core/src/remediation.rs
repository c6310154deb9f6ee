//! Shortlink remediation: repoint links away from a blocked domain.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    config::Config,
    formatting,
    notifier::Notifier,
    ports::ShortlinkApi,
    store::{replace_domain, StateStore},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// No backup-mapping line for the domain; nothing touched.
    ReplacementMissing,
    /// Listing shortlinks failed; nothing touched.
    ListingFailed(String),
    Completed(RemediationReport),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemediationReport {
    pub replacement: String,
    /// Links whose target referenced the blocked domain.
    pub matched: usize,
    pub patched: usize,
    pub failed: usize,
    /// Whether the monitored domain list was rewritten and saved.
    pub list_updated: bool,
}

pub struct Remediator {
    cfg: Arc<Config>,
    store: Arc<dyn StateStore>,
    shortlinks: Arc<dyn ShortlinkApi>,
    notifier: Arc<Notifier>,
}

impl Remediator {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn StateStore>,
        shortlinks: Arc<dyn ShortlinkApi>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            cfg,
            store,
            shortlinks,
            notifier,
        }
    }

    pub async fn remediate(&self, domain: &str) -> RemediationOutcome {
        let Some(replacement) = self.store.lookup_replacement(domain) else {
            warn!(domain, "no replacement registered in backup mapping");
            self.notifier
                .notify(&formatting::replacement_missing(domain))
                .await;
            return RemediationOutcome::ReplacementMissing;
        };

        let links = match self.shortlinks.list().await {
            Ok(v) => v,
            Err(e) => {
                error!(domain, "listing shortlinks failed: {e}");
                self.notifier
                    .notify(&formatting::shortlink_listing_failed(domain, &e.to_string()))
                    .await;
                return RemediationOutcome::ListingFailed(e.to_string());
            }
        };

        let mut report = RemediationReport {
            replacement: replacement.clone(),
            ..RemediationReport::default()
        };

        for link in links.iter().filter(|l| l.target.contains(domain)) {
            report.matched += 1;
            let new_target = rewrite_target(&link.target, domain, &replacement);
            match self
                .shortlinks
                .patch(&link.id, &new_target, &self.cfg.remediation_description)
                .await
            {
                Ok(()) => {
                    report.patched += 1;
                    info!(link_id = %link.id, old = %link.target, new = %new_target, "shortlink updated");
                    self.notifier
                        .notify(&formatting::shortlink_patched(domain, &new_target))
                        .await;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(link_id = %link.id, domain, "shortlink update failed: {e}");
                    self.notifier
                        .notify(&formatting::shortlink_patch_failed(
                            domain,
                            &link.id,
                            &e.to_string(),
                        ))
                        .await;
                }
            }
        }

        if report.patched == 0 {
            info!(
                domain,
                matched = report.matched,
                "no shortlink updated; domain stays monitored"
            );
            return RemediationOutcome::Completed(report);
        }

        report.list_updated = self.swap_monitored_domain(domain, &replacement).await;
        RemediationOutcome::Completed(report)
    }

    async fn swap_monitored_domain(&self, domain: &str, replacement: &str) -> bool {
        let mut domains = self.store.read_domains();
        if replace_domain(&mut domains, domain, replacement) == 0 {
            info!(domain, "domain no longer in list; nothing to swap");
            return false;
        }

        if let Err(e) = self.store.write_domains(&domains) {
            error!(domain, "saving domain list failed: {e}");
            self.notifier
                .notify(&formatting::domain_list_write_failed(&e.to_string()))
                .await;
            return false;
        }

        info!(old = domain, new = replacement, "domain list updated");
        self.notifier
            .notify(&formatting::domain_list_updated(domain, replacement))
            .await;
        true
    }
}

/// Replace the first occurrence of `domain` in `target`.
///
/// Matching is a plain substring match: `a.com` also matches inside `notaa.com`.
pub fn rewrite_target(target: &str, domain: &str, replacement: &str) -> String {
    target.replacen(domain, replacement, 1)
}
