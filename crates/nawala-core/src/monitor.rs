//! Domain monitor: batch checks against the filtering registry on a fixed interval.
//!
//! Each cycle walks `Fetching → Checking → Notifying → Sleeping`:
//! - reads the domain list fresh (edits between cycles are picked up)
//! - queries batches strictly one after another
//! - alerts and remediates every blocked domain inside the batch loop
//! - emits a debounced "all clear" when a cycle found nothing blocked

use std::{sync::Arc, time::Duration};

use chrono::Local;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    formatting,
    notifier::Notifier,
    ports::BlocklistQuery,
    remediation::{RemediationOutcome, Remediator},
    store::StateStore,
    Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Fetching,
    Checking,
    Notifying,
    Sleeping,
}

/// At-most-once-per-interval gate for the "all clear" message.
///
/// Process-lifetime only: a restart forgets the last send, so the first eligible
/// cycle after startup always reports.
#[derive(Clone, Debug)]
pub struct Debounce {
    interval: Duration,
    last: Option<Instant>,
}

impl Debounce {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(prev) => now.saturating_duration_since(prev) >= self.interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn last(&self) -> Option<Instant> {
        self.last
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub domains: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub blocked: Vec<String>,
    pub all_clear_sent: bool,
}

pub struct DomainMonitor {
    cfg: Arc<Config>,
    store: Arc<dyn StateStore>,
    checker: Arc<dyn BlocklistQuery>,
    remediator: Remediator,
    notifier: Arc<Notifier>,
    debounce: Debounce,
    phase: Phase,
}

impl DomainMonitor {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn StateStore>,
        checker: Arc<dyn BlocklistQuery>,
        remediator: Remediator,
        notifier: Arc<Notifier>,
    ) -> Self {
        let debounce = Debounce::new(cfg.safe_notify_interval);
        Self {
            cfg,
            store,
            checker,
            remediator,
            notifier,
            debounce,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn debounce(&self) -> &Debounce {
        &self.debounce
    }

    /// Run cycles until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            batch_size = self.cfg.batch_size,
            interval_secs = self.cfg.check_interval.as_secs(),
            "domain monitor started"
        );

        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              report = self.run_cycle() => {
                match report {
                  Some(r) => info!(
                    domains = r.domains,
                    batches = r.batches,
                    failed_batches = r.failed_batches,
                    blocked = r.blocked.len(),
                    "check cycle finished"
                  ),
                  None => warn!("domain list is empty; add domains to {}", self.cfg.domain_list_file.display()),
                }
              }
            }

            self.phase = Phase::Sleeping;
            debug!(secs = self.cfg.check_interval.as_secs(), "sleeping until next cycle");
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = sleep(self.cfg.check_interval) => {}
            }
            self.phase = Phase::Idle;
        }

        self.phase = Phase::Idle;
        info!("domain monitor stopped");
        Ok(())
    }

    /// One full pass over the domain list. `None` when the list is empty.
    pub async fn run_cycle(&mut self) -> Option<CycleReport> {
        self.phase = Phase::Fetching;
        let domains = self.store.read_domains();
        if domains.is_empty() {
            self.phase = Phase::Idle;
            return None;
        }

        self.phase = Phase::Checking;
        let mut report = CycleReport {
            domains: domains.len(),
            ..CycleReport::default()
        };

        let batch_size = self.cfg.batch_size.max(1);
        for batch in domains.chunks(batch_size) {
            report.batches += 1;
            debug!(?batch, "checking batch");

            let statuses = match self.query(batch).await {
                Ok(v) => v,
                Err(e) => {
                    report.failed_batches += 1;
                    error!(?batch, "blocklist query failed: {e}");
                    self.notifier
                        .notify(&formatting::batch_failed(batch, &e.to_string()))
                        .await;
                    continue;
                }
            };

            for status in statuses.iter().filter(|s| s.is_blocked()) {
                warn!(domain = %status.domain, "domain blocked by registry");
                report.blocked.push(status.domain.clone());
                self.notifier
                    .notify(&formatting::blocked_alert(&status.domain))
                    .await;

                match self.remediator.remediate(&status.domain).await {
                    RemediationOutcome::Completed(r) => info!(
                        domain = %status.domain,
                        replacement = %r.replacement,
                        patched = r.patched,
                        failed = r.failed,
                        list_updated = r.list_updated,
                        "remediation finished"
                    ),
                    other => warn!(domain = %status.domain, outcome = ?other, "remediation skipped"),
                }
            }
        }

        self.phase = Phase::Notifying;
        let now = Instant::now();
        if report.blocked.is_empty() && report.failed_batches == 0 && self.debounce.ready(now) {
            let at = Local::now().format("%Y-%m-%d %H:%M %Z").to_string();
            info!("all {} domains safe", report.domains);
            self.notifier
                .notify(&formatting::all_clear(report.domains, &at))
                .await;
            self.debounce.mark(now);
            report.all_clear_sent = true;
        }

        self.phase = Phase::Idle;
        Some(report)
    }

    async fn query(&self, batch: &[String]) -> Result<Vec<crate::domain::DomainStatus>> {
        let timeout = self.cfg.checker_timeout;
        match tokio::time::timeout(timeout, self.checker.query_batch(batch)).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout {
                what: "blocklist query".to_string(),
                after: timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        fs,
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        commands::{testing::FakeFeed, Command, CommandChannel},
        domain::{BlockStatus, ChatId, DomainStatus},
        notifier::testing::FakeMessenger,
        remediation::testing::FakeShortlinks,
        store::FileStore,
    };

    #[derive(Default)]
    struct FakeChecker {
        blocked: HashSet<String>,
        fail: AtomicBool,
        hang: bool,
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl FakeChecker {
        fn blocking(domains: &[&str]) -> Self {
            Self {
                blocked: domains.iter().map(|d| d.to_string()).collect(),
                ..Self::default()
            }
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BlocklistQuery for FakeChecker {
        async fn query_batch(&self, domains: &[String]) -> Result<Vec<DomainStatus>> {
            self.batches.lock().unwrap().push(domains.to_vec());
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::External("registry unreachable".to_string()));
            }
            Ok(domains
                .iter()
                .map(|d| DomainStatus {
                    domain: d.clone(),
                    status: if self.blocked.contains(d) {
                        BlockStatus::Present
                    } else {
                        BlockStatus::Absent
                    },
                })
                .collect())
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        cfg: Arc<Config>,
        store: Arc<FileStore>,
        messenger: Arc<FakeMessenger>,
        notifier: Arc<Notifier>,
        monitor: DomainMonitor,
    }

    fn harness(
        domains: &str,
        mapping: &str,
        checker: Arc<FakeChecker>,
        shortlinks: Arc<FakeShortlinks>,
    ) -> Harness {
        harness_with_batch_size(5, domains, mapping, checker, shortlinks)
    }

    fn harness_with_batch_size(
        batch_size: usize,
        domains: &str,
        mapping: &str,
        checker: Arc<FakeChecker>,
        shortlinks: Arc<FakeShortlinks>,
    ) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("list.txt"), domains).unwrap();
        fs::write(dir.path().join("target-backup.txt"), mapping).unwrap();
        let mut cfg = Config::defaults(dir.path());
        cfg.batch_size = batch_size;
        let cfg = Arc::new(cfg);
        let store = Arc::new(FileStore::from_config(&cfg));
        let messenger = Arc::new(FakeMessenger::default());
        let notifier = Arc::new(Notifier::new(messenger.clone(), Some(ChatId(9))));
        let remediator = Remediator::new(cfg.clone(), store.clone(), shortlinks, notifier.clone());
        let monitor = DomainMonitor::new(
            cfg.clone(),
            store.clone(),
            checker,
            remediator,
            notifier.clone(),
        );
        Harness {
            dir,
            cfg,
            store,
            messenger,
            notifier,
            monitor,
        }
    }

    fn domain_lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("d{i}.com"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn issues_ceil_n_over_b_queries_of_bounded_size() {
        for b in [1usize, 2, 5, 7, 50] {
            for n in [1usize, 4, 5, 6, 10, 11, 23] {
                let checker = Arc::new(FakeChecker::default());
                let mut h = harness_with_batch_size(
                    b,
                    &domain_lines(n),
                    "",
                    checker.clone(),
                    Arc::new(FakeShortlinks::default()),
                );

                let report = h.monitor.run_cycle().await.unwrap();

                let batches = checker.batches();
                assert_eq!(batches.len(), n.div_ceil(b), "n = {n}, b = {b}");
                assert_eq!(report.batches, batches.len());
                assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= b));
                let flat: Vec<String> = batches.into_iter().flatten().collect();
                assert_eq!(flat, h.store.read_domains());
            }
        }
    }

    #[tokio::test]
    async fn each_cycle_rereads_the_domain_list() {
        let checker = Arc::new(FakeChecker::default());
        let mut h = harness(
            "a.com\nb.com",
            "",
            checker.clone(),
            Arc::new(FakeShortlinks::default()),
        );

        h.monitor.run_cycle().await.unwrap();
        fs::write(h.dir.path().join("list.txt"), "c.com\nd.com\ne.com\n").unwrap();
        let second = h.monitor.run_cycle().await.unwrap();

        assert_eq!(second.domains, 3);
        assert_eq!(
            checker.batches(),
            vec![
                vec!["a.com".to_string(), "b.com".to_string()],
                vec!["c.com".to_string(), "d.com".to_string(), "e.com".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn operator_replace_and_remediation_share_the_list_file() {
        let checker = Arc::new(FakeChecker::blocking(&["a.com"]));
        let shortlinks = Arc::new(FakeShortlinks::with_links(&[("l1", "https://a.com/x")]));
        let mut h = harness(
            "a.com\nb.com",
            "old domain : a.com, new domain : a2.com\n",
            checker.clone(),
            shortlinks,
        );
        let commands = CommandChannel::new(
            h.cfg.clone(),
            Arc::new(FakeFeed::default()),
            h.store.clone(),
            h.notifier.clone(),
        );

        h.monitor.run_cycle().await.unwrap();
        // The operator still refers to the domain remediation just swapped out.
        let stale = commands.execute(ChatId(9), Command::Replace {
            old: "a.com".to_string(),
            new: "a9.com".to_string(),
        });
        let fresh = commands.execute(ChatId(9), Command::Replace {
            old: "b.com".to_string(),
            new: "b3.com".to_string(),
        });
        h.monitor.run_cycle().await.unwrap();

        assert!(stale[0].contains("was not found"));
        assert!(fresh[0].contains("replaced with"));
        assert_eq!(h.store.read_domains(), vec!["a2.com", "b3.com"]);
        assert_eq!(
            checker.batches()[1],
            vec!["a2.com".to_string(), "b3.com".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_list_skips_the_cycle() {
        let checker = Arc::new(FakeChecker::default());
        let mut h = harness("\n\n", "", checker.clone(), Arc::new(FakeShortlinks::default()));

        assert_eq!(h.monitor.run_cycle().await, None);
        assert!(checker.batches().is_empty());
        assert!(h.messenger.sent().is_empty());
        assert_eq!(h.monitor.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn blocked_domain_is_alerted_then_remediated() {
        let checker = Arc::new(FakeChecker::blocking(&["a.com"]));
        let shortlinks = Arc::new(FakeShortlinks::with_links(&[("l1", "https://a.com/x")]));
        let mut h = harness(
            "a.com\nb.com",
            "old domain : a.com, new domain : a2.com\n",
            checker.clone(),
            shortlinks.clone(),
        );

        let report = h.monitor.run_cycle().await.unwrap();

        assert_eq!(checker.batches().len(), 1);
        assert_eq!(report.blocked, vec!["a.com"]);
        assert!(!report.all_clear_sent);
        assert_eq!(
            shortlinks.patches(),
            vec![(
                "l1".to_string(),
                "https://a2.com/x".to_string(),
                "Automatic Domain Replacement".to_string()
            )]
        );
        assert_eq!(h.store.read_domains(), vec!["a2.com", "b.com"]);

        let sent = h.messenger.sent_html();
        assert!(sent[0].contains("Domain blocked"));
        assert!(sent[1].contains("Shortlink updated"));
    }

    #[tokio::test]
    async fn blocked_domain_without_mapping_reports_and_keeps_list() {
        let checker = Arc::new(FakeChecker::blocking(&["a.com"]));
        let shortlinks = Arc::new(FakeShortlinks::with_links(&[("l1", "https://a.com/x")]));
        let mut h = harness("a.com\nb.com", "", checker, shortlinks.clone());

        h.monitor.run_cycle().await.unwrap();

        assert!(shortlinks.patches().is_empty());
        assert_eq!(h.store.read_domains(), vec!["a.com", "b.com"]);
        assert_eq!(h.messenger.count_containing("No replacement registered"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_clear_is_debounced_across_cycles() {
        let checker = Arc::new(FakeChecker::default());
        let mut h = harness(
            "a.com\nb.com",
            "",
            checker,
            Arc::new(FakeShortlinks::default()),
        );

        let first = h.monitor.run_cycle().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = h.monitor.run_cycle().await.unwrap();

        assert!(first.all_clear_sent);
        assert!(!second.all_clear_sent);
        assert_eq!(h.messenger.count_containing("All 2 domains are safe"), 1);

        tokio::time::advance(Duration::from_secs(3600)).await;
        let third = h.monitor.run_cycle().await.unwrap();
        assert!(third.all_clear_sent);
        assert_eq!(h.messenger.count_containing("are safe"), 2);
    }

    #[tokio::test]
    async fn no_all_clear_when_something_is_blocked() {
        let checker = Arc::new(FakeChecker::blocking(&["b.com"]));
        let mut h = harness("a.com\nb.com", "", checker, Arc::new(FakeShortlinks::default()));

        let report = h.monitor.run_cycle().await.unwrap();

        assert!(!report.all_clear_sent);
        assert_eq!(h.monitor.debounce().last(), None);
        assert_eq!(h.messenger.count_containing("are safe"), 0);
    }

    #[tokio::test]
    async fn failed_batch_is_reported_and_skipped() {
        let checker = Arc::new(FakeChecker::default());
        checker.fail.store(true, Ordering::SeqCst);
        let mut h = harness(
            &domain_lines(7),
            "",
            checker.clone(),
            Arc::new(FakeShortlinks::default()),
        );

        let report = h.monitor.run_cycle().await.unwrap();

        assert_eq!(checker.batches().len(), 2);
        assert_eq!(report.failed_batches, 2);
        assert!(!report.all_clear_sent);
        assert_eq!(h.messenger.count_containing("Blocklist check failed"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_query_times_out_as_batch_failure() {
        let checker = Arc::new(FakeChecker {
            hang: true,
            ..FakeChecker::default()
        });
        let mut h = harness("a.com", "", checker, Arc::new(FakeShortlinks::default()));

        let report = h.monitor.run_cycle().await.unwrap();

        assert_eq!(report.failed_batches, 1);
        assert_eq!(h.messenger.count_containing("timed out after 120s"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_checks_every_interval_until_cancelled() {
        let checker = Arc::new(FakeChecker::default());
        let h = harness("a.com", "", checker.clone(), Arc::new(FakeShortlinks::default()));
        let messenger = h.messenger.clone();
        let _dir = h.dir;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.monitor.run(cancel.clone()));

        while checker.batches().len() < 3 {
            sleep(Duration::from_secs(1)).await;
        }
        cancel.cancel();
        task.await.unwrap().unwrap();

        // Three cycles two minutes apart fit inside one debounce window.
        assert_eq!(messenger.count_containing("are safe"), 1);
    }
}
