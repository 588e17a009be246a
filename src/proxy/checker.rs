//! Proxy checker module driving batched, pausable verification runs

use crate::proxy::client::{ProxyVerifier, TestOutcome};
use crate::proxy::models::{speed_rating, Proxy, ProxyStatus};
use futures::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Default number of concurrent verifications
const DEFAULT_THREADS: usize = 10;

/// Default per-proxy timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of proxies per batch
const DEFAULT_BATCH_SIZE: usize = 50;

/// Configuration for one checking run
#[derive(Debug, Clone)]
pub struct CheckerSettings {
    /// Upper bound on concurrent in-flight verifications
    pub threads: usize,
    /// Per-proxy timeout forwarded to the verification endpoint
    pub timeout_secs: u64,
    /// Number of proxies handled per batch of the run loop
    pub batch_size: usize,
    /// Ring a notification when the run completes (presentation only)
    pub sound_notification: bool,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
            sound_notification: true,
        }
    }
}

impl CheckerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_sound_notification(mut self, sound_notification: bool) -> Self {
        self.sound_notification = sound_notification;
        self
    }
}

/// Progress callback: an owned snapshot of all records plus percent tested
pub type ProgressFn = Arc<dyn Fn(Vec<Proxy>, f64) + Send + Sync>;

/// Run commands observed by the scheduling loop at chunk boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Pause,
    Stop,
}

/// Batched, pausable proxy checker.
///
/// Splits the pending records into sequential batches, each batch into
/// chunks of at most `threads` records, and verifies one chunk at a time
/// with all of its verifications in flight concurrently. Outcomes are
/// merged into the shared record list as they land, and every change is
/// reported through the progress callback as an owned snapshot.
///
/// The checker is cheap to clone; all clones share the same record list
/// and run state, so `pause`, `resume` and `stop` can be issued from
/// another task while `start` is in progress. They take effect at the
/// next chunk boundary and never interrupt in-flight verifications.
pub struct ProxyChecker {
    proxies: Arc<Mutex<Vec<Proxy>>>,
    settings: CheckerSettings,
    verifier: Arc<dyn ProxyVerifier>,
    on_update: ProgressFn,
    command: Arc<watch::Sender<Command>>,
    active: Arc<AtomicBool>,
}

impl ProxyChecker {
    /// Create a checker over a record list.
    ///
    /// One checker drives one run; construct a fresh instance to run again.
    pub fn new<F>(
        proxies: Vec<Proxy>,
        settings: CheckerSettings,
        verifier: Arc<dyn ProxyVerifier>,
        on_update: F,
    ) -> Self
    where
        F: Fn(Vec<Proxy>, f64) + Send + Sync + 'static,
    {
        let (command, _) = watch::channel(Command::Run);
        Self {
            proxies: Arc::new(Mutex::new(proxies)),
            settings,
            verifier,
            on_update: Arc::new(on_update),
            command: Arc::new(command),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a run is currently in progress
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Owned copy of the current record list
    pub fn proxies(&self) -> Vec<Proxy> {
        self.lock().clone()
    }

    /// Pause the run at the next chunk boundary; no-op unless running
    pub fn pause(&self) {
        self.command.send_if_modified(|cmd| {
            if *cmd == Command::Run {
                *cmd = Command::Pause;
                true
            } else {
                false
            }
        });
    }

    /// Resume a paused run; no-op unless paused
    pub fn resume(&self) {
        self.command.send_if_modified(|cmd| {
            if *cmd == Command::Pause {
                *cmd = Command::Run;
                true
            } else {
                false
            }
        });
    }

    /// Stop the run: the in-flight chunk drains, nothing further starts.
    /// Harmless when no run is in progress.
    pub fn stop(&self) {
        self.command.send_replace(Command::Stop);
    }

    /// Check every record that is pending when the call is made.
    ///
    /// Records are processed in list order. Completes immediately with no
    /// progress callback when nothing is pending.
    pub async fn start(&self) {
        let pending: Vec<usize> = {
            let list = self.lock();
            list.iter()
                .enumerate()
                .filter(|(_, proxy)| proxy.status == ProxyStatus::Pending)
                .map(|(idx, _)| idx)
                .collect()
        };
        if pending.is_empty() {
            return;
        }

        log::info!("checking {} pending proxies", pending.len());
        self.active.store(true, Ordering::SeqCst);
        self.command.send_replace(Command::Run);

        let threads = self.settings.threads.max(1);
        let batch_size = self.settings.batch_size.max(1);

        'run: for batch in pending.chunks(batch_size) {
            for chunk in batch.chunks(threads) {
                if self.wait_for_go().await == Command::Stop {
                    log::info!("run stopped before completion");
                    break 'run;
                }
                self.verify_chunk(chunk).await;
            }
        }

        self.active.store(false, Ordering::SeqCst);
    }

    /// Block while paused without consuming CPU; resolves to Run or Stop
    async fn wait_for_go(&self) -> Command {
        let mut rx = self.command.subscribe();
        loop {
            let cmd = *rx.borrow_and_update();
            if cmd != Command::Pause {
                return cmd;
            }
            // Wakes on the next pause/resume/stop transition
            if rx.changed().await.is_err() {
                return Command::Stop;
            }
        }
    }

    /// Mark a chunk as testing, then verify all of it concurrently.
    /// The chunk is the hard upper bound on in-flight verifications.
    async fn verify_chunk(&self, chunk: &[usize]) {
        {
            let mut list = self.lock();
            for &idx in chunk {
                list[idx].status = ProxyStatus::Testing;
            }
        }
        self.emit_progress();

        let checks = chunk.iter().map(|&idx| {
            let target = self.lock()[idx].clone();
            async move {
                let outcome = self
                    .verifier
                    .verify(&target, self.settings.timeout_secs)
                    .await;
                self.merge_outcome(idx, outcome);
                self.emit_progress();
            }
        });
        future::join_all(checks).await;
    }

    fn merge_outcome(&self, idx: usize, outcome: TestOutcome) {
        let mut list = self.lock();
        let record = &mut list[idx];
        match outcome {
            TestOutcome::Success {
                speed_ms,
                country,
                country_code,
            } => {
                record.status = ProxyStatus::Valid;
                record.rating = speed_ms.map(speed_rating);
                record.speed_ms = speed_ms;
                record.country = country;
                record.country_code = country_code;
            }
            TestOutcome::Failure { reason } => {
                record.status = ProxyStatus::Invalid;
                record.error = Some(reason);
            }
        }
    }

    fn emit_progress(&self) {
        let (snapshot, progress) = {
            let list = self.lock();
            let total = list.len();
            let tested = list.iter().filter(|p| p.status.is_settled()).count();
            let progress = if total > 0 {
                tested as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (list.clone(), progress)
        };
        (self.on_update)(snapshot, progress);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Proxy>> {
        // Guards are never held across an await and holders never panic
        self.proxies.lock().expect("proxy list lock poisoned")
    }
}

impl Clone for ProxyChecker {
    fn clone(&self) -> Self {
        Self {
            proxies: Arc::clone(&self.proxies),
            settings: self.settings.clone(),
            verifier: Arc::clone(&self.verifier),
            on_update: Arc::clone(&self.on_update),
            command: Arc::clone(&self.command),
            active: Arc::clone(&self.active),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::client::MockProxyVerifier;
    use crate::proxy::models::ProxyType;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Duration};

    /// Verifier stub with a fixed delay per call, tracking the number of
    /// concurrent calls and every host it was asked to verify.
    struct StubVerifier {
        delay: Duration,
        fail_hosts: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl StubVerifier {
        fn new(delay_ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                fail_hosts: Vec::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_host(mut self, host: &str) -> Self {
            self.fail_hosts.push(host.to_string());
            self
        }

        fn max_seen(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProxyVerifier for StubVerifier {
        async fn verify(&self, proxy: &Proxy, _timeout_secs: u64) -> TestOutcome {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            self.calls.lock().unwrap().push(proxy.host.clone());

            sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_hosts.contains(&proxy.host) {
                TestOutcome::failure("Connection refused")
            } else {
                TestOutcome::Success {
                    speed_ms: Some(750),
                    country: Some("Germany".to_string()),
                    country_code: Some("DE".to_string()),
                }
            }
        }
    }

    fn proxy_list(count: usize) -> Vec<Proxy> {
        (0..count)
            .map(|i| Proxy::new(format!("10.0.0.{}", i + 1), 8080, ProxyType::Http))
            .collect()
    }

    type Snapshots = Arc<Mutex<Vec<(Vec<Proxy>, f64)>>>;

    fn recorder() -> (Snapshots, impl Fn(Vec<Proxy>, f64) + Send + Sync + 'static) {
        let snapshots: Snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);
        let callback = move |proxies: Vec<Proxy>, progress: f64| {
            sink.lock().unwrap().push((proxies, progress));
        };
        (snapshots, callback)
    }

    fn tested_count(proxies: &[Proxy]) -> usize {
        proxies.iter().filter(|p| p.status.is_settled()).count()
    }

    #[tokio::test]
    async fn completed_run_settles_every_record() {
        let verifier = Arc::new(StubVerifier::new(5).failing_host("10.0.0.3"));
        let (snapshots, callback) = recorder();
        let settings = CheckerSettings::new().with_threads(3).with_batch_size(4);
        let checker = ProxyChecker::new(proxy_list(7), settings, verifier, callback);

        checker.start().await;

        let results = checker.proxies();
        assert!(results.iter().all(|p| p.status.is_settled()));

        let invalid: Vec<_> = results
            .iter()
            .filter(|p| p.status == ProxyStatus::Invalid)
            .collect();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].host, "10.0.0.3");
        assert_eq!(invalid[0].error.as_deref(), Some("Connection refused"));
        assert!(invalid[0].speed_ms.is_none());
        assert!(invalid[0].rating.is_none());

        for valid in results.iter().filter(|p| p.status == ProxyStatus::Valid) {
            assert_eq!(valid.speed_ms, Some(750));
            assert_eq!(valid.rating, Some(4));
            assert_eq!(valid.country_code.as_deref(), Some("DE"));
            assert!(valid.error.is_none());
        }

        // Tested counts never regress and reach the total exactly once
        let snapshots = snapshots.lock().unwrap();
        let counts: Vec<usize> = snapshots.iter().map(|(list, _)| tested_count(list)).collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(counts.iter().filter(|&&c| c == 7).count(), 1);
        let (_, final_progress) = snapshots.last().unwrap();
        assert_eq!(*final_progress, 100.0);
        assert!(!checker.is_active());
    }

    #[tokio::test]
    async fn concurrency_is_capped_by_threads() {
        let verifier = Arc::new(StubVerifier::new(30));
        let settings = CheckerSettings::new().with_threads(3).with_batch_size(10);
        let checker = ProxyChecker::new(proxy_list(10), settings, Arc::clone(&verifier) as Arc<dyn ProxyVerifier>, |_, _| {});

        checker.start().await;

        assert_eq!(verifier.max_seen(), 3);
        assert_eq!(verifier.calls().len(), 10);
    }

    #[tokio::test]
    async fn first_chunk_is_marked_testing_in_list_order() {
        let verifier = Arc::new(StubVerifier::new(5));
        let (snapshots, callback) = recorder();
        let settings = CheckerSettings::new().with_threads(2).with_batch_size(4);
        let checker = ProxyChecker::new(proxy_list(10), settings, verifier, callback);

        checker.start().await;

        let snapshots = snapshots.lock().unwrap();
        let (first, progress) = &snapshots[0];
        assert_eq!(*progress, 0.0);
        assert_eq!(first[0].status, ProxyStatus::Testing);
        assert_eq!(first[1].status, ProxyStatus::Testing);
        assert!(first[2..]
            .iter()
            .all(|p| p.status == ProxyStatus::Pending));
    }

    #[tokio::test]
    async fn stop_lets_in_flight_chunk_finish() {
        let verifier = Arc::new(StubVerifier::new(150));
        let settings = CheckerSettings::new().with_threads(2).with_batch_size(6);
        let checker = ProxyChecker::new(proxy_list(6), settings, Arc::clone(&verifier) as Arc<dyn ProxyVerifier>, |_, _| {});

        let runner = checker.clone();
        let handle = tokio::spawn(async move { runner.start().await });

        sleep(Duration::from_millis(50)).await;
        checker.stop();
        handle.await.unwrap();

        let results = checker.proxies();
        assert_eq!(tested_count(&results), 2);
        assert_eq!(
            results
                .iter()
                .filter(|p| p.status == ProxyStatus::Pending)
                .count(),
            4
        );
        assert_eq!(verifier.calls().len(), 2);
        assert!(!checker.is_active());
    }

    #[tokio::test]
    async fn pause_then_resume_tests_each_proxy_exactly_once() {
        let verifier = Arc::new(StubVerifier::new(100));
        let settings = CheckerSettings::new().with_threads(1).with_batch_size(2);
        let checker = ProxyChecker::new(proxy_list(4), settings, Arc::clone(&verifier) as Arc<dyn ProxyVerifier>, |_, _| {});

        let runner = checker.clone();
        let handle = tokio::spawn(async move { runner.start().await });

        sleep(Duration::from_millis(150)).await;
        checker.pause();
        sleep(Duration::from_millis(300)).await;

        // The chunk that was in flight when pause hit has drained; nothing
        // further was dispatched
        assert_eq!(tested_count(&checker.proxies()), 2);
        assert!(checker.is_active());

        checker.resume();
        handle.await.unwrap();

        let results = checker.proxies();
        assert!(results.iter().all(|p| p.status.is_settled()));

        let mut calls = verifier.calls();
        calls.sort();
        calls.dedup();
        assert_eq!(calls.len(), 4);
        assert_eq!(verifier.calls().len(), 4);
    }

    #[tokio::test]
    async fn stop_while_paused_unblocks_the_run() {
        let verifier = Arc::new(StubVerifier::new(100));
        let settings = CheckerSettings::new().with_threads(1).with_batch_size(1);
        let checker = ProxyChecker::new(proxy_list(3), settings, verifier, |_, _| {});

        let runner = checker.clone();
        let handle = tokio::spawn(async move { runner.start().await });

        sleep(Duration::from_millis(150)).await;
        checker.pause();
        sleep(Duration::from_millis(150)).await;
        checker.stop();
        handle.await.unwrap();

        let results = checker.proxies();
        assert_eq!(tested_count(&results), 2);
        assert!(!checker.is_active());
    }

    #[tokio::test]
    async fn start_with_no_pending_records_is_a_noop() {
        let mut proxies = proxy_list(2);
        for proxy in &mut proxies {
            proxy.status = ProxyStatus::Valid;
        }

        let verifier = Arc::new(StubVerifier::new(5));
        let (snapshots, callback) = recorder();
        let checker = ProxyChecker::new(proxies, CheckerSettings::new(), verifier, callback);

        checker.start().await;

        assert!(snapshots.lock().unwrap().is_empty());
        assert!(!checker.is_active());
    }

    #[tokio::test]
    async fn controls_before_start_are_harmless() {
        let verifier = Arc::new(StubVerifier::new(5));
        let checker = ProxyChecker::new(proxy_list(2), CheckerSettings::new(), verifier, |_, _| {});

        checker.pause();
        checker.resume();
        checker.stop();

        // A later start still runs to completion
        checker.start().await;
        assert!(checker.proxies().iter().all(|p| p.status.is_settled()));
    }

    #[tokio::test]
    async fn failure_outcome_populates_error_only() {
        let mut mock = MockProxyVerifier::new();
        mock.expect_verify()
            .times(1)
            .returning(|_, _| TestOutcome::failure("boom"));

        let checker = ProxyChecker::new(
            proxy_list(1),
            CheckerSettings::new(),
            Arc::new(mock),
            |_, _| {},
        );
        checker.start().await;

        let results = checker.proxies();
        assert_eq!(results[0].status, ProxyStatus::Invalid);
        assert_eq!(results[0].error.as_deref(), Some("boom"));
        assert!(results[0].speed_ms.is_none());
        assert!(results[0].rating.is_none());
    }

    #[tokio::test]
    async fn success_without_speed_has_no_rating() {
        let mut mock = MockProxyVerifier::new();
        mock.expect_verify().times(1).returning(|_, _| TestOutcome::Success {
            speed_ms: None,
            country: Some("Germany".to_string()),
            country_code: Some("DE".to_string()),
        });

        let checker = ProxyChecker::new(
            proxy_list(1),
            CheckerSettings::new(),
            Arc::new(mock),
            |_, _| {},
        );
        checker.start().await;

        let results = checker.proxies();
        assert_eq!(results[0].status, ProxyStatus::Valid);
        assert!(results[0].speed_ms.is_none());
        assert!(results[0].rating.is_none());
        assert_eq!(results[0].country_code.as_deref(), Some("DE"));
    }
}
