// ── Collector runner ──
//
// One task per (host, collector). Each task ticks on its own interval and
// runs fetch → parse → publish; nothing a collector does can fail another
// collector's task or the runner itself. Shutdown cancels every task,
// lets in-flight ticks finish within a grace period and aborts the rest.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::collector::Collector;
use crate::host::HostContext;
use crate::model::SourceIdentity;
use crate::publish::Publisher;

/// Default time allowed for in-flight ticks at shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// What one tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// `n` updates handed to the publisher.
    Published(usize),
    /// The collector had nothing to report.
    Empty,
    /// Fetch or publish failed; logged, nothing published.
    Failed,
}

/// Run a single fetch → parse → publish cycle.
pub async fn run_tick(
    collector: &dyn Collector,
    source: &SourceIdentity,
    publisher: &dyn Publisher,
) -> TickOutcome {
    trace!("fetching");
    let raw = match collector.fetch().await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, auth = e.is_auth(), transient = e.is_transient(), "fetch failed");
            return TickOutcome::Failed;
        }
    };

    trace!("parsing");
    let updates = collector.parse(&raw);
    if updates.is_empty() {
        debug!("no updates this tick");
        return TickOutcome::Empty;
    }

    let count = updates.len();
    trace!(count, "publishing");
    match publisher.publish(source, updates).await {
        Ok(()) => {
            debug!(count, "published");
            TickOutcome::Published(count)
        }
        Err(e) => {
            warn!(error = %e, "publish failed");
            TickOutcome::Failed
        }
    }
}

async fn collector_task(
    collector: Arc<dyn Collector>,
    source: SourceIdentity,
    publisher: Arc<dyn Publisher>,
    cancel: CancellationToken,
) {
    let period = collector.interval().max(Duration::from_secs(1));
    let mut interval = tokio::time::interval(period);
    // A slow tick pushes the schedule back instead of bursting to catch up.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let span = info_span!("tick", host = %source.host, collector = %source.collector);
                run_tick(collector.as_ref(), &source, publisher.as_ref())
                    .instrument(span)
                    .await;
            }
        }
    }
    debug!(%source, "collector task stopped");
}

pub struct Runner {
    publisher: Arc<dyn Publisher>,
    cancel: CancellationToken,
    tasks: Vec<(SourceIdentity, JoinHandle<()>)>,
}

impl Runner {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Start ticking `collector`. The first tick runs immediately.
    pub fn spawn(&mut self, source: SourceIdentity, collector: Arc<dyn Collector>) {
        info!(
            %source,
            interval_secs = collector.interval().as_secs(),
            legacy = collector.needs_legacy_auth(),
            "starting collector"
        );
        let handle = tokio::spawn(collector_task(
            collector,
            source.clone(),
            Arc::clone(&self.publisher),
            self.cancel.child_token(),
        ));
        self.tasks.push((source, handle));
    }

    /// Start every enabled collector of `host`. Returns how many started.
    pub fn spawn_host(&mut self, host: &HostContext) -> usize {
        let collectors = host.collectors();
        let count = collectors.len();
        for collector in collectors {
            let source = SourceIdentity::new(host.name(), collector.name());
            self.spawn(source, collector);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop all collectors. Ticks still running after `grace` are aborted.
    ///
    /// Returns the number of tasks that had to be aborted.
    pub async fn shutdown(self, grace: Duration) -> usize {
        self.cancel.cancel();

        let aborts: Vec<_> = self
            .tasks
            .iter()
            .map(|(source, handle)| (source.clone(), handle.abort_handle()))
            .collect();
        let handles = self.tasks.into_iter().map(|(_, handle)| handle);

        if tokio::time::timeout(grace, join_all(handles)).await.is_ok() {
            info!("all collectors stopped");
            return 0;
        }

        let mut aborted = 0;
        for (source, abort) in aborts {
            if !abort.is_finished() {
                warn!(%source, grace_secs = grace.as_secs(), "collector did not stop in time, aborting");
                abort.abort();
                aborted += 1;
            }
        }
        aborted
    }
}
