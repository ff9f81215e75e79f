//! Refresh orchestrator.
//!
//! The `Orchestrator` runs the refresh cycle: every watched query file is
//! handled by its own task, the tasks are joined, and the loop then sleeps
//! until the next wall-clock instant that is a multiple of the refresh
//! interval. Aligning on wall-clock multiples keeps refreshes of separate
//! instances (and of restarted ones) on the same schedule.
//!
//! A changed (or never loaded) file is parsed and its metrics are registered
//! again; an unchanged file only gets its metrics recomputed. Errors are
//! logged per file and never stop the loop.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use tokio::{sync::Mutex, task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{
    collectors::{
        error::ExporterError,
        registry::{CollectorRegistry, RegisterOutcome},
        traits::QueryRunner,
        types::{ExporterResult, MetricKind},
    },
    fs::FileSystem,
    parser,
    readiness::{Readiness, ReadinessState},
    source::QuerySource,
    substitute::{single_statement, Variables},
};

/// Everything a per-file task needs, shared by all tasks of a cycle.
struct CycleContext {
    registry: Arc<CollectorRegistry>,
    runner: Arc<dyn QueryRunner>,
    fs: Arc<dyn FileSystem>,
    vars: Variables,
}

/// What happened to one file during a cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub reloaded: bool,
    pub registered: usize,
    pub skipped: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Totals for one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub files: usize,
    pub failed_files: usize,
    pub reloaded_files: usize,
    pub registered: usize,
    pub skipped: usize,
    pub updated: usize,
    pub errors: usize,
}

impl CycleReport {
    fn add(&mut self, file: &FileReport) {
        self.reloaded_files += usize::from(file.reloaded);
        self.registered += file.registered;
        self.skipped += file.skipped;
        self.updated += file.updated;
        self.errors += file.errors;
    }
}

/// Drives refresh cycles over the watched query files.
pub struct Orchestrator {
    sources: Vec<Arc<Mutex<QuerySource>>>,
    ctx: Arc<CycleContext>,
    interval: Duration,
    readiness: Readiness,
}

impl Orchestrator {
    /// Creates an orchestrator watching `paths`.
    ///
    /// # Arguments
    /// * `paths` - Query files to watch, one task per file and cycle
    /// * `registry` - Registry the file's metrics are registered in
    /// * `runner` - Runner every collector executes its query with
    /// * `fs` - Filesystem used to stat and read the files
    /// * `vars` - Placeholder values substituted into every query
    /// * `interval` - Refresh interval; cycles start on its wall-clock multiples
    /// * `readiness` - Set to ready after the first cycle
    pub fn new(
        paths: impl IntoIterator<Item = PathBuf>,
        registry: Arc<CollectorRegistry>,
        runner: Arc<dyn QueryRunner>,
        fs: Arc<dyn FileSystem>,
        vars: Variables,
        interval: Duration,
        readiness: Readiness,
    ) -> Self {
        let sources = paths
            .into_iter()
            .map(|path| Arc::new(Mutex::new(QuerySource::new(path))))
            .collect();

        Self {
            sources,
            ctx: Arc::new(CycleContext {
                registry,
                runner,
                fs,
                vars,
            }),
            interval,
            readiness,
        }
    }

    pub fn registry(&self) -> &Arc<CollectorRegistry> {
        &self.ctx.registry
    }

    /// Snapshot of the watched files' state.
    pub async fn sources(&self) -> Vec<QuerySource> {
        let mut out = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            out.push(source.lock().await.clone());
        }
        out
    }

    /// Runs one cycle over all files and waits for every file to finish.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle = self.ctx.registry.begin_cycle();
        let mut report = CycleReport {
            cycle,
            files: self.sources.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            let ctx = Arc::clone(&self.ctx);
            let span = info_span!("query_file", cycle);
            tasks.spawn(
                async move {
                    let mut source = source.lock().await;
                    let path = source.path().display().to_string();
                    (path, process_source(&mut source, &ctx).await)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(file))) => report.add(&file),
                Ok((path, Err(e))) => {
                    error!("Error: {}: {}", path, e);
                    report.failed_files += 1;
                }
                Err(e) => {
                    error!("Query file task failed: {}", e);
                    report.failed_files += 1;
                }
            }
        }

        info!(
            "Cycle {} finished: files={} failed={} reloaded={} registered={} updated={} errors={}",
            report.cycle,
            report.files,
            report.failed_files,
            report.reloaded_files,
            report.registered,
            report.updated,
            report.errors
        );
        report
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// Cancellation is observed between cycles and while sleeping; a cycle
    /// that already started always runs to completion.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Refresh loop started ({} files, interval: {}s)",
            self.sources.len(),
            self.interval.as_secs()
        );

        while !cancel.is_cancelled() {
            self.run_cycle().await;
            self.readiness.set_state(ReadinessState::Ready);

            let wait = delay_until_next(SystemTime::now(), self.interval);
            debug!("Sleeping {:?} until the next refresh boundary", wait);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(wait) => {}
            }
        }

        self.readiness.set_state(ReadinessState::Stopping);
        info!("Refresh loop stopped");
    }
}

/// Handles one file: reload it if it changed, otherwise refresh its metrics.
async fn process_source(source: &mut QuerySource, ctx: &CycleContext) -> ExporterResult<FileReport> {
    let modified = source.is_modified(ctx.fs.as_ref()).await?;

    if modified || !source.is_loaded() {
        load_source(source, ctx).await
    } else {
        Ok(refresh_source(source, ctx).await)
    }
}

/// Parses the file and registers every metric it defines.
async fn load_source(source: &mut QuerySource, ctx: &CycleContext) -> ExporterResult<FileReport> {
    let metrics = match parser::parse_file(ctx.fs.as_ref(), source.path()).await {
        Ok(metrics) => metrics,
        Err(e) => {
            // Parse again next cycle even if the file does not change.
            source.invalidate();
            return Err(e);
        }
    };

    let mut report = FileReport {
        reloaded: true,
        ..Default::default()
    };
    let mut owned = Vec::new();

    for def in parser::definitions(metrics) {
        let query = match single_statement(&def.name, &def.query, &ctx.vars) {
            Ok(query) => query,
            Err(e) => {
                error!("Error: {}: {}", source.path().display(), e);
                report.errors += 1;
                continue;
            }
        };

        match ctx
            .registry
            .register(
                source.path(),
                &def.name,
                MetricKind::Gauge,
                &query,
                Arc::clone(&ctx.runner),
            )
            .await
        {
            Ok(RegisterOutcome::Skipped) => report.skipped += 1,
            Ok(_) => {
                report.registered += 1;
                let start = std::time::Instant::now();
                match ctx.registry.update(&def.name).await {
                    Ok(_) => report.updated += 1,
                    Err(_) => report.errors += 1,
                }
                info!("Updating: {} {:?}", def.name, start.elapsed());
                owned.push(def.name);
            }
            Err(e @ ExporterError::Unregistration(_)) => {
                // The previous collector is still live; keep refreshing it.
                error!("Error: {}: {}", source.path().display(), e);
                report.errors += 1;
                owned.push(def.name);
            }
            Err(e) => {
                error!("Error: {}: {}", source.path().display(), e);
                report.errors += 1;
            }
        }
    }

    for stale in source.metrics().iter().filter(|name| !owned.contains(name)) {
        warn!(
            "Metric '{}' is no longer defined in {}, keeping its last collector",
            stale,
            source.path().display()
        );
    }

    source.set_metrics(owned);
    Ok(report)
}

/// Recomputes every metric the file owns.
///
/// Names whose live collector was since loaded from another file are handed
/// over to that file and dropped from this one.
async fn refresh_source(source: &mut QuerySource, ctx: &CycleContext) -> FileReport {
    let mut report = FileReport::default();
    let mut owned = Vec::with_capacity(source.metrics().len());

    for name in source.metrics() {
        if ctx.registry.owner(name).await.as_deref() != Some(source.path()) {
            debug!(
                "'{}' is no longer refreshed from {}",
                name,
                source.path().display()
            );
            continue;
        }
        owned.push(name.clone());

        let start = std::time::Instant::now();
        match ctx.registry.update(name).await {
            Ok(_) => report.updated += 1,
            Err(e) => {
                error!("Error: {}: {}", source.path().display(), e);
                report.errors += 1;
            }
        }
        info!("Updating: {} {:?}", name, start.elapsed());
    }

    if owned.len() != source.metrics().len() {
        source.set_metrics(owned);
    }
    report
}

/// The first instant strictly after `now` that is a whole multiple of
/// `interval` since the Unix epoch.
pub fn next_boundary(now: SystemTime, interval: Duration) -> SystemTime {
    now + delay_until_next(now, interval)
}

/// Time from `now` until [`next_boundary`]. Always in `(0, interval]`.
pub fn delay_until_next(now: SystemTime, interval: Duration) -> Duration {
    let interval_nanos = interval.as_nanos().max(1);
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let remaining = interval_nanos - since_epoch % interval_nanos;
    Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
}
