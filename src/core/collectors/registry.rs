use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    collector::{QueryCollector, RegistrationState},
    error::ExporterError,
    exposition::Exposition,
    traits::QueryRunner,
    types::{ExporterResult, MetricKind},
};

/// What a call to [`CollectorRegistry::register`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The name was new and now has a collector.
    Registered,
    /// An older collector was unregistered and the new one took its place.
    Replaced,
    /// The name was already registered during the current cycle.
    Skipped,
}

struct Entry {
    collector: Arc<QueryCollector>,
    cycle: u64,
    /// Query file the live collector was loaded from.
    owner: PathBuf,
}

/// The set of live collectors, keyed by metric name.
///
/// At most one collector is live per name. The check for an existing
/// registration and the registration itself happen under one lock, so two
/// files defining the same metric in the same cycle cannot both register it:
/// the first wins and the second is skipped. In a later cycle the same name
/// is replaced instead, which is how edited query files take effect.
///
/// Each entry records the file it was loaded from. Only that file refreshes
/// the metric, so a name defined in several files is still queried once per
/// cycle; a replacement moves ownership to the replacing file.
pub struct CollectorRegistry {
    exposition: Arc<dyn Exposition>,
    entries: Mutex<HashMap<String, Entry>>,
    cycle: AtomicU64,
}

impl CollectorRegistry {
    pub fn new(exposition: Arc<dyn Exposition>) -> Self {
        Self {
            exposition,
            entries: Mutex::new(HashMap::new()),
            cycle: AtomicU64::new(0),
        }
    }

    /// Starts a new refresh cycle and returns its number.
    ///
    /// Deduplication of concurrent registrations is scoped to one cycle.
    pub fn begin_cycle(&self) -> u64 {
        self.cycle.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn current_cycle(&self) -> u64 {
        self.cycle.load(Ordering::Acquire)
    }

    /// Registers a collector for `name`, replacing the previous one if any.
    ///
    /// A previous collector is unregistered first. If that fails the replace
    /// is aborted and the old collector stays live. If the new collector is
    /// then rejected by the exposition layer, the name is left unregistered.
    pub async fn register(
        &self,
        owner: &Path,
        name: &str,
        kind: MetricKind,
        query: &str,
        runner: Arc<dyn QueryRunner>,
    ) -> ExporterResult<RegisterOutcome> {
        let cycle = self.current_cycle();
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries.get(name) {
            if existing.cycle == cycle {
                debug!("Skipping '{}': already registered in cycle {}", name, cycle);
                return Ok(RegisterOutcome::Skipped);
            }
        }

        let collector = Arc::new(QueryCollector::new(name, kind, query, runner)?);

        let replaced = if let Some(existing) = entries.get(name) {
            if !self.exposition.unregister(&existing.collector) {
                warn!("Failed to unregister '{}', keeping previous collector", name);
                return Err(ExporterError::Unregistration(name.to_string()));
            }
            existing.collector.set_state(RegistrationState::Unregistered);
            true
        } else {
            false
        };
        if replaced {
            entries.remove(name);
        }

        self.exposition.register(Arc::clone(&collector))?;
        collector.set_state(RegistrationState::Registered);
        let kind = collector.kind();
        entries.insert(
            name.to_string(),
            Entry {
                collector,
                cycle,
                owner: owner.to_path_buf(),
            },
        );

        if replaced {
            info!("Re-registered: {} ({}) from {}", name, kind, owner.display());
            Ok(RegisterOutcome::Replaced)
        } else {
            info!("Registered: {} ({}) from {}", name, kind, owner.display());
            Ok(RegisterOutcome::Registered)
        }
    }

    /// Recomputes the cached value of the collector registered for `name`.
    ///
    /// The registry lock is released before the query runs. A failed query
    /// keeps the collector registered with its previous value.
    pub async fn update(&self, name: &str) -> ExporterResult<f64> {
        let collector = self
            .get(name)
            .await
            .ok_or_else(|| ExporterError::CollectorNotFound(name.to_string()))?;
        collector.update().await
    }

    pub async fn get(&self, name: &str) -> Option<Arc<QueryCollector>> {
        self.entries
            .lock()
            .await
            .get(name)
            .map(|entry| Arc::clone(&entry.collector))
    }

    /// Query file the live collector for `name` was loaded from.
    pub async fn owner(&self, name: &str) -> Option<PathBuf> {
        self.entries
            .lock()
            .await
            .get(name)
            .map(|entry| entry.owner.clone())
    }

    /// Registered metric names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
