use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use prometheus::{
    core::{Collector, Desc},
    proto::MetricFamily,
    Gauge, Opts,
};
use tracing::{debug, warn};

use super::{
    error::ExporterError,
    traits::QueryRunner,
    types::{ExporterResult, MetricKind},
};

/// Whether a collector is currently visible to the exposition layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    Registered,
}

/// A live metric backed by one warehouse query.
///
/// The collector keeps the value of the last successful update and hands it
/// to Prometheus on every scrape, so scrapes never run the query. A failed
/// update leaves the cached value in place and is remembered in
/// [`last_error`](QueryCollector::last_error) until the next success.
pub struct QueryCollector {
    name: String,
    kind: MetricKind,
    query: String,
    runner: Arc<dyn QueryRunner>,
    gauge: Gauge,
    last_error: Mutex<Option<String>>,
    registered: AtomicBool,
}

impl QueryCollector {
    /// Builds an unregistered collector with a zero value.
    ///
    /// Fails when `name` is not a valid Prometheus metric name.
    pub fn new(
        name: impl Into<String>,
        kind: MetricKind,
        query: impl Into<String>,
        runner: Arc<dyn QueryRunner>,
    ) -> ExporterResult<Self> {
        let name = name.into();
        let opts = Opts::new(name.clone(), format!("Result of the {} query", name));
        let gauge = Gauge::with_opts(opts).map_err(|e| ExporterError::Registration {
            metric: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name,
            kind,
            query: query.into(),
            runner,
            gauge,
            last_error: Mutex::new(None),
            registered: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Value of the last successful update.
    pub fn value(&self) -> f64 {
        self.gauge.get()
    }

    /// Error of the most recent update, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.lock_error().clone()
    }

    pub fn state(&self) -> RegistrationState {
        if self.registered.load(Ordering::Acquire) {
            RegistrationState::Registered
        } else {
            RegistrationState::Unregistered
        }
    }

    pub(crate) fn set_state(&self, state: RegistrationState) {
        self.registered
            .store(state == RegistrationState::Registered, Ordering::Release);
    }

    /// Runs the query again and caches the result.
    pub async fn update(&self) -> ExporterResult<f64> {
        match self.runner.execute(&self.name, &self.query).await {
            Ok(value) => {
                self.gauge.set(value);
                *self.lock_error() = None;
                debug!("Updated '{}' = {}", self.name, value);
                Ok(value)
            }
            Err(e) => {
                warn!("Update of '{}' failed, keeping {}: {}", self.name, self.value(), e);
                *self.lock_error() = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn lock_error(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.last_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for QueryCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCollector")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &self.value())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Collector for QueryCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauge.collect()
    }
}


#[cfg(test)]
mod tests {
    use super::{fake::ScriptedRunner, *};

    fn collector(runner: Arc<ScriptedRunner>) -> QueryCollector {
        QueryCollector::new("rows_total", MetricKind::Gauge, "SELECT 1;", runner).unwrap()
    }

    #[tokio::test]
    async fn update_caches_value() {
        let runner = Arc::new(ScriptedRunner::new(0.0));
        runner.push_ok(42.0);
        let c = collector(runner.clone());

        assert_eq!(c.value(), 0.0);
        assert_eq!(c.update().await.unwrap(), 42.0);
        assert_eq!(c.value(), 42.0);
        assert_eq!(c.last_error(), None);
        assert_eq!(runner.calls(), vec![("rows_total".into(), "SELECT 1;".into())]);
    }

    #[tokio::test]
    async fn failed_update_keeps_previous_value() {
        let runner = Arc::new(ScriptedRunner::new(0.0));
        runner.push_ok(7.0);
        runner.push_err("warehouse unavailable");
        runner.push_ok(8.0);
        let c = collector(runner);

        c.update().await.unwrap();
        let err = c.update().await.unwrap_err();

        assert!(matches!(err, ExporterError::Query { .. }));
        assert_eq!(c.value(), 7.0);
        assert!(c.last_error().unwrap().contains("warehouse unavailable"));

        c.update().await.unwrap();
        assert_eq!(c.value(), 8.0);
        assert_eq!(c.last_error(), None);
    }

    #[test]
    fn invalid_metric_name_is_rejected() {
        let runner = Arc::new(ScriptedRunner::new(0.0));
        let err = QueryCollector::new("bad name!", MetricKind::Gauge, "SELECT 1;", runner)
            .unwrap_err();
        assert!(matches!(err, ExporterError::Registration { .. }));
    }

    #[tokio::test]
    async fn collect_exports_cached_gauge() {
        let runner = Arc::new(ScriptedRunner::new(3.5));
        let c = collector(runner);
        c.update().await.unwrap();

        let families = c.collect();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_name(), "rows_total");
        assert_eq!(families[0].get_metric()[0].get_gauge().get_value(), 3.5);
        assert_eq!(c.desc().len(), 1);
    }

    #[test]
    fn starts_unregistered() {
        let c = collector(Arc::new(ScriptedRunner::new(0.0)));
        assert_eq!(c.state(), RegistrationState::Unregistered);
        c.set_state(RegistrationState::Registered);
        assert_eq!(c.state(), RegistrationState::Registered);
    }
}
