use std::sync::Arc;

use prometheus::{
    core::{Collector, Desc},
    proto::MetricFamily,
    Encoder, Registry, TextEncoder,
};
use tracing::debug;

use super::{collector::QueryCollector, error::ExporterError, types::ExporterResult};

/// The layer that makes collector values visible to scrapers.
///
/// The collector registry only talks to this trait, so the process-wide
/// Prometheus registry is passed in explicitly and tests can count or fail
/// registrations.
pub trait Exposition: Send + Sync {
    /// Makes `collector` visible under its metric name.
    fn register(&self, collector: Arc<QueryCollector>) -> ExporterResult<()>;

    /// Removes `collector`. Returns `false` if it was not registered.
    fn unregister(&self, collector: &Arc<QueryCollector>) -> bool;
}

/// Adapter that lets a shared collector live inside a `prometheus::Registry`.
struct SharedCollector(Arc<QueryCollector>);

impl Collector for SharedCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.0.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.0.collect()
    }
}

/// [`Exposition`] backed by a `prometheus::Registry`.
#[derive(Clone, Default)]
pub struct PrometheusExposition {
    registry: Registry,
}

impl PrometheusExposition {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Exposition for PrometheusExposition {
    fn register(&self, collector: Arc<QueryCollector>) -> ExporterResult<()> {
        let metric = collector.name().to_string();
        self.registry
            .register(Box::new(SharedCollector(collector)))
            .map_err(|e| ExporterError::Registration {
                metric: metric.clone(),
                reason: e.to_string(),
            })?;
        debug!("Exposed '{}'", metric);
        Ok(())
    }

    fn unregister(&self, collector: &Arc<QueryCollector>) -> bool {
        let removed = self
            .registry
            .unregister(Box::new(SharedCollector(Arc::clone(collector))))
            .is_ok();
        debug!("Unexposed '{}': {}", collector.name(), removed);
        removed
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Mutex,
        },
    };

    use super::*;

    /// Records calls and can be told to fail.
    #[derive(Default)]
    pub struct FakeExposition {
        live: Mutex<HashSet<String>>,
        pub register_calls: AtomicUsize,
        pub unregister_calls: AtomicUsize,
        pub fail_register: AtomicBool,
        pub fail_unregister: AtomicBool,
    }

    impl FakeExposition {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_live(&self, name: &str) -> bool {
            self.live.lock().unwrap().contains(name)
        }

        pub fn registers(&self) -> usize {
            self.register_calls.load(Ordering::SeqCst)
        }

        pub fn unregisters(&self) -> usize {
            self.unregister_calls.load(Ordering::SeqCst)
        }
    }

    impl Exposition for FakeExposition {
        fn register(&self, collector: Arc<QueryCollector>) -> ExporterResult<()> {
            self.register_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_register.load(Ordering::SeqCst) {
                return Err(ExporterError::Registration {
                    metric: collector.name().to_string(),
                    reason: "rejected".into(),
                });
            }
            if !self.live.lock().unwrap().insert(collector.name().to_string()) {
                return Err(ExporterError::Registration {
                    metric: collector.name().to_string(),
                    reason: "duplicate".into(),
                });
            }
            Ok(())
        }

        fn unregister(&self, collector: &Arc<QueryCollector>) -> bool {
            self.unregister_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_unregister.load(Ordering::SeqCst) {
                return false;
            }
            self.live.lock().unwrap().remove(collector.name())
        }
    }
}
