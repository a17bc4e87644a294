use eyre::{Result, format_err};
use k8s_openapi::api::core::v1 as core;
use kube::runtime::reflector::Store;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub type SharedSnapshot = Arc<dyn Snapshot>;

/// Current known set of pods and services.
///
/// Listing is expected to be cheap (a local copy of the cluster state) and is
/// called synchronously on every cache miss.
pub trait Snapshot: Send + Sync {
    fn list_pods(&self) -> Result<Vec<Arc<core::Pod>>>;
    fn list_services(&self) -> Result<Vec<Arc<core::Service>>>;
}

/// Snapshot maintained by kube reflectors.
pub struct Kube {
    pub pods: Store<core::Pod>,
    pub services: Store<core::Service>,
}
impl Snapshot for Kube {
    fn list_pods(&self) -> Result<Vec<Arc<core::Pod>>> {
        Ok(self.pods.state())
    }
    fn list_services(&self) -> Result<Vec<Arc<core::Service>>> {
        Ok(self.services.state())
    }
}

/// Fixed set of objects, listed in insertion order.
#[derive(Default)]
pub struct Fixed {
    pods: Vec<Arc<core::Pod>>,
    services: Vec<Arc<core::Service>>,
    failing: AtomicBool,
    pod_lists: AtomicUsize,
    service_lists: AtomicUsize,
}
impl Fixed {
    pub fn new(pods: Vec<core::Pod>, services: Vec<core::Service>) -> Self {
        Self {
            pods: pods.into_iter().map(Arc::new).collect(),
            services: services.into_iter().map(Arc::new).collect(),
            ..Default::default()
        }
    }

    /// make every listing fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// number of pod listings requested so far
    pub fn pod_lists(&self) -> usize {
        self.pod_lists.load(Ordering::SeqCst)
    }

    /// number of service listings requested so far
    pub fn service_lists(&self) -> usize {
        self.service_lists.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(format_err!("snapshot unavailable"));
        }
        Ok(())
    }
}
impl Snapshot for Fixed {
    fn list_pods(&self) -> Result<Vec<Arc<core::Pod>>> {
        self.pod_lists.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.pods.clone())
    }
    fn list_services(&self) -> Result<Vec<Arc<core::Service>>> {
        self.service_lists.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.services.clone())
    }
}
