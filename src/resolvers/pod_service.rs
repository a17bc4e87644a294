use eyre::Result;
use log::trace;
use std::collections::BTreeMap as Map;

use crate::Identity;
use crate::cache::Load;
use crate::snapshot::SharedSnapshot;

/// Finds the service selecting a given pod.
///
/// Pods and services don't reference each other: a service owns the pods
/// whose labels include all of its selector. A service with an empty
/// selector therefore owns every pod, and wins if listed first.
pub struct ServiceForPod {
    snapshot: SharedSnapshot,
}
impl ServiceForPod {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Load for ServiceForPod {
    type Key = Identity;
    type Value = Option<Identity>;

    async fn load(&self, pod_id: &Identity) -> Result<Option<Identity>> {
        let pods = self.snapshot.list_pods()?;

        let pod = (pods.iter())
            .find(|pod| Identity::try_from(&pod.metadata).is_ok_and(|id| &id == pod_id));

        let Some(labels) = pod.and_then(|pod| pod.metadata.labels.as_ref()) else {
            trace!("{pod_id}: no such pod or no labels");
            return Ok(None);
        };

        let svcs = self.snapshot.list_services()?;

        Ok((svcs.iter())
            .filter(|svc| {
                let selector = svc.spec.as_ref().and_then(|spec| spec.selector.as_ref());
                selector.is_some_and(|selector| selector_matches(selector, labels))
            })
            .find_map(|svc| Identity::try_from(&svc.metadata).ok()))
    }
}

/// true when every selector entry is in the labels with the same value.
pub fn selector_matches(selector: &Map<String, String>, labels: &Map<String, String>) -> bool {
    (selector.iter()).all(|(k, v)| labels.get(k) == Some(v))
}
