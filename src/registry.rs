use crate::Registry;
use crate::cache;
use crate::resolvers::{PodByIp, ServiceByIp, ServiceForPod};
use crate::snapshot::SharedSnapshot;

/// Same cache settings for the three lookups.
#[derive(Default)]
pub struct Builder {
    pub cache: cache::Builder,
}
impl Builder {
    pub fn build(self, snapshot: SharedSnapshot) -> Registry {
        Registry {
            service_for_pod: self.cache.build(ServiceForPod::new(snapshot.clone())),
            pod_by_ip: self.cache.build(PodByIp::new(snapshot.clone())),
            service_by_ip: self.cache.build(ServiceByIp::new(snapshot)),
        }
    }
}
