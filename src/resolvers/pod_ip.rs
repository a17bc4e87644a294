use eyre::Result;

use crate::Identity;
use crate::cache::Load;
use crate::snapshot::SharedSnapshot;

/// Finds the pod having a given IP.
///
/// If several pods report the same IP, whichever the snapshot lists first
/// wins.
pub struct PodByIp {
    snapshot: SharedSnapshot,
}
impl PodByIp {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Load for PodByIp {
    type Key = String;
    type Value = Option<Identity>;

    async fn load(&self, ip: &String) -> Result<Option<Identity>> {
        let pods = self.snapshot.list_pods()?;

        Ok((pods.iter())
            .filter(|pod| pod.status.as_ref().and_then(|s| s.pod_ip.as_ref()) == Some(ip))
            .find_map(|pod| Identity::try_from(&pod.metadata).ok()))
    }
}
