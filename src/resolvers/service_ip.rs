use eyre::Result;
use k8s_openapi::api::core::v1 as core;

use crate::Identity;
use crate::cache::Load;
use crate::snapshot::SharedSnapshot;

/// Finds the service reachable through a given cluster IP or load-balancer
/// ingress IP.
pub struct ServiceByIp {
    snapshot: SharedSnapshot,
}
impl ServiceByIp {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        Self { snapshot }
    }
}

impl Load for ServiceByIp {
    type Key = String;
    type Value = Option<Identity>;

    async fn load(&self, ip: &String) -> Result<Option<Identity>> {
        let svcs = self.snapshot.list_services()?;

        Ok((svcs.iter())
            .filter(|svc| has_ip(svc, ip))
            .find_map(|svc| Identity::try_from(&svc.metadata).ok()))
    }
}

fn has_ip(svc: &core::Service, ip: &str) -> bool {
    let (Some(spec), Some(status)) = (&svc.spec, &svc.status) else {
        return false;
    };

    let cluster_ip = (spec.cluster_ips.iter().flatten()).any(|cluster_ip| cluster_ip == ip);

    let ingress_ip = (status.load_balancer.iter())
        .flat_map(|lb| lb.ingress.iter().flatten())
        .any(|ingress| ingress.ip.as_deref() == Some(ip));

    cluster_ip || ingress_ip
}
