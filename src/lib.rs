use eyre::Result;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as meta;

pub mod cache;
pub mod registry;
pub mod resolvers;
pub mod snapshot;

use resolvers::{PodByIp, ServiceByIp, ServiceForPod};
use snapshot::SharedSnapshot;

pub const SEPARATOR: char = '.';

/// Name and namespace of a pod or a service, written `name.namespace`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    pub name: String,
    pub namespace: String,
}
impl Identity {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}
impl TryFrom<&meta::ObjectMeta> for Identity {
    type Error = &'static str;
    fn try_from(metadata: &meta::ObjectMeta) -> Result<Self, Self::Error> {
        Ok(Self {
            name: metadata.name.clone().ok_or("no name")?,
            namespace: metadata.namespace.clone().ok_or("no namespace")?,
        })
    }
}
impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}{SEPARATOR}{}", self.name, self.namespace)
    }
}
impl std::str::FromStr for Identity {
    type Err = &'static str;
    /// namespaces can't contain the separator, names can
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, namespace) = s.rsplit_once(SEPARATOR).ok_or("no separator")?;
        if name.is_empty() || namespace.is_empty() {
            return Err("empty name or namespace");
        }
        Ok(Self::new(name, namespace))
    }
}
impl serde::Serialize for Identity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Resolves pods and services to their owners, each lookup memoized for the
/// cache expiry (not-found results included).
///
/// The three caches expire independently, so answers may come from
/// snapshots taken at different times.
pub struct Registry {
    service_for_pod: cache::Cache<ServiceForPod>,
    pod_by_ip: cache::Cache<PodByIp>,
    service_by_ip: cache::Cache<ServiceByIp>,
}
impl Registry {
    pub fn new(snapshot: SharedSnapshot) -> Self {
        registry::Builder::default().build(snapshot)
    }

    pub async fn service_for_pod(&self, namespace: &str, pod_name: &str) -> Result<Option<Identity>> {
        let pod_id = Identity::new(pod_name, namespace);
        Ok(self.service_for_pod.get(&pod_id).await?)
    }

    pub async fn pod_by_ip(&self, ip: &str) -> Result<Option<Identity>> {
        Ok(self.pod_by_ip.get(&ip.to_string()).await?)
    }

    pub async fn service_by_ip(&self, ip: &str) -> Result<Option<Identity>> {
        Ok(self.service_by_ip.get(&ip.to_string()).await?)
    }
}

#[cfg(test)]
mod test;
