//! Loaders scanning the snapshot for the owner of a key.
//!
//! Records missing the parts a scan needs (metadata, spec, status) are
//! skipped, as are objects whose metadata has no name or namespace.

mod pod_ip;
mod pod_service;
mod service_ip;

pub use pod_ip::PodByIp;
pub use pod_service::{ServiceForPod, selector_matches};
pub use service_ip::ServiceByIp;
