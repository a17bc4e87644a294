use super::*;

use k8s_openapi::api::core::v1 as core;
use serde_json::json;
use std::sync::Arc;
use crate::snapshot::Fixed;

const NGINX_POD: &str = "my-nginx-5dc4865748-mbczh";

fn pod(name: &str, namespace: &str, ip: Option<&str>, labels: serde_json::Value) -> core::Pod {
    let mut pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": { "name": name, "namespace": namespace },
        "status": {},
    });
    if !labels.is_null() {
        pod["metadata"]["labels"] = labels;
    }
    if let Some(ip) = ip {
        pod["status"]["podIP"] = json!(ip);
    }
    serde_json::from_value(pod).expect("valid pod")
}

fn service(
    name: &str,
    namespace: &str,
    selector: serde_json::Value,
    cluster_ips: &[&str],
    ingress_ips: &[&str],
) -> core::Service {
    let ingress: Vec<_> = ingress_ips.iter().map(|ip| json!({ "ip": ip })).collect();
    let mut svc = json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "clusterIPs": cluster_ips },
        "status": { "loadBalancer": { "ingress": ingress } },
    });
    if !selector.is_null() {
        svc["spec"]["selector"] = selector;
    }
    serde_json::from_value(svc).expect("valid service")
}

fn cluster() -> Fixed {
    Fixed::new(
        vec![
            pod(NGINX_POD, "default", Some("1.1.1.1"), json!({ "run": "nginx" })),
            pod(
                "kube-state-metrics-6f979fd498-z7xwx",
                "kube-system",
                Some("1.1.1.2"),
                json!({ "app.kubernetes.io/name": "kube-state-metrics", "pod-template-hash": "6f979fd498" }),
            ),
            pod("my-nginx-5dc4865748-no-service", "default", Some("1.1.1.3"), json!({ "run": "nginx-no" })),
            pod("unlabeled", "default", Some("1.1.1.4"), json!(null)),
        ],
        vec![
            service(
                "nginx-service",
                "default",
                json!({ "run": "nginx" }),
                &["2.2.2.3"],
                &["2.2.2.1"],
            ),
            service(
                "kube-state-metrics",
                "kube-system",
                json!({ "app.kubernetes.io/name": "kube-state-metrics" }),
                &["2.2.2.2"],
                &[],
            ),
            service("kubernetes", "default", json!(null), &["10.0.0.1"], &[]),
        ],
    )
}

fn registry(snapshot: &Arc<Fixed>) -> Registry {
    Registry::new(snapshot.clone())
}

#[tokio::test]
async fn test_service_for_pod() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);

    let svc = registry.service_for_pod("default", NGINX_POD).await?;
    assert_eq!(Some("nginx-service.default".to_string()), svc.map(|s| s.to_string()));

    let svc = (registry.service_for_pod("kube-system", "kube-state-metrics-6f979fd498-z7xwx")).await?;
    assert_eq!(Some(Identity::new("kube-state-metrics", "kube-system")), svc);

    Ok(())
}

#[tokio::test]
async fn test_service_for_pod_not_found() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);

    assert_eq!(None, registry.service_for_pod("default", "my-nginx-5dc4865748-no-service").await?);
    assert_eq!(None, registry.service_for_pod("default", "unlabeled").await?);
    // namespace is part of the pod's identity
    assert_eq!(None, registry.service_for_pod("kube-system", NGINX_POD).await?);

    Ok(())
}

#[tokio::test]
async fn test_service_for_unknown_pod_skips_service_scan() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);

    assert_eq!(None, registry.service_for_pod("default", "my-nginx-5dc4865748-no-pod").await?);
    assert_eq!(None, registry.service_for_pod("default", "unlabeled").await?);
    assert_eq!(2, snapshot.pod_lists());
    assert_eq!(0, snapshot.service_lists());

    Ok(())
}

#[tokio::test]
async fn test_service_for_pod_first_match_wins() -> Result<()> {
    let snapshot = Arc::new(Fixed::new(
        vec![pod("web-0", "shop", None, json!({ "app": "web", "tier": "front" }))],
        vec![
            service("web-front", "shop", json!({ "app": "web", "tier": "front" }), &[], &[]),
            service("web", "shop", json!({ "app": "web" }), &[], &[]),
        ],
    ));
    let registry = registry(&snapshot);

    let svc = registry.service_for_pod("shop", "web-0").await?;
    assert_eq!(Some(Identity::new("web-front", "shop")), svc);

    Ok(())
}

#[tokio::test]
async fn test_empty_selector_matches_any_pod() -> Result<()> {
    let snapshot = Arc::new(Fixed::new(
        vec![pod("web-0", "shop", None, json!({ "app": "web" }))],
        vec![
            service("catch-all", "shop", json!({}), &[], &[]),
            service("web", "shop", json!({ "app": "web" }), &[], &[]),
        ],
    ));
    let registry = registry(&snapshot);

    let svc = registry.service_for_pod("shop", "web-0").await?;
    assert_eq!(Some(Identity::new("catch-all", "shop")), svc);

    Ok(())
}

#[tokio::test]
async fn test_pod_by_ip() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);

    let pod = registry.pod_by_ip("1.1.1.1").await?;
    assert_eq!(Some(format!("{NGINX_POD}.default")), pod.map(|p| p.to_string()));

    assert_eq!(None, registry.pod_by_ip("9.9.9.9").await?);

    Ok(())
}

#[tokio::test]
async fn test_pod_by_ip_caches_not_found() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);

    for _ in 0..3 {
        assert_eq!(None, registry.pod_by_ip("9.9.9.9").await?);
    }
    assert_eq!(1, snapshot.pod_lists());

    Ok(())
}

#[tokio::test]
async fn test_service_by_ip() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);
    let nginx = Some(Identity::new("nginx-service", "default"));

    assert_eq!(nginx, registry.service_by_ip("2.2.2.1").await?);
    assert_eq!(nginx, registry.service_by_ip("2.2.2.3").await?);
    assert_eq!(
        Some(Identity::new("kube-state-metrics", "kube-system")),
        registry.service_by_ip("2.2.2.2").await?
    );
    assert_eq!(None, registry.service_by_ip("1.1.1.1").await?);

    Ok(())
}

#[tokio::test]
async fn test_service_by_ip_requires_status() -> Result<()> {
    let mut svc = service("no-status", "default", json!(null), &["3.3.3.3"], &[]);
    svc.status = None;
    let snapshot = Arc::new(Fixed::new(vec![], vec![svc]));
    let registry = registry(&snapshot);

    assert_eq!(None, registry.service_by_ip("3.3.3.3").await?);

    Ok(())
}

#[tokio::test]
async fn test_snapshot_failure_is_not_cached() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);

    snapshot.set_failing(true);
    let err = registry.pod_by_ip("1.1.1.1").await.expect_err("snapshot is failing");
    assert!(err.to_string().contains("snapshot unavailable"));
    assert!(registry.service_for_pod("default", NGINX_POD).await.is_err());

    snapshot.set_failing(false);
    assert!(registry.pod_by_ip("1.1.1.1").await?.is_some());
    assert!(registry.service_for_pod("default", NGINX_POD).await?.is_some());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_caches_expire_independently() -> Result<()> {
    let snapshot = Arc::new(cluster());
    let registry = registry(&snapshot);

    registry.pod_by_ip("1.1.1.1").await?;
    tokio::time::advance(tokio::time::Duration::from_secs(120)).await;
    registry.service_for_pod("default", NGINX_POD).await?;
    assert_eq!(2, snapshot.pod_lists());

    tokio::time::advance(tokio::time::Duration::from_secs(90)).await;
    registry.pod_by_ip("1.1.1.1").await?;
    registry.service_for_pod("default", NGINX_POD).await?;
    assert_eq!(3, snapshot.pod_lists());

    Ok(())
}

#[test]
fn test_identity_string() {
    let id = Identity::new("my-app.v2", "default");
    assert_eq!("my-app.v2.default", id.to_string());
    assert_eq!(Ok(id.clone()), id.to_string().parse::<Identity>());

    assert!("no-separator".parse::<Identity>().is_err());
    assert!("trailing.".parse::<Identity>().is_err());
}

#[test]
fn test_selector_matches() {
    use std::collections::BTreeMap as Map;

    let map = |kvs: &[(&str, &str)]| -> Map<String, String> {
        kvs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    };
    let labels = map(&[("app", "web"), ("tier", "front")]);

    assert!(resolvers::selector_matches(&map(&[("app", "web")]), &labels));
    assert!(resolvers::selector_matches(&labels, &labels));
    assert!(resolvers::selector_matches(&map(&[]), &labels));
    assert!(!resolvers::selector_matches(&map(&[("app", "db")]), &labels));
    assert!(!resolvers::selector_matches(&map(&[("app", "web"), ("zone", "a")]), &labels));
}
