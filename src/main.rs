use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1 as core;
use kube::{
    api::Api,
    runtime::{WatchStreamExt, reflector, watcher},
    Client,
};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use kinfo::{Identity, Registry, cache, registry, snapshot};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short = 'n', long)]
    namespace: Option<String>,
    #[arg(long, default_value = "127.0.0.1:2288")]
    api: SocketAddr,
    /// max entries per cache (0: unbounded)
    #[arg(long, default_value_t = 0)]
    cache_size: usize,
    #[arg(long, default_value_t = cache::DEFAULT_EXPIRY_SECS)]
    cache_expiry_secs: u64,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("RUST_LOG", "info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let client: Client = kube::Config::infer().await?.try_into()?;

    let (pods, svcs) = match &cli.namespace {
        Some(ns) => {
            info!("starting for namespace {ns}");
            (
                Api::<core::Pod>::namespaced(client.clone(), ns),
                Api::<core::Service>::namespaced(client, ns),
            )
        }
        None => {
            info!("starting for all namespaces");
            (Api::<core::Pod>::all(client.clone()), Api::<core::Service>::all(client))
        }
    };

    let watcher_config = watcher::Config::default();
    let pods = reflect("pods", pods, watcher_config.clone());
    let services = reflect("services", svcs, watcher_config);

    pods.wait_until_ready().await?;
    services.wait_until_ready().await?;
    info!("all required objects received");

    let snapshot = snapshot::Kube { pods, services };

    debug!(
        "cache: size {} (0 is unbounded), expiry {}s",
        cli.cache_size, cli.cache_expiry_secs
    );
    let registry = registry::Builder {
        cache: cache::Builder {
            size: cli.cache_size,
            expiry_secs: cli.cache_expiry_secs,
        },
    }
    .build(Arc::new(snapshot));

    info!("serving lookups on {}", cli.api);
    api_server(cli.api, Arc::new(registry)).await;

    Ok(())
}

/// Spawns a reflector keeping the returned store in sync with the cluster.
fn reflect<K>(kind: &'static str, api: Api<K>, config: watcher::Config) -> reflector::Store<K>
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let (store, writer) = reflector::store();
    let mut stream = reflector(writer, watcher(api, config).default_backoff()).boxed();

    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if let Err(e) = event {
                error!("kubernetes {kind} watcher failed (retrying): {e}");
            }
        }
        warn!("kubernetes {kind} watcher ended");
    });

    store
}

#[derive(serde::Serialize)]
struct PodReply {
    pod: Option<Identity>,
}

#[derive(serde::Serialize)]
struct ServiceReply {
    service: Option<Identity>,
}

#[derive(serde::Serialize)]
struct ErrorReply {
    error: String,
}

async fn api_server(bind: SocketAddr, registry: Arc<Registry>) {
    use warp::Filter;

    let registry = warp::any().map(move || registry.clone());

    let pod_by_ip = warp::path!("pods" / "by-ip" / String)
        .and(registry.clone())
        .then(|ip: String, registry: Arc<Registry>| async move {
            let result = registry.pod_by_ip(&ip).await;
            reply(result.map(|pod| PodReply { pod }))
        });

    let service_by_ip = warp::path!("services" / "by-ip" / String)
        .and(registry.clone())
        .then(|ip: String, registry: Arc<Registry>| async move {
            let result = registry.service_by_ip(&ip).await;
            reply(result.map(|service| ServiceReply { service }))
        });

    let service_for_pod = warp::path!("services" / "by-pod" / String / String)
        .and(registry)
        .then(|namespace: String, pod: String, registry: Arc<Registry>| async move {
            let result = registry.service_for_pod(&namespace, &pod).await;
            reply(result.map(|service| ServiceReply { service }))
        });

    let server = warp::get().and(pod_by_ip.or(service_by_ip).unify().or(service_for_pod).unify());

    warp::serve(server).try_bind(bind).await;
}

fn reply<T: serde::Serialize>(
    result: eyre::Result<T>,
) -> warp::reply::WithStatus<warp::reply::Json> {
    use warp::http::StatusCode;

    match result {
        Ok(v) => warp::reply::with_status(warp::reply::json(&v), StatusCode::OK),
        Err(e) => {
            warn!("lookup failed: {e:#}");
            let error = ErrorReply {
                error: format!("{e:#}"),
            };
            warp::reply::with_status(warp::reply::json(&error), StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
