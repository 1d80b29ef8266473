//! Process entry point: wires the Change Log, Planner, Executor,
//! Cancellation Coordinator and Webhook Router into one Axum server,
//! mirroring how the teacher's `gateway::main` assembles `GatewayService`,
//! a `Worker`, and an API/proxy pair behind `#[tokio::main]`.

mod args;
mod http;
mod state;

use std::io;
use std::sync::Arc;

use bollard::Docker;
use clap::Parser;
use tracing::{error, info, trace};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use zaneops_backends::GitCredentialBroker;
use zaneops_cancellation::CancellationCoordinator;
use zaneops_executor::{CancelRegistry, Executor, ExecutorConfig, ExecutorCtx};
use zaneops_persistence::Store;
use zaneops_planner::{HttpGitRefResolver, Planner};
use zaneops_proxy::{ProxyClient, ProxyControlPlane};
use zaneops_runtime_adapter::healthcheck::ReqwestProbe;
use zaneops_runtime_adapter::RuntimeAdapter;
use zaneops_webhook::WebhookRouter;

use crate::args::Args;
use crate::state::AppState;

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    let fmt_layer = fmt::layer();
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).unwrap();
    tracing_subscriber::registry().with(filter_layer).with(fmt_layer).init();

    trace!(args = ?args, "parsed args");

    let store = Store::connect(&args.database_url)
        .await
        .unwrap_or_else(|err| panic!("failed to connect to {}: {err}", args.database_url));

    let docker = Docker::connect_with_local_defaults().expect("failed to connect to the local container runtime");
    let runtime = RuntimeAdapter::new(docker);
    let proxy = ProxyControlPlane::new(ProxyClient::new(reqwest::Client::new(), args.proxy_admin_url.clone()));
    let git_broker = Arc::new(GitCredentialBroker::new(reqwest::Client::new()));
    let probe = Arc::new(ReqwestProbe::new(reqwest::Client::new()));
    let cancel_registry = CancelRegistry::new();

    let (dispatch_tx, mut dispatch_rx) = tokio::sync::mpsc::unbounded_channel();
    let git_resolver = Arc::new(HttpGitRefResolver::new(reqwest::Client::new()));
    let planner = Planner::new(store.clone(), git_resolver, dispatch_tx);

    let executor_ctx = ExecutorCtx {
        store: store.clone(),
        runtime: runtime.clone(),
        proxy: proxy.clone(),
        git_broker,
        probe,
        cancel_registry: cancel_registry.clone(),
        config: ExecutorConfig {
            workflow_timeout: args.workflow_timeout(),
            teardown_grace_period: args.teardown_grace_period(),
        },
        workspace_root: args.workspace_root.clone(),
    };
    let executor = Arc::new(Executor::new(executor_ctx));

    let worker_handle = tokio::spawn(async move {
        while let Some(deployment_id) = dispatch_rx.recv().await {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                if let Err(err) = executor.run(deployment_id).await {
                    error!(%deployment_id, %err, "deployment workflow failed unexpectedly");
                }
            });
        }
    });

    let cancellation = CancellationCoordinator::new(store.clone(), cancel_registry);
    let webhook = WebhookRouter::new(store.clone(), planner.clone(), runtime, proxy);

    let state = AppState { store, planner, webhook, cancellation };
    let router = http::router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    info!(bind = %args.bind, "orchestratord listening");
    let server_handle = tokio::spawn(axum::Server::bind(&args.bind).serve(router.into_make_service()));

    let (worker_result, server_result) = tokio::join!(worker_handle, server_handle);
    worker_result.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    server_result
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;

    Ok(())
}
