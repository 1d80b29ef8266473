//! Everything one [`crate::driver::Executor`] run needs besides the
//! `Deployment`/`Service`/`Project` rows themselves.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use zaneops_backends::GitCredentialBroker;
use zaneops_persistence::Store;
use zaneops_proxy::ProxyControlPlane;
use zaneops_runtime_adapter::healthcheck::HttpProbe;
use zaneops_runtime_adapter::RuntimeAdapter;

use crate::cancel::CancelRegistry;

/// Defaults mirror spec.md §4.4/§5: a 30s healthcheck wait and a 30m
/// overall workflow timeout ("the executor never waits unbounded on any
/// external call").
#[derive(Clone, Copy, Debug)]
pub struct ExecutorConfig {
    pub workflow_timeout: Duration,
    pub teardown_grace_period: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workflow_timeout: Duration::from_secs(30 * 60),
            teardown_grace_period: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct ExecutorCtx {
    pub store: Store,
    pub runtime: RuntimeAdapter,
    pub proxy: ProxyControlPlane,
    pub git_broker: Arc<GitCredentialBroker>,
    pub probe: Arc<dyn HttpProbe>,
    pub cancel_registry: CancelRegistry,
    pub config: ExecutorConfig,
    /// Root directory under which per-deployment git checkouts are
    /// created; each checkout lives at `workspace_root/<deployment.hash>`.
    pub workspace_root: PathBuf,
}
