use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Every flag is overridable by its `ZANEOPS_*` env var of the same name
/// (spec.md SPEC_FULL.md §2 "Configuration"), mirroring how the teacher's
/// `gateway::args::StartCommand` is driven in production by environment
/// rather than by flags on the command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "orchestratord", version)]
pub struct Args {
    /// Address the webhook/deploy-token/review-deploy HTTP surface binds to.
    #[clap(long, env = "ZANEOPS_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// `sqlx` connection string for the relational store.
    #[clap(long, env = "ZANEOPS_DATABASE_URL", default_value = "sqlite://./orchestratord.sqlite")]
    pub database_url: String,

    /// Base URL of the proxy's admin API (spec.md §4.5).
    #[clap(long, env = "ZANEOPS_PROXY_ADMIN_URL", default_value = "http://localhost:2019")]
    pub proxy_admin_url: String,

    /// Prefix applied to every Docker resource this instance manages,
    /// namespacing it alongside other ZaneOps instances on the same host.
    #[clap(long, env = "ZANEOPS_RESOURCE_PREFIX", default_value = "zaneops")]
    pub resource_prefix: String,

    /// Root directory under which per-deployment git checkouts are created.
    #[clap(long, env = "ZANEOPS_WORKSPACE_ROOT", default_value = "./zaneops-workspace")]
    pub workspace_root: PathBuf,

    /// Ceiling on one deployment's total workflow runtime (spec.md §4.4,
    /// §5 "the executor never waits unbounded on any external call").
    #[clap(long, env = "ZANEOPS_WORKFLOW_TIMEOUT_SECS", default_value = "1800")]
    pub workflow_timeout_secs: u64,

    /// Grace period between promoting the new slot and tearing down the
    /// previous one (spec.md §4.4 "Promote and teardown").
    #[clap(long, env = "ZANEOPS_TEARDOWN_GRACE_SECS", default_value = "5")]
    pub teardown_grace_secs: u64,
}

impl Args {
    pub fn workflow_timeout(&self) -> Duration {
        Duration::from_secs(self.workflow_timeout_secs)
    }

    pub fn teardown_grace_period(&self) -> Duration {
        Duration::from_secs(self.teardown_grace_secs)
    }
}
