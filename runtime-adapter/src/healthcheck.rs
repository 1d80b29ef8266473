//! The healthcheck gate from spec.md §4.4: after the swarm service exists,
//! wait for all of its tasks to report `running`, then probe the
//! application-defined check on an interval until it succeeds or the
//! overall timeout elapses.

use std::time::Duration;

use bollard::models::TaskState;
use tokio::time::Instant;
use tracing::{instrument, warn};

use zaneops_common::models::{Healthcheck, HealthcheckKind};

use crate::adapter::RuntimeAdapter;
use crate::error::RuntimeAdapterResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthcheckOutcome {
    Healthy,
    Unhealthy,
}

/// A single HTTP GET against `host:port/path`; kept as a trait so the
/// executor can stub it out in tests without a real network call.
#[async_trait::async_trait]
pub trait HttpProbe: Send + Sync {
    async fn get_ok(&self, url: &str) -> bool;
}

pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get_ok(&self, url: &str) -> bool {
        matches!(self.client.get(url).send().await, Ok(resp) if resp.status().is_success())
    }
}

/// Waits for `runtime_service_name`'s tasks to all report `running`, or
/// `timeout` elapses. Used directly by the executor when a service carries
/// no [`Healthcheck`] at all -- the runtime-level readiness signal is the
/// only gate available.
#[instrument(skip(adapter))]
pub async fn wait_until_running(
    adapter: &RuntimeAdapter,
    runtime_service_name: &str,
    timeout: Duration,
) -> RuntimeAdapterResult<HealthcheckOutcome> {
    let deadline = Instant::now() + timeout;
    loop {
        let tasks = adapter.list_tasks(runtime_service_name).await?;
        let all_running = !tasks.is_empty()
            && tasks
                .iter()
                .all(|t| t.status.as_ref().and_then(|s| s.state) == Some(TaskState::RUNNING));

        if all_running {
            return Ok(HealthcheckOutcome::Healthy);
        }

        if Instant::now() >= deadline {
            return Ok(HealthcheckOutcome::Unhealthy);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Waits for `runtime_service_name`'s tasks to be `running`, then polls the
/// healthcheck until success or `healthcheck.timeout_seconds` elapses.
/// `probe_target` is the host:port the HTTP-path variant should dial --
/// normally the deployment's own [`zaneops_common::models::DeploymentUrl`]
/// alias, so the probe exercises the exact candidate being promoted.
#[instrument(skip(adapter, probe, healthcheck))]
pub async fn wait_until_healthy(
    adapter: &RuntimeAdapter,
    runtime_service_name: &str,
    healthcheck: &Healthcheck,
    probe: &dyn HttpProbe,
    probe_target: &str,
) -> RuntimeAdapterResult<HealthcheckOutcome> {
    let deadline = Instant::now() + Duration::from_secs(healthcheck.timeout_seconds as u64);

    let ready = wait_until_running(
        adapter,
        runtime_service_name,
        Duration::from_secs(healthcheck.timeout_seconds as u64),
    )
    .await?;
    if ready == HealthcheckOutcome::Unhealthy {
        return Ok(HealthcheckOutcome::Unhealthy);
    }

    loop {
        if Instant::now() >= deadline {
            return Ok(HealthcheckOutcome::Unhealthy);
        }

        let probe_passed = match healthcheck.kind {
            HealthcheckKind::Path => {
                let path = healthcheck.path.as_deref().unwrap_or("/");
                let url = format!("http://{probe_target}{path}");
                probe.get_ok(&url).await
            }
            HealthcheckKind::Command => {
                let tasks = adapter.list_tasks(runtime_service_name).await?;
                let container_id = tasks
                    .first()
                    .and_then(|t| t.status.as_ref())
                    .and_then(|s| s.container_status.as_ref())
                    .and_then(|c| c.container_id.clone());

                match (container_id, healthcheck.command.as_deref()) {
                    (Some(id), Some(cmd)) => match adapter.exec_healthcheck(&id, cmd).await {
                        Ok(ok) => ok,
                        Err(err) => {
                            warn!(%err, "healthcheck exec probe failed");
                            false
                        }
                    },
                    _ => false,
                }
            }
        };

        if probe_passed {
            return Ok(HealthcheckOutcome::Healthy);
        }

        tokio::time::sleep(Duration::from_secs(
            healthcheck.interval_seconds as u64,
        ))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProbe {
        ok_after: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl HttpProbe for CountingProbe {
        async fn get_ok(&self, _url: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.ok_after
        }
    }

    #[tokio::test]
    async fn probe_reports_success_once_threshold_reached() {
        let probe = CountingProbe {
            ok_after: 2,
            calls: AtomicU32::new(0),
        };
        assert!(!probe.get_ok("http://x").await);
        assert!(probe.get_ok("http://x").await);
    }
}
