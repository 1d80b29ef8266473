//! Everything an HTTP handler needs, bundled the way `ExecutorCtx` bundles
//! the executor's dependencies and `WebhookRouter` bundles its own --
//! grounded on the teacher's `GatewayService`, the single `Arc`-shared
//! handle every `gateway::api` handler is given via `Extension`.

use zaneops_cancellation::CancellationCoordinator;
use zaneops_persistence::Store;
use zaneops_planner::Planner;
use zaneops_webhook::WebhookRouter;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub planner: Planner,
    pub webhook: WebhookRouter,
    pub cancellation: CancellationCoordinator,
}
