//! The HTTP surface spec.md §4.6/§4.7 names: the two webhook delivery
//! endpoints, the per-service deploy-token endpoint, and preview review.
//! Handlers stay thin -- they extract, delegate to a crate, and translate
//! the crate's error into a [`CoreError`] response, the same division of
//! labor as the teacher's `gateway::api::latest` handlers around
//! `GatewayService`.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use zaneops_common::error::{CoreError, CoreResult};
use zaneops_common::ids::{DeploymentId, EnvironmentId};
use zaneops_common::models::{ServiceSource, TriggerMethod};
use zaneops_persistence::repo;
use zaneops_planner::PrepareNewDeployment;
use zaneops_webhook::ReviewDecision;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/github", post(github_webhook))
        .route("/webhook/gitlab", post(gitlab_webhook))
        .route("/webhook/deploy/:deploy_token", put(deploy_by_token))
        .route("/environments/:environment_id/review_deploy", post(review_deploy))
        .with_state(state)
}

#[derive(Serialize)]
struct Accepted {
    success: bool,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default()
}

/// `POST /webhook/github`. Provider-assigned headers, not a typed `Header`
/// impl, carry the event name and signature, so a plain [`HeaderMap`] is
/// extracted and indexed directly.
#[instrument(skip(state, headers, body))]
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> CoreResult<Json<Accepted>> {
    let event_name = header_str(&headers, "x-github-event");
    let signature = header_str(&headers, "x-hub-signature-256");

    state
        .webhook
        .handle_github_delivery(event_name, signature, &body)
        .await
        .map_err(CoreError::from)?;

    Ok(Json(Accepted { success: true }))
}

/// `POST /webhook/gitlab`.
#[instrument(skip(state, headers, body))]
async fn gitlab_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> CoreResult<Json<Accepted>> {
    let event_name = header_str(&headers, "x-gitlab-event");
    let token = header_str(&headers, "x-gitlab-token");

    state
        .webhook
        .handle_gitlab_delivery(event_name, token, &body)
        .await
        .map_err(CoreError::from)?;

    Ok(Json(Accepted { success: true }))
}

#[derive(Deserialize, Default)]
struct DeployRequest {
    new_image: Option<String>,
    commit_sha: Option<String>,
    commit_message: Option<String>,
    #[serde(default)]
    ignore_build_cache: bool,
    #[serde(default)]
    cleanup_queue: bool,
}

#[derive(Serialize)]
struct DeployAccepted {
    deployment_id: DeploymentId,
}

/// `PUT /webhook/deploy/<deploy_token>` (spec.md §4.6): redeploys whichever
/// service owns `deploy_token`, optionally overriding its image/commit for
/// just this one deployment and optionally clearing its queue first. The
/// override never becomes a persisted [`zaneops_common::models::DeploymentChange`]
/// -- it's a one-shot input to this deployment, not a standing edit to the
/// service, so it's applied to an in-memory copy rather than routed through
/// the Change Log.
#[instrument(skip(state, request), fields(deploy_token = %deploy_token))]
async fn deploy_by_token(
    State(state): State<AppState>,
    Path(deploy_token): Path<String>,
    request: Option<Json<DeployRequest>>,
) -> CoreResult<(StatusCode, Json<DeployAccepted>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let mut service = repo::services::by_deploy_token(state.store.pool(), &deploy_token)
        .await
        .map_err(CoreError::from)?;

    if let Some(image) = &request.new_image {
        if let ServiceSource::Image { image: current, .. } = &mut service.source {
            *current = image.clone();
        }
    }
    if let Some(commit_sha) = &request.commit_sha {
        if let ServiceSource::Git { commit_sha: current, .. } = &mut service.source {
            *current = commit_sha.clone();
        }
    }

    if request.cleanup_queue {
        state
            .cancellation
            .cleanup_queue(service.id, false)
            .await
            .map_err(CoreError::from)?;
    }

    let pending = repo::deployment_changes::pending_for_service(state.store.pool(), service.id)
        .await
        .map_err(CoreError::from)?;

    let deployment = state
        .planner
        .prepare_new_deployment(
            &mut service,
            pending,
            PrepareNewDeployment {
                commit_message: request.commit_message,
                commit_author_name: None,
                trigger_method: TriggerMethod::Api,
                is_redeploy_of: None,
                ignore_build_cache: request.ignore_build_cache,
            },
            None,
        )
        .await
        .map_err(CoreError::from)?;

    Ok((StatusCode::ACCEPTED, Json(DeployAccepted { deployment_id: deployment.id })))
}

#[derive(Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum ReviewDecisionBody {
    Accept,
    Decline,
}

#[derive(Deserialize)]
struct ReviewDeployRequest {
    decision: ReviewDecisionBody,
}

#[derive(Serialize)]
struct ReviewDeployResponse {
    environments_created: Vec<EnvironmentId>,
    environments_archived: Vec<EnvironmentId>,
    deployments_queued: Vec<DeploymentId>,
}

/// `POST /environments/<preview>/review_deploy` (spec.md §4.6).
#[instrument(skip(state), fields(environment_id = %environment_id))]
async fn review_deploy(
    State(state): State<AppState>,
    Path(environment_id): Path<EnvironmentId>,
    Json(request): Json<ReviewDeployRequest>,
) -> CoreResult<Json<ReviewDeployResponse>> {
    let decision = match request.decision {
        ReviewDecisionBody::Accept => ReviewDecision::Accept,
        ReviewDecisionBody::Decline => ReviewDecision::Decline,
    };

    let outcome = state
        .webhook
        .review_deploy(environment_id, decision)
        .await
        .map_err(CoreError::from)?;

    Ok(Json(ReviewDeployResponse {
        environments_created: outcome.environments_created,
        environments_archived: outcome.environments_archived,
        deployments_queued: outcome.deployments_queued,
    }))
}
