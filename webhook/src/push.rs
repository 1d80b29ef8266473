//! Push-event handling (spec.md §4.6 "Push"): find every auto-deploying
//! service that tracks the pushed branch, apply `watch_paths` filtering,
//! and enqueue a deployment via the Planner for each match.

use zaneops_common::ids::{DeploymentId, GitAppId};
use zaneops_common::models::{ChangeField, DeploymentChange, ServiceSource};
use zaneops_persistence::{repo, Store};
use zaneops_planner::{Planner, PrepareNewDeployment};

use crate::error::WebhookError;
use crate::events::PushEvent;

/// A push whose ref is the head of an open PR/MR owned by a preview
/// environment is ignored: the PR sync webhook is authoritative for that
/// branch while the preview exists (spec.md §4.6).
async fn is_owned_by_an_open_preview(
    store: &Store,
    git_app_id: GitAppId,
    event: &PushEvent,
) -> Result<bool, WebhookError> {
    let previews = repo::environments::all_previews(store.pool()).await?;
    Ok(previews.iter().any(|env| {
        env.preview_metadata.as_ref().is_some_and(|metadata| {
            metadata.git_app_id == Some(git_app_id)
                && metadata.head_repository_url == event.repository_url
                && metadata.branch_name == event.branch_name
        })
    }))
}

/// A pending `SOURCE`/`GIT_SOURCE` change would move the service off the
/// repository+branch this push matched on, so applying it as part of this
/// auto-deploy would silently redeploy something other than what the push
/// targeted. The original resolves this by skipping the deploy and leaving
/// the change unapplied for an explicit future deploy to pick up
/// (`examples/original_source/backend/git_connectors/tests/gitlab_auto_deploy.py`,
/// `test_deploy_service_from_gitlab_changing_ignore_if_pending_changes_conflicts`).
fn has_conflicting_pending_git_source(pending: &[DeploymentChange], event: &PushEvent) -> bool {
    pending.iter().any(|change| {
        if !matches!(change.field, ChangeField::Source | ChangeField::GitSource) {
            return false;
        }
        match serde_json::from_value::<ServiceSource>(change.new_value.clone()) {
            Ok(ServiceSource::Git { repository_url, branch_name, .. }) => {
                repository_url != event.repository_url || branch_name != event.branch_name
            }
            Ok(ServiceSource::Image { .. }) => true,
            Err(_) => false,
        }
    })
}

fn matches_watch_paths(service_watch_paths: &Option<Vec<String>>, changed_paths: &[String]) -> bool {
    let Some(patterns) = service_watch_paths else {
        return true;
    };
    if changed_paths.is_empty() {
        return true;
    }
    patterns.iter().any(|pattern| {
        glob::Pattern::new(pattern)
            .ok()
            .is_some_and(|compiled| changed_paths.iter().any(|path| compiled.matches(path)))
    })
}

pub async fn handle_push(
    store: &Store,
    planner: &Planner,
    git_app_id: GitAppId,
    event: &PushEvent,
) -> Result<Vec<DeploymentId>, WebhookError> {
    if is_owned_by_an_open_preview(store, git_app_id, event).await? {
        return Ok(vec![]);
    }

    let mut queued = Vec::new();
    for mut service in repo::services::all(store.pool()).await? {
        let matches = matches!(
            &service.source,
            ServiceSource::Git { repository_url, branch_name, git_app_id: svc_app_id, .. }
                if *svc_app_id == Some(git_app_id)
                    && repository_url == &event.repository_url
                    && branch_name == &event.branch_name
        );
        if !matches || !service.auto_deploy {
            continue;
        }
        if !matches_watch_paths(&service.watch_paths, &event.changed_paths) {
            continue;
        }

        let pending = repo::deployment_changes::pending_for_service(store.pool(), service.id).await?;
        if has_conflicting_pending_git_source(&pending, event) {
            continue;
        }

        let (commit_message, commit_author_name) = match &event.head_commit {
            Some(commit) => {
                if let ServiceSource::Git { commit_sha, .. } = &mut service.source {
                    *commit_sha = commit.sha.clone();
                }
                (Some(commit.message.clone()), Some(commit.author_name.clone()))
            }
            None => {
                if let ServiceSource::Git { commit_sha, .. } = &mut service.source {
                    *commit_sha = "HEAD".to_string();
                }
                (None, None)
            }
        };

        let deployment = planner
            .prepare_new_deployment(
                &mut service,
                pending,
                PrepareNewDeployment {
                    commit_message,
                    commit_author_name,
                    trigger_method: zaneops_common::models::TriggerMethod::Auto,
                    is_redeploy_of: None,
                    ignore_build_cache: false,
                },
                None,
            )
            .await?;
        queued.push(deployment.id);
    }

    Ok(queued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zaneops_common::ids::{DeploymentChangeId, ServiceId};
    use zaneops_common::models::ChangeType;

    #[test]
    fn a_pattern_with_no_matching_changed_path_is_filtered_out() {
        let patterns = Some(vec!["src/**/*.rs".to_string()]);
        assert!(!matches_watch_paths(&patterns, &["README.md".to_string()]));
        assert!(matches_watch_paths(&patterns, &["src/main.rs".to_string()]));
    }

    #[test]
    fn no_watch_paths_configured_always_matches() {
        assert!(matches_watch_paths(&None, &["anything.txt".to_string()]));
    }

    #[test]
    fn an_empty_changed_paths_list_is_never_filtered() {
        let patterns = Some(vec!["src/**/*.rs".to_string()]);
        assert!(matches_watch_paths(&patterns, &[]));
    }

    fn push_event() -> PushEvent {
        PushEvent {
            repository_url: "https://github.com/acme/widgets.git".into(),
            branch_name: "main".into(),
            head_commit: None,
            changed_paths: vec![],
        }
    }

    fn git_source_change(repository_url: &str, branch_name: &str) -> DeploymentChange {
        DeploymentChange {
            id: DeploymentChangeId::new(),
            service_id: ServiceId::new(),
            field: ChangeField::GitSource,
            change_type: ChangeType::Update,
            old_value: serde_json::Value::Null,
            new_value: serde_json::to_value(ServiceSource::Git {
                repository_url: repository_url.into(),
                branch_name: branch_name.into(),
                commit_sha: "HEAD".into(),
                git_app_id: None,
                builder: zaneops_common::models::BuilderConfig::Dockerfile {
                    dockerfile_path: "Dockerfile".into(),
                    build_context_dir: ".".into(),
                    build_stage_target: None,
                },
            })
            .unwrap(),
            item_id: None,
            applied: false,
            deployment_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn a_pending_git_source_change_to_a_different_branch_conflicts_with_the_push() {
        let event = push_event();
        let pending = vec![git_source_change("https://github.com/acme/widgets.git", "develop")];
        assert!(has_conflicting_pending_git_source(&pending, &event));
    }

    #[test]
    fn a_pending_git_source_change_to_the_same_branch_does_not_conflict() {
        let event = push_event();
        let pending = vec![git_source_change("https://github.com/acme/widgets.git", "main")];
        assert!(!has_conflicting_pending_git_source(&pending, &event));
    }

    #[test]
    fn an_unrelated_pending_change_does_not_conflict() {
        let event = push_event();
        let mut change = git_source_change("https://github.com/acme/widgets.git", "main");
        change.field = ChangeField::Command;
        change.new_value = serde_json::json!("npm start");
        assert!(!has_conflicting_pending_git_source(&[change], &event));
    }
}
