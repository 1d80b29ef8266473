//! Change Log operations from spec.md §4.1: `add_change`, `cancel_change`,
//! `apply_pending_changes`.

use chrono::Utc;
use zaneops_common::ids::{DeploymentChangeId, DeploymentId};
use zaneops_common::models::{ChangeField, ChangeType, DeploymentChange, Service, Url};

use crate::projector::apply_change;
use crate::validation::validate_all;
use crate::ChangeLogError;

/// Input to [`add_change`]; mirrors `DeploymentChange`'s mutable fields.
pub struct NewChange {
    pub field: ChangeField,
    pub change_type: ChangeType,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub item_id: Option<String>,
}

/// Builds the service that would result from applying `service`'s current
/// state plus `pending` (in application order) -- used to check invariants
/// before committing a new or cancelled change, without touching the real
/// `Service` row.
pub fn project(service: &Service, pending: &[DeploymentChange]) -> Result<Service, ChangeLogError> {
    let mut projected = service.clone();
    let mut ordered: Vec<&DeploymentChange> = pending.iter().collect();
    ordered.sort_by_key(|c| c.application_rank());
    for change in ordered {
        apply_change(&mut projected, change)?;
    }
    Ok(projected)
}

/// Validates `new_change` against the schema and against the projected
/// snapshot that would result from merging it with the other pending
/// changes, then appends it with `applied = false`.
pub fn add_change(
    service: &Service,
    pending: &[DeploymentChange],
    new_change: NewChange,
    other_environment_urls: &[Url],
) -> Result<DeploymentChange, ChangeLogError> {
    let candidate = DeploymentChange {
        id: DeploymentChangeId::new(),
        service_id: service.id,
        field: new_change.field,
        change_type: new_change.change_type,
        old_value: new_change.old_value,
        new_value: new_change.new_value,
        item_id: new_change.item_id,
        applied: false,
        deployment_id: None,
        created_at: Utc::now(),
    };

    let mut merged = pending.to_vec();
    merged.push(candidate.clone());

    let projected = project(service, &merged)?;
    validate_all(&projected, other_environment_urls)?;

    Ok(candidate)
}

/// Deletes a pending change, but only if the resulting projected snapshot
/// (current pending minus this one) still satisfies every invariant;
/// otherwise `CONFLICT` (spec.md §4.1).
pub fn cancel_change(
    service: &Service,
    pending: &[DeploymentChange],
    change_id: DeploymentChangeId,
    other_environment_urls: &[Url],
) -> Result<Vec<DeploymentChange>, ChangeLogError> {
    if !pending.iter().any(|c| c.id == change_id) {
        return Err(ChangeLogError::NotFound(format!(
            "no pending change {change_id}"
        )));
    }

    let remaining: Vec<DeploymentChange> = pending
        .iter()
        .filter(|c| c.id != change_id)
        .cloned()
        .collect();

    let projected = project(service, &remaining)
        .map_err(|err| ChangeLogError::Conflict(err.to_string()))?;
    validate_all(&projected, other_environment_urls)
        .map_err(|err| ChangeLogError::Conflict(err.to_string()))?;

    Ok(remaining)
}

/// Applies every pending change to `service` in stable order -- collection
/// DELETEs, then UPDATEs, then ADDs, then SOURCE/GIT_SOURCE/BUILDER last
/// (spec.md §4.1) -- mutating `service` in place and returning the changes
/// with `applied = true` and `deployment_id` set, ready for the caller to
/// persist inside the same transaction that created `deployment`.
///
/// Idempotent: changes that already carry `applied = true` are skipped, so
/// re-invoking against a deployment that already applied its batch is a
/// no-op (spec.md §8, "apply_pending_changes is idempotent").
pub fn apply_pending_changes(
    service: &mut Service,
    pending: Vec<DeploymentChange>,
    deployment_id: DeploymentId,
) -> Result<Vec<DeploymentChange>, ChangeLogError> {
    let mut to_apply: Vec<DeploymentChange> = pending.into_iter().filter(|c| !c.applied).collect();
    to_apply.sort_by_key(|c| c.application_rank());

    for change in &to_apply {
        apply_change(service, change)?;
    }

    validate_all(service, &[])?;

    for change in &mut to_apply {
        change.applied = true;
        change.deployment_id = Some(deployment_id);
    }

    Ok(to_apply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zaneops_common::ids::{EnvironmentId, ProjectId, ServiceId};
    use zaneops_common::models::{ResourceLimits, ServiceSource};

    fn base_service() -> Service {
        Service {
            id: ServiceId::new(),
            project_id: ProjectId::new(),
            environment_id: EnvironmentId::new(),
            slug: "web".into(),
            unprefixed_id: "x".into(),
            source: ServiceSource::Image {
                image: "nginx".into(),
                credentials: None,
            },
            command: None,
            healthcheck: None,
            resource_limits: ResourceLimits::default(),
            volumes: vec![],
            configs: vec![],
            ports: vec![],
            urls: vec![],
            env_variables: vec![],
            deploy_token: "tok".into(),
            watch_paths: None,
            auto_deploy: true,
            current_production_deployment_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn apply_pending_changes_flips_applied_and_mutates_service() {
        let mut service = base_service();
        let change = add_change(
            &service,
            &[],
            NewChange {
                field: ChangeField::Command,
                change_type: ChangeType::Update,
                old_value: serde_json::Value::Null,
                new_value: serde_json::json!("npm start"),
                item_id: None,
            },
            &[],
        )
        .unwrap();

        let deployment_id = DeploymentId::new();
        let applied = apply_pending_changes(&mut service, vec![change], deployment_id).unwrap();

        assert_eq!(service.command.as_deref(), Some("npm start"));
        assert!(applied[0].applied);
        assert_eq!(applied[0].deployment_id, Some(deployment_id));
    }

    #[test]
    fn apply_pending_changes_is_idempotent_on_already_applied() {
        let mut service = base_service();
        let deployment_id = DeploymentId::new();
        let mut change = add_change(
            &service,
            &[],
            NewChange {
                field: ChangeField::Command,
                change_type: ChangeType::Update,
                old_value: serde_json::Value::Null,
                new_value: serde_json::json!("npm start"),
                item_id: None,
            },
            &[],
        )
        .unwrap();
        change.applied = true;
        change.deployment_id = Some(deployment_id);

        let applied = apply_pending_changes(&mut service, vec![change], deployment_id).unwrap();
        assert!(applied.is_empty());
        assert_eq!(service.command, None);
    }

    #[test]
    fn rejects_removing_the_only_source() {
        let service = base_service();
        let remove_image = DeploymentChange {
            id: DeploymentChangeId::new(),
            service_id: service.id,
            field: ChangeField::Source,
            change_type: ChangeType::Update,
            old_value: serde_json::Value::Null,
            new_value: serde_json::to_value(ServiceSource::Image {
                image: String::new(),
                credentials: None,
            })
            .unwrap(),
            item_id: None,
            applied: false,
            deployment_id: None,
            created_at: Utc::now(),
        };

        let result = add_change(
            &service,
            &[],
            NewChange {
                field: remove_image.field,
                change_type: remove_image.change_type,
                old_value: remove_image.old_value,
                new_value: remove_image.new_value,
                item_id: remove_image.item_id,
            },
            &[],
        );

        assert!(result.is_err());
    }

    #[test]
    fn cancel_change_rejects_when_it_would_break_invariants() {
        let mut service = base_service();
        // The service was created with no real source yet (an empty image
        // placeholder); the only thing making it deployable is a pending
        // change that sets a real git source.
        service.source = ServiceSource::Image {
            image: String::new(),
            credentials: None,
        };

        let set_source = DeploymentChange {
            id: DeploymentChangeId::new(),
            service_id: service.id,
            field: ChangeField::GitSource,
            change_type: ChangeType::Update,
            old_value: serde_json::Value::Null,
            new_value: serde_json::to_value(ServiceSource::Git {
                repository_url: "https://github.com/acme/widgets".into(),
                branch_name: "main".into(),
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
            created_at: Utc::now(),
        };

        // Cancelling the only change that establishes a source would leave
        // the projected service with neither an image nor a repository.
        let result = cancel_change(&service, &[set_source.clone()], set_source.id, &[]);
        assert!(result.is_err());
    }
}
