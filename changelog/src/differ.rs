//! Snapshot Differ (spec.md §4.2): given two service snapshots, produce an
//! ordered list of [`DeploymentChange`]s such that
//! `apply_pending_changes(from, diff)` yields `to`. Used by redeploy to
//! revert a service to a previous `Deployment.service_snapshot`.

use chrono::Utc;
use zaneops_common::ids::{DeploymentChangeId, ServiceId};
use zaneops_common::models::{ChangeField, ChangeType, DeploymentChange, Service};

fn change(
    service_id: ServiceId,
    field: ChangeField,
    change_type: ChangeType,
    old_value: serde_json::Value,
    new_value: serde_json::Value,
    item_id: Option<String>,
) -> DeploymentChange {
    DeploymentChange {
        id: DeploymentChangeId::new(),
        service_id,
        field,
        change_type,
        old_value,
        new_value,
        item_id,
        applied: false,
        deployment_id: None,
        created_at: Utc::now(),
    }
}

/// Scalar fields emit a single `UPDATE` with `old = from`, `new = to`, only
/// when the two differ.
fn diff_scalar(
    service_id: ServiceId,
    field: ChangeField,
    from: serde_json::Value,
    to: serde_json::Value,
    out: &mut Vec<DeploymentChange>,
) {
    if from != to {
        out.push(change(service_id, field, ChangeType::Update, from, to, None));
    }
}

/// Collection fields diff item-by-item, keyed by `key_of`. Tie-break:
/// `DELETE` before `ADD`, matching `apply_pending_changes`'s application
/// order.
fn diff_collection<T, K>(
    service_id: ServiceId,
    field: ChangeField,
    from: &[T],
    to: &[T],
    key_of: K,
    out: &mut Vec<DeploymentChange>,
) where
    T: Clone + serde::Serialize + PartialEq,
    K: Fn(&T) -> String,
{
    for item in from {
        let key = key_of(item);
        if !to.iter().any(|t| key_of(t) == key) {
            out.push(change(
                service_id,
                field,
                ChangeType::Delete,
                serde_json::to_value(item).unwrap(),
                serde_json::Value::Null,
                Some(key),
            ));
        }
    }

    for item in to {
        let key = key_of(item);
        match from.iter().find(|f| key_of(f) == key) {
            None => out.push(change(
                service_id,
                field,
                ChangeType::Add,
                serde_json::Value::Null,
                serde_json::to_value(item).unwrap(),
                None,
            )),
            Some(prev) if prev != item => out.push(change(
                service_id,
                field,
                ChangeType::Update,
                serde_json::to_value(prev).unwrap(),
                serde_json::to_value(item).unwrap(),
                Some(key),
            )),
            Some(_) => {}
        }
    }
}

/// `snapshot_diff(a, a) == []`; applying the result to `from` via
/// `apply_pending_changes` reproduces `to`.
pub fn snapshot_diff(from: &Service, to: &Service) -> Vec<DeploymentChange> {
    let service_id = from.id;
    let mut out = Vec::new();

    diff_scalar(
        service_id,
        ChangeField::Source,
        serde_json::to_value(&from.source).unwrap(),
        serde_json::to_value(&to.source).unwrap(),
        &mut out,
    );

    diff_scalar(
        service_id,
        ChangeField::Command,
        serde_json::to_value(&from.command).unwrap(),
        serde_json::to_value(&to.command).unwrap(),
        &mut out,
    );
    diff_scalar(
        service_id,
        ChangeField::Healthcheck,
        serde_json::to_value(&from.healthcheck).unwrap(),
        serde_json::to_value(&to.healthcheck).unwrap(),
        &mut out,
    );
    diff_scalar(
        service_id,
        ChangeField::ResourceLimits,
        serde_json::to_value(from.resource_limits).unwrap(),
        serde_json::to_value(to.resource_limits).unwrap(),
        &mut out,
    );

    diff_collection(
        service_id,
        ChangeField::Volumes,
        &from.volumes,
        &to.volumes,
        |v| v.id.to_string(),
        &mut out,
    );
    diff_collection(
        service_id,
        ChangeField::Configs,
        &from.configs,
        &to.configs,
        |c| c.id.to_string(),
        &mut out,
    );
    diff_collection(
        service_id,
        ChangeField::Urls,
        &from.urls,
        &to.urls,
        |u| u.id.to_string(),
        &mut out,
    );
    diff_collection(
        service_id,
        ChangeField::EnvVariables,
        &from.env_variables,
        &to.env_variables,
        |e| e.key.clone(),
        &mut out,
    );
    diff_collection(
        service_id,
        ChangeField::Ports,
        &from.ports,
        &to.ports,
        |p| p.forwarded_port.to_string(),
        &mut out,
    );

    out.sort_by_key(|c| c.application_rank());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::apply_pending_changes;
    use chrono::Utc;
    use zaneops_common::ids::{DeploymentId, EnvironmentId, ProjectId, UrlId};
    use zaneops_common::models::{ResourceLimits, Service, ServiceSource, Url};

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
    fn diff_of_identical_snapshots_is_empty() {
        let service = base_service();
        assert!(snapshot_diff(&service, &service).is_empty());
    }

    #[test]
    fn diff_applied_to_from_reproduces_to() {
        let from = base_service();
        let mut to = from.clone();
        to.urls.push(Url {
            id: UrlId::new(),
            service_id: to.id,
            domain: "web.example.com".into(),
            base_path: "/".into(),
            strip_prefix: false,
            associated_port: 8080,
        });
        to.command = Some("npm start".into());

        let diff = snapshot_diff(&from, &to);
        assert!(!diff.is_empty());

        let mut replayed = from.clone();
        apply_pending_changes(&mut replayed, diff, DeploymentId::new()).unwrap();

        assert_eq!(replayed.command, to.command);
        assert_eq!(replayed.urls.len(), to.urls.len());
        assert_eq!(replayed.urls[0].domain, to.urls[0].domain);
    }
}
