//! Pure translation of a [`zaneops_common::models::Service`] +
//! [`zaneops_common::models::Deployment`] pair into a `bollard` swarm
//! service spec. Kept side-effect free so it is unit-testable without a
//! docker daemon, the way `deployer::project::docker::ContainerSettings`
//! separates "what to ask for" from "the `bollard::Docker` handle that
//! asks for it".

use bollard::models::{
    EndpointPortConfig, EndpointPortConfigProtocolEnum, EndpointSpec, HealthConfig, Mount,
    MountTypeEnum, NetworkAttachmentConfig, RestartPolicy, RestartPolicyCondition, ServiceSpec,
    ServiceSpecMode, ServiceSpecModeReplicated, ServiceSpecUpdateConfig,
    ServiceSpecUpdateConfigOrderEnum, TaskSpec, TaskSpecContainerSpec,
};

use zaneops_common::models::{Deployment, Service, Slot, Volume, VolumeMode};

/// Everything [`service_spec_for_deployment`] needs besides the service
/// and deployment themselves.
pub struct ServiceSpecInput<'a> {
    pub project_slug: &'a str,
    pub runtime_service_name: &'a str,
    pub image: &'a str,
    pub network_name: &'a str,
    pub replicas: u64,
}

/// Builds the `bollard::models::ServiceSpec` for a deployment's swarm
/// service. `update_config.order = start-first` realizes the zero-downtime
/// contract from spec.md §6 ("order:start-first"): the new task starts and
/// passes its own healthcheck before the old one is torn down.
pub fn service_spec_for_deployment(
    service: &Service,
    deployment: &Deployment,
    input: &ServiceSpecInput<'_>,
) -> ServiceSpec {
    let env: Vec<String> = service
        .env_variables
        .iter()
        .map(|kv| format!("{}={}", kv.key, kv.value))
        .collect();

    let mounts: Vec<Mount> = service
        .volumes
        .iter()
        .map(|volume| volume_mount(volume, input.project_slug))
        .chain(service.configs.iter().map(|config| Mount {
            target: Some(config.mount_path.clone()),
            source: Some(config.resource_name(input.project_slug)),
            typ: Some(MountTypeEnum::VOLUME),
            read_only: Some(true),
            ..Default::default()
        }))
        .collect();

    let ports: Vec<EndpointPortConfig> = service
        .ports
        .iter()
        .map(|port| EndpointPortConfig {
            target_port: Some(port.forwarded_port as i64),
            published_port: port.host_port.map(|p| p as i64),
            protocol: Some(EndpointPortConfigProtocolEnum::TCP),
            ..Default::default()
        })
        .collect();

    let healthcheck = service.healthcheck.as_ref().map(|hc| HealthConfig {
        test: hc.command.clone().map(|cmd| vec!["CMD-SHELL".into(), cmd]),
        interval: Some((hc.interval_seconds as i64) * 1_000_000_000),
        timeout: Some((hc.timeout_seconds as i64) * 1_000_000_000),
        retries: Some(3),
        start_period: Some(0),
    });

    let aliases = vec![
        service.network_alias(),
        deployment.slot.internal_alias().to_string(),
    ];

    ServiceSpec {
        name: Some(input.runtime_service_name.to_string()),
        task_template: Some(TaskSpec {
            container_spec: Some(TaskSpecContainerSpec {
                image: Some(input.image.to_string()),
                env: Some(env),
                mounts: Some(mounts),
                command: service
                    .command
                    .clone()
                    .map(|cmd| vec!["/bin/sh".to_string(), "-c".to_string(), cmd]),
                healthcheck: healthcheck.clone(),
                labels: Some(
                    [
                        ("zaneops.service_id".to_string(), service.id.to_string()),
                        (
                            "zaneops.deployment_hash".to_string(),
                            deployment.hash.clone(),
                        ),
                    ]
                    .into(),
                ),
                ..Default::default()
            }),
            networks: Some(vec![NetworkAttachmentConfig {
                target: Some(input.network_name.to_string()),
                aliases: Some(aliases),
                ..Default::default()
            }]),
            restart_policy: Some(RestartPolicy {
                condition: Some(RestartPolicyCondition::ANY),
                ..Default::default()
            }),
            ..Default::default()
        }),
        mode: Some(ServiceSpecMode {
            replicated: Some(ServiceSpecModeReplicated {
                replicas: Some(input.replicas as i64),
            }),
            ..Default::default()
        }),
        update_config: Some(ServiceSpecUpdateConfig {
            order: Some(ServiceSpecUpdateConfigOrderEnum::START_FIRST),
            parallelism: Some(1),
            ..Default::default()
        }),
        endpoint_spec: (!ports.is_empty()).then_some(EndpointSpec {
            ports: Some(ports),
            ..Default::default()
        }),
        labels: Some(
            [(
                "zaneops.service_id".to_string(),
                service.id.to_string(),
            )]
            .into(),
        ),
        ..Default::default()
    }
}

fn volume_mount(volume: &Volume, project_slug: &str) -> Mount {
    Mount {
        target: Some(volume.container_path.clone()),
        source: Some(match &volume.host_path {
            Some(host_path) => host_path.clone(),
            None => volume.resource_name(project_slug),
        }),
        typ: Some(if volume.host_path.is_some() {
            MountTypeEnum::BIND
        } else {
            MountTypeEnum::VOLUME
        }),
        read_only: Some(matches!(volume.mode, VolumeMode::ReadOnly)),
        ..Default::default()
    }
}

/// The slot a fresh deployment should scale the *previous* production
/// service down from, used by the executor's teardown step.
pub fn opposite_slot(slot: Slot) -> Slot {
    slot.opposite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zaneops_common::ids::{DeploymentId, EnvironmentId, ProjectId, ServiceId};
    use zaneops_common::models::{
        Deployment, DeploymentStatus, ResourceLimits, Service, ServiceSource, Slot,
        TriggerMethod,
    };

    fn service() -> Service {
        Service {
            id: ServiceId::new(),
            project_id: ProjectId::new(),
            environment_id: EnvironmentId::new(),
            slug: "cache".into(),
            unprefixed_id: "abc123".into(),
            source: ServiceSource::Image {
                image: "redis:alpine".into(),
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

    fn deployment(service_id: ServiceId) -> Deployment {
        Deployment {
            id: DeploymentId::new(),
            service_id,
            hash: "abcd1234".into(),
            workflow_id: "wf".into(),
            slot: Slot::Blue,
            status: DeploymentStatus::Queued,
            service_snapshot: serde_json::json!({}),
            commit_sha: None,
            commit_message: None,
            commit_author_name: None,
            trigger_method: TriggerMethod::Manual,
            is_redeploy_of: None,
            is_current_production: false,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            status_reason: None,
            ignore_build_cache: false,
            last_completed_step: None,
        }
    }

    #[test]
    fn spec_carries_both_network_aliases() {
        let svc = service();
        let dep = deployment(svc.id);
        let input = ServiceSpecInput {
            project_slug: "proj",
            runtime_service_name: "srv-dk-proj-cache-abcd1234",
            image: "redis:alpine",
            network_name: "net-proj-1",
            replicas: 1,
        };

        let spec = service_spec_for_deployment(&svc, &dep, &input);
        let networks = spec.task_template.unwrap().networks.unwrap();
        let aliases = networks[0].aliases.clone().unwrap();
        assert!(aliases.contains(&svc.network_alias()));
        assert!(aliases.contains(&"blue.zaneops.internal".to_string()));
    }

    #[test]
    fn update_config_uses_start_first_order() {
        let svc = service();
        let dep = deployment(svc.id);
        let input = ServiceSpecInput {
            project_slug: "proj",
            runtime_service_name: "srv-dk-proj-cache-abcd1234",
            image: "redis:alpine",
            network_name: "net-proj-1",
            replicas: 1,
        };

        let spec = service_spec_for_deployment(&svc, &dep, &input);
        assert_eq!(
            spec.update_config.unwrap().order,
            Some(ServiceSpecUpdateConfigOrderEnum::START_FIRST)
        );
    }
}
