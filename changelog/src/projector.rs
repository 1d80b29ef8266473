//! Applies one [`DeploymentChange`] to a [`Service`] in place. Shared by
//! `apply_pending_changes` (real mutation) and the change-log's own
//! validation path (mutates a clone to check projected invariants before
//! accepting a new/cancelled change).

use serde_json::Value;
use zaneops_common::models::{
    ChangeField, ChangeType, Config, DeploymentChange, EnvVariable, Healthcheck, Port,
    ResourceLimits, Service, ServiceSource, Url, Volume,
};

use crate::ChangeLogError;

pub fn apply_change(service: &mut Service, change: &DeploymentChange) -> Result<(), ChangeLogError> {
    match change.field {
        ChangeField::Source | ChangeField::GitSource => {
            service.source = from_value(&change.new_value, change.field)?;
        }
        ChangeField::Builder => {
            // The new builder config is embedded inside the GIT_SOURCE's
            // `ServiceSource::Git::builder`; a standalone BUILDER change
            // updates only that nested field, leaving repository/branch/sha
            // untouched.
            let builder = from_value(&change.new_value, change.field)?;
            match &mut service.source {
                ServiceSource::Git { builder: slot, .. } => *slot = builder,
                ServiceSource::Image { .. } => {
                    return Err(ChangeLogError::Validation(
                        "cannot set a builder on an image-kind service".into(),
                    ))
                }
            }
        }
        ChangeField::Command => {
            service.command = optional_from_value(&change.new_value)?;
        }
        ChangeField::Healthcheck => {
            service.healthcheck = optional_from_value::<Healthcheck>(&change.new_value)?;
        }
        ChangeField::ResourceLimits => {
            service.resource_limits = from_value::<ResourceLimits>(&change.new_value, change.field)?;
        }
        ChangeField::Volumes => apply_collection(
            &mut service.volumes,
            change,
            |v: &Volume| v.id.to_string(),
        )?,
        ChangeField::Configs => apply_collection(
            &mut service.configs,
            change,
            |c: &Config| c.id.to_string(),
        )?,
        ChangeField::Urls => apply_collection(
            &mut service.urls,
            change,
            |u: &Url| u.id.to_string(),
        )?,
        ChangeField::EnvVariables => apply_collection(
            &mut service.env_variables,
            change,
            |e: &EnvVariable| e.key.clone(),
        )?,
        ChangeField::Ports => apply_ports(&mut service.ports, change)?,
    }
    Ok(())
}

fn from_value<T: serde::de::DeserializeOwned>(
    value: &Value,
    field: ChangeField,
) -> Result<T, ChangeLogError> {
    serde_json::from_value(value.clone())
        .map_err(|err| ChangeLogError::Validation(format!("invalid new_value for {field}: {err}")))
}

fn optional_from_value<T: serde::de::DeserializeOwned>(
    value: &Value,
) -> Result<Option<T>, ChangeLogError> {
    if value.is_null() {
        Ok(None)
    } else {
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|err| ChangeLogError::Validation(format!("invalid new_value: {err}")))
    }
}

/// Generic ADD/UPDATE/DELETE over a `Vec<T>` keyed by `item_id`.
fn apply_collection<T, K>(
    items: &mut Vec<T>,
    change: &DeploymentChange,
    key_of: K,
) -> Result<(), ChangeLogError>
where
    T: serde::de::DeserializeOwned,
    K: Fn(&T) -> String,
{
    match change.change_type {
        ChangeType::Add => {
            let item: T = from_value(&change.new_value, change.field)?;
            items.push(item);
        }
        ChangeType::Update => {
            let item_id = change
                .item_id
                .clone()
                .ok_or_else(|| ChangeLogError::Validation("UPDATE change missing item_id".into()))?;
            let item: T = from_value(&change.new_value, change.field)?;
            let slot = items
                .iter_mut()
                .find(|existing| key_of(existing) == item_id)
                .ok_or_else(|| ChangeLogError::NotFound(format!("no item {item_id} to update")))?;
            *slot = item;
        }
        ChangeType::Delete => {
            let item_id = change
                .item_id
                .clone()
                .ok_or_else(|| ChangeLogError::Validation("DELETE change missing item_id".into()))?;
            items.retain(|existing| key_of(existing) != item_id);
        }
    }
    Ok(())
}

fn apply_ports(ports: &mut Vec<Port>, change: &DeploymentChange) -> Result<(), ChangeLogError> {
    // Ports have no natural id; keyed by forwarded_port.
    match change.change_type {
        ChangeType::Add => {
            let port: Port = from_value(&change.new_value, change.field)?;
            ports.push(port);
        }
        ChangeType::Update => {
            let item_id = change
                .item_id
                .clone()
                .ok_or_else(|| ChangeLogError::Validation("UPDATE change missing item_id".into()))?;
            let new_port: Port = from_value(&change.new_value, change.field)?;
            let port: u16 = item_id
                .parse()
                .map_err(|_| ChangeLogError::Validation("invalid port item_id".into()))?;
            let slot = ports
                .iter_mut()
                .find(|p| p.forwarded_port == port)
                .ok_or_else(|| ChangeLogError::NotFound(format!("no port {port} to update")))?;
            *slot = new_port;
        }
        ChangeType::Delete => {
            let item_id = change
                .item_id
                .clone()
                .ok_or_else(|| ChangeLogError::Validation("DELETE change missing item_id".into()))?;
            let port: u16 = item_id
                .parse()
                .map_err(|_| ChangeLogError::Validation("invalid port item_id".into()))?;
            ports.retain(|p| p.forwarded_port != port);
        }
    }
    Ok(())
}
