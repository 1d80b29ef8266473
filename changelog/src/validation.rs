//! Project-level invariants a candidate [`Service`] must satisfy after a
//! change (or batch of changes) is projected onto it, per spec.md §3's
//! "Invariants" and §4.1's "rejects changes that would...".

use std::collections::HashSet;

use zaneops_common::models::{Service, ServiceSource, Url};

use crate::ChangeLogError;

/// `service.has_source()` must remain true: a service can never end up
/// with neither an image nor a repository+builder.
pub fn validate_has_source(service: &Service) -> Result<(), ChangeLogError> {
    if !service.has_source() {
        return Err(ChangeLogError::Validation(
            "service must retain an image or a repository source".into(),
        ));
    }
    if let ServiceSource::Git { builder, .. } = &service.source {
        let _ = builder; // presence alone is required; shape is validated by deserialization.
    }
    Ok(())
}

/// No two volumes on the same service may share `container_path` or
/// `host_path` (the latter only compared when both sides set one).
pub fn validate_volume_uniqueness(service: &Service) -> Result<(), ChangeLogError> {
    let mut container_paths = HashSet::new();
    let mut host_paths = HashSet::new();

    for volume in &service.volumes {
        if !container_paths.insert(volume.container_path.clone()) {
            return Err(ChangeLogError::Validation(format!(
                "duplicate volume container_path {}",
                volume.container_path
            )));
        }
        if let Some(host_path) = &volume.host_path {
            if !host_paths.insert(host_path.clone()) {
                return Err(ChangeLogError::Validation(format!(
                    "duplicate volume host_path {host_path}"
                )));
            }
        }
    }
    Ok(())
}

/// No two URLs on the same service may share `(domain, base_path)`, and
/// none may collide with another service's URL in the same environment
/// (spec.md §4.1, "URLS additions must not collide with existing URLs of
/// other services in the same environment").
pub fn validate_url_uniqueness(
    service: &Service,
    other_environment_urls: &[Url],
) -> Result<(), ChangeLogError> {
    let mut seen = HashSet::new();
    for url in &service.urls {
        if !seen.insert(url.uniqueness_key()) {
            return Err(ChangeLogError::Validation(format!(
                "duplicate url ({}, {}) on this service",
                url.domain, url.base_path
            )));
        }
    }

    for url in &service.urls {
        if other_environment_urls
            .iter()
            .any(|other| other.service_id != service.id && other.uniqueness_key() == url.uniqueness_key())
        {
            return Err(ChangeLogError::Validation(format!(
                "url ({}, {}) already used by another service in this environment",
                url.domain, url.base_path
            )));
        }
    }
    Ok(())
}

pub fn validate_all(service: &Service, other_environment_urls: &[Url]) -> Result<(), ChangeLogError> {
    validate_has_source(service)?;
    validate_volume_uniqueness(service)?;
    validate_url_uniqueness(service, other_environment_urls)?;
    Ok(())
}
