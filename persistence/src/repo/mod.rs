pub mod deployment_changes;
pub mod deployment_urls;
pub mod deployments;
pub mod environments;
pub mod git_apps;
pub mod preview_templates;
pub mod projects;
pub mod services;
