//! Wire schema for the proxy admin API's route records, per spec.md §6.

use serde::{Deserialize, Serialize};

use zaneops_common::models::{Deployment, DeploymentUrl, Slot, Url};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteGroup {
    Service,
    Deployment,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Match {
    pub host: Vec<String>,
    pub path: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Upstream {
    pub dial: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReverseProxyHandle {
    pub handler: String,
    pub upstreams: Vec<Upstream>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubrouteHandle {
    pub handler: String,
    pub routes: Vec<Subroute>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subroute {
    pub handle: Vec<ReverseProxyHandle>,
}

/// One entry in the proxy's route table, keyed by `@id` so the control
/// plane can target a PUT/PATCH/DELETE precisely at the route it owns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteRecord {
    #[serde(rename = "@id")]
    pub id: String,
    pub group: RouteGroup,
    #[serde(rename = "match")]
    pub matches: Vec<Match>,
    pub handle: Vec<SubrouteHandle>,
}

impl RouteRecord {
    /// `deployment:<hash>:<port>`, installed during `DEPLOYMENT_EXPOSED_TO_HTTP`
    /// so the candidate deployment can be observed pre-promotion.
    pub fn for_deployment_url(deployment: &Deployment, url: &DeploymentUrl) -> Self {
        Self {
            id: url.route_id(&deployment.hash),
            group: RouteGroup::Deployment,
            matches: vec![Match {
                host: vec![url.domain.clone()],
                path: vec!["/*".to_string()],
            }],
            handle: vec![reverse_proxy_subroute(&format!(
                "{}:{}",
                deployment.slot.internal_alias(),
                url.port
            ))],
        }
    }

    /// `service:<service.id>:<url.id>`, installed/updated during
    /// `SERVICE_EXPOSED_TO_HTTP`. Upstream dials the slot alias so
    /// promotion is a pure upstream rewrite (spec.md §4.5).
    pub fn for_service_url(url: &Url, slot: Slot) -> Self {
        let mut path = url.base_path.clone();
        if !path.ends_with('*') {
            if !path.ends_with('/') {
                path.push('/');
            }
            path.push('*');
        }

        Self {
            id: url.route_id(),
            group: RouteGroup::Service,
            matches: vec![Match {
                host: vec![url.domain.clone()],
                path: vec![path],
            }],
            handle: vec![reverse_proxy_subroute(&format!(
                "{}:{}",
                slot.internal_alias(),
                url.associated_port
            ))],
        }
    }

    /// The dial target currently installed on this record's single
    /// upstream, used to detect whether a promotion actually changes
    /// anything (idempotent retries should not PATCH a route that already
    /// points at the target slot).
    pub fn current_dial(&self) -> Option<&str> {
        self.handle
            .first()
            .and_then(|h| h.routes.first())
            .and_then(|r| r.handle.first())
            .and_then(|rp| rp.upstreams.first())
            .map(|u| u.dial.as_str())
    }

    /// Flips `upstreams[0].dial` to `new_dial`, preserving match
    /// conditions and middleware -- the "upstream rewrite only" contract
    /// of spec.md §4.5.
    pub fn with_dial(mut self, new_dial: &str) -> Self {
        if let Some(subroute) = self.handle.first_mut() {
            if let Some(route) = subroute.routes.first_mut() {
                if let Some(rp) = route.handle.first_mut() {
                    if let Some(upstream) = rp.upstreams.first_mut() {
                        upstream.dial = new_dial.to_string();
                    }
                }
            }
        }
        self
    }
}

fn reverse_proxy_subroute(dial: &str) -> SubrouteHandle {
    SubrouteHandle {
        handler: "subroute".to_string(),
        routes: vec![Subroute {
            handle: vec![ReverseProxyHandle {
                handler: "reverse_proxy".to_string(),
                upstreams: vec![Upstream {
                    dial: dial.to_string(),
                }],
            }],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use zaneops_common::ids::{DeploymentId, DeploymentUrlId, ServiceId, UrlId};
    use zaneops_common::models::{Deployment, DeploymentStatus, TriggerMethod};

    fn deployment() -> Deployment {
        Deployment {
            id: DeploymentId::new(),
            service_id: ServiceId::new(),
            hash: "abcd1234".into(),
            workflow_id: "wf".into(),
            slot: Slot::Blue,
            status: DeploymentStatus::Starting,
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
    fn deployment_route_id_matches_spec_scheme() {
        let dep = deployment();
        let url = DeploymentUrl {
            id: DeploymentUrlId::new(),
            deployment_id: dep.id,
            port: 6379,
            domain: "preview.example.com".into(),
        };

        let record = RouteRecord::for_deployment_url(&dep, &url);
        assert_eq!(record.id, "deployment:abcd1234:6379");
        assert_eq!(record.current_dial(), Some("blue.zaneops.internal:6379"));
    }

    #[test]
    fn promotion_rewrites_only_the_dial() {
        let dep = deployment();
        let url = DeploymentUrl {
            id: DeploymentUrlId::new(),
            deployment_id: dep.id,
            port: 6379,
            domain: "preview.example.com".into(),
        };
        let record = RouteRecord::for_deployment_url(&dep, &url).with_dial("green.zaneops.internal:6379");

        assert_eq!(record.id, "deployment:abcd1234:6379");
        assert_eq!(record.current_dial(), Some("green.zaneops.internal:6379"));
        assert_eq!(record.matches[0].host, vec!["preview.example.com".to_string()]);
    }

    #[test]
    fn service_url_route_id_embeds_service_and_url_ids() {
        let url = Url {
            id: UrlId::new(),
            service_id: ServiceId::new(),
            domain: "cache.example.com".into(),
            base_path: "/".into(),
            strip_prefix: false,
            associated_port: 6379,
        };
        let record = RouteRecord::for_service_url(&url, Slot::Green);
        assert!(record.id.starts_with("service:"));
        assert!(record.id.ends_with(&url.id.to_string()));
        assert_eq!(record.current_dial(), Some("green.zaneops.internal:6379"));
    }
}
