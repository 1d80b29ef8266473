use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ids::GitAppId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Display, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GitAppKind {
    GitHub,
    GitLab,
}

/// Credentials used to authenticate against GitHub/GitLab. The actual
/// installation token / OAuth refresh token never leaves this struct in
/// cleartext for longer than it takes to mint a short-lived authenticated
/// clone URL (see `zaneops-backends::git_auth`); callers must never persist
/// the URL that `get_authenticated_repository_url` would produce.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitApp {
    pub id: GitAppId,
    pub kind: GitAppKind,
    pub webhook_secret: String,
    pub credential: GitAppCredential,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum GitAppCredential {
    GitHubInstallation {
        app_id: String,
        installation_id: String,
        private_key_pem: String,
    },
    GitLabOAuth {
        refresh_token: String,
        instance_url: String,
    },
}

/// A frozen, point-in-time view of a [`GitApp`] embedded into a
/// `GIT_SOURCE` change's `new_value` by the Change Log so later execution
/// is stable even if the live `GitApp` record mutates or is deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitAppSnapshot {
    pub id: GitAppId,
    pub kind: GitAppKind,
}

impl From<&GitApp> for GitAppSnapshot {
    fn from(app: &GitApp) -> Self {
        Self {
            id: app.id,
            kind: app.kind,
        }
    }
}
