//! Newtype identifiers. Entities use a ULID (lexicographically sortable,
//! embeds a creation timestamp) the same way the teacher's gateway and
//! deployer crates key projects/deployments by [`ulid::Ulid`].

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

macro_rules! ulid_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Ulid> for $name {
            fn from(value: Ulid) -> Self {
                Self(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Ulid::from_string(s)?))
            }
        }
    };
}

ulid_id!(ProjectId);
ulid_id!(EnvironmentId);
ulid_id!(ServiceId);
ulid_id!(DeploymentId);
ulid_id!(DeploymentChangeId);
ulid_id!(DeploymentUrlId);
ulid_id!(VolumeId);
ulid_id!(ConfigId);
ulid_id!(UrlId);
ulid_id!(GitAppId);
ulid_id!(PreviewTemplateId);
