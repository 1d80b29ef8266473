pub mod client;
pub mod control_plane;
pub mod route;

pub use client::{ProxyClient, ProxyClientError, ProxyClientResult};
pub use control_plane::ProxyControlPlane;
pub use route::{Match, RouteGroup, RouteRecord};
