//! Router gateway-mode extension.
//!
//! Adds SNAT control to a router's external gateway:
//!
//! - `enable_snat`: translate egress traffic to the gateway address (default on)
//! - `enable_ipv6_nat`: also translate IPv6 traffic (default off, requires SNAT)
//!
//! [`GatewayModeDb`] validates and commits the two flags on every gateway
//! update before delegating to the base routine it wraps.
//! [`extend_router_dict_gw_mode`] renders them under `external_gateway_info`,
//! and [`L3NatDb`] ties both into the paths the management CLI uses.

pub mod audit;
pub mod cli;
mod dict;
mod gw_mode;
mod plugin;
mod types;

pub use dict::{build_routers_list, extend_router_dict_gw_mode, GwModeDictExtension};
pub use gw_mode::GatewayModeDb;
pub use plugin::L3NatDb;
pub use types::*;
