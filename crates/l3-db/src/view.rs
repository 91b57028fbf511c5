//! External (dict) representation of routers and gateway-info payloads.

use std::net::IpAddr;

use l3_types::{FixedIp, NetworkId, PortId, RouterId, SubnetId};
use serde::{Deserialize, Serialize};

use crate::models::{Port, Router};

/// Key of the gateway-info object in the router representation.
pub const EXTERNAL_GW_INFO: &str = "external_gateway_info";

/// Requested fixed IP on the gateway port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIpRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<SubnetId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
}

impl From<FixedIp> for FixedIpRequest {
    fn from(ip: FixedIp) -> Self {
        Self {
            subnet_id: Some(ip.subnet_id),
            ip_address: Some(ip.ip_address),
        }
    }
}

/// Partial gateway-info payload supplied by a caller.
///
/// A missing key means "keep the stored value", which is distinct from the
/// key being present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<NetworkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_snat: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_ipv6_nat: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_fixed_ips: Option<Vec<FixedIpRequest>>,
}

impl GatewayInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network_id: impl Into<NetworkId>) -> Self {
        self.network_id = Some(network_id.into());
        self
    }

    pub fn with_enable_snat(mut self, enable: bool) -> Self {
        self.enable_snat = Some(enable);
        self
    }

    pub fn with_enable_ipv6_nat(mut self, enable: bool) -> Self {
        self.enable_ipv6_nat = Some(enable);
        self
    }

    /// Appends a requested fixed IP, creating the list if needed.
    pub fn with_fixed_ip(mut self, ip: impl Into<FixedIpRequest>) -> Self {
        self.external_fixed_ips
            .get_or_insert_with(Vec::new)
            .push(ip.into());
        self
    }
}

/// Rendered gateway info. Every key is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInfoView {
    pub network_id: NetworkId,
    pub enable_snat: bool,
    pub enable_ipv6_nat: bool,
    pub external_fixed_ips: Vec<FixedIp>,
}

/// Router as rendered to API consumers.
///
/// Optional keys are omitted from the JSON form when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterView {
    pub id: RouterId,
    pub name: String,
    pub tenant_id: String,
    pub admin_state_up: bool,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw_port_id: Option<PortId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_gateway_info: Option<GatewayInfoView>,
    /// Top-level copy of the SNAT flag, set by bulk list annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_snat: Option<bool>,
    /// Top-level copy of the IPv6 NAT flag, set by bulk list annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_ipv6_nat: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw_port: Option<Port>,
}

impl RouterView {
    /// Renders the base router fields only.
    pub fn from_router(router: &Router) -> Self {
        Self {
            id: router.id.clone(),
            name: router.name.clone(),
            tenant_id: router.tenant_id.clone(),
            admin_state_up: router.admin_state_up,
            status: router.status.clone(),
            gw_port_id: router.gw_port_id.clone(),
            external_gateway_info: None,
            enable_snat: None,
            enable_ipv6_nat: None,
            gw_port: None,
        }
    }
}
