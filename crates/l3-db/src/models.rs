//! Router and port entities as persisted by the store.

use l3_types::{FixedIp, NetworkId, PortId, RouterId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device owner recorded on router gateway ports.
pub const DEVICE_OWNER_ROUTER_GW: &str = "network:router_gateway";

/// Default for `Router::enable_snat` on new rows.
pub const DEFAULT_ENABLE_SNAT: bool = true;

/// Default for `Router::enable_ipv6_nat` on new rows.
pub const DEFAULT_ENABLE_IPV6_NAT: bool = false;

/// Default operational status of a new router.
pub const ROUTER_STATUS_ACTIVE: &str = "ACTIVE";

fn default_admin_state_up() -> bool {
    true
}

fn default_status() -> String {
    ROUTER_STATUS_ACTIVE.to_string()
}

/// A virtual router row.
///
/// `enable_snat` and `enable_ipv6_nat` are part of the entity itself and are
/// always present once a snapshot has been migrated to schema version 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: RouterId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub gw_port_id: Option<PortId>,
    pub enable_snat: bool,
    pub enable_ipv6_nat: bool,
    /// Gateway port, hydrated by the session when the router is loaded.
    #[serde(skip)]
    pub gw_port: Option<Port>,
}

impl Router {
    /// Creates a router with column defaults applied.
    pub fn new(id: impl Into<RouterId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            tenant_id: String::new(),
            admin_state_up: true,
            status: default_status(),
            gw_port_id: None,
            enable_snat: DEFAULT_ENABLE_SNAT,
            enable_ipv6_nat: DEFAULT_ENABLE_IPV6_NAT,
            gw_port: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    /// Returns true if an external gateway is configured.
    pub fn has_gateway(&self) -> bool {
        self.gw_port_id.is_some()
    }

    /// Applies a single column write.
    pub fn apply(&mut self, column: &RouterColumn) {
        match column {
            RouterColumn::EnableSnat(v) => self.enable_snat = *v,
            RouterColumn::EnableIpv6Nat(v) => self.enable_ipv6_nat = *v,
            RouterColumn::GwPortId(id) => {
                if self.gw_port_id != *id {
                    self.gw_port = None;
                }
                self.gw_port_id = id.clone();
            }
        }
    }
}

/// Updatable router columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterColumn {
    EnableSnat(bool),
    EnableIpv6Nat(bool),
    GwPortId(Option<PortId>),
}

impl RouterColumn {
    /// Column name in the routers table.
    pub fn name(&self) -> &'static str {
        match self {
            RouterColumn::EnableSnat(_) => "enable_snat",
            RouterColumn::EnableIpv6Nat(_) => "enable_ipv6_nat",
            RouterColumn::GwPortId(_) => "gw_port_id",
        }
    }
}

impl fmt::Display for RouterColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterColumn::EnableSnat(v) | RouterColumn::EnableIpv6Nat(v) => {
                write!(f, "{}={}", self.name(), v)
            }
            RouterColumn::GwPortId(Some(id)) => write!(f, "{}={}", self.name(), id),
            RouterColumn::GwPortId(None) => write!(f, "{}=NULL", self.name()),
        }
    }
}

/// A port row, modelled as far as gateway rendering needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub network_id: NetworkId,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_owner: String,
    /// Fixed IPs in assignment order.
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
}

impl Port {
    /// Creates a gateway port owned by `router_id`.
    pub fn gateway(
        id: PortId,
        network_id: NetworkId,
        router_id: &RouterId,
        fixed_ips: Vec<FixedIp>,
    ) -> Self {
        Self {
            id,
            network_id,
            device_id: router_id.to_string(),
            device_owner: DEVICE_OWNER_ROUTER_GW.to_string(),
            fixed_ips,
        }
    }

    /// Returns true if this port is a router gateway port.
    pub fn is_router_gateway(&self) -> bool {
        self.device_owner == DEVICE_OWNER_ROUTER_GW
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_defaults() {
        let router = Router::new("r1");
        assert!(router.enable_snat);
        assert!(!router.enable_ipv6_nat);
        assert!(router.admin_state_up);
        assert_eq!(router.status, "ACTIVE");
        assert!(!router.has_gateway());
    }

    #[test]
    fn test_apply_columns() {
        let mut router = Router::new("r1");
        router.apply(&RouterColumn::EnableSnat(false));
        router.apply(&RouterColumn::GwPortId(Some(PortId::new("p1"))));
        assert!(!router.enable_snat);
        assert_eq!(router.gw_port_id, Some(PortId::new("p1")));
    }

    #[test]
    fn test_changing_gw_port_id_drops_hydrated_port() {
        let mut router = Router::new("r1");
        router.gw_port_id = Some(PortId::new("p1"));
        router.gw_port = Some(Port::gateway(
            PortId::new("p1"),
            NetworkId::new("ext"),
            &router.id.clone(),
            vec![],
        ));

        router.apply(&RouterColumn::GwPortId(Some(PortId::new("p1"))));
        assert!(router.gw_port.is_some());

        router.apply(&RouterColumn::GwPortId(None));
        assert!(router.gw_port.is_none());
    }

    #[test]
    fn test_column_display() {
        assert_eq!(RouterColumn::EnableSnat(true).to_string(), "enable_snat=true");
        assert_eq!(RouterColumn::GwPortId(None).to_string(), "gw_port_id=NULL");
    }

    #[test]
    fn test_gw_port_not_serialized() {
        let mut router = Router::new("r1");
        router.gw_port = Some(Port::gateway(
            PortId::new("p1"),
            NetworkId::new("ext"),
            &RouterId::new("r1"),
            vec![],
        ));
        let json = serde_json::to_value(&router).unwrap();
        assert!(json.get("gw_port").is_none());
    }
}
