//! Test fixtures for routers and gateway updates

use std::collections::HashMap;
use std::sync::Arc;

use l3_db::{
    Context, GatewayInfo, L3DbBase, L3Result, MemoryStore, Port, Router, RouterStore, RouterView,
};
use l3_gwmode::{GatewayMode, L3NatDb};
use l3_types::{FixedIp, NetworkId, PortId, RouterId};

/// A gateway update request against one router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayChange {
    /// Target router
    pub router: RouterId,
    /// Payload; `None` removes the gateway
    pub info: Option<GatewayInfo>,
}

impl GatewayChange {
    /// Update with an (initially empty) payload
    pub fn set(router: impl Into<RouterId>) -> Self {
        Self {
            router: router.into(),
            info: Some(GatewayInfo::new()),
        }
    }

    /// Update without any payload
    pub fn clear(router: impl Into<RouterId>) -> Self {
        Self {
            router: router.into(),
            info: None,
        }
    }

    fn map_info(mut self, f: impl FnOnce(GatewayInfo) -> GatewayInfo) -> Self {
        self.info = Some(f(self.info.unwrap_or_default()));
        self
    }

    pub fn with_network(self, network: &str) -> Self {
        self.map_info(|info| info.with_network(network))
    }

    pub fn with_snat(self, enable: bool) -> Self {
        self.map_info(|info| info.with_enable_snat(enable))
    }

    pub fn with_ipv6_nat(self, enable: bool) -> Self {
        self.map_info(|info| info.with_enable_ipv6_nat(enable))
    }

    /// Add a fixed IP; panics on a malformed address
    pub fn with_fixed_ip(self, subnet: &str, ip: &str) -> Self {
        let ip = FixedIp::new(subnet, ip.parse().expect("fixture address"));
        self.map_info(|info| info.with_fixed_ip(ip))
    }
}

/// Common router fixtures
pub mod router_fixtures {
    use super::*;

    /// Router with column defaults (SNAT on, IPv6 NAT off)
    pub fn router(id: &str) -> Router {
        Router::new(id).with_name(format!("{}-name", id))
    }

    /// Router created with explicit NAT flags
    pub fn router_with_mode(id: &str, enable_snat: bool, enable_ipv6_nat: bool) -> Router {
        let mut router = router(id);
        router.enable_snat = enable_snat;
        router.enable_ipv6_nat = enable_ipv6_nat;
        router
    }

    /// Gateway port owned by `router_id`
    pub fn gateway_port(port_id: &str, router_id: &str, network: &str, ips: &[(&str, &str)]) -> Port {
        Port::gateway(
            PortId::new(port_id),
            NetworkId::new(network),
            &RouterId::new(router_id),
            ips.iter()
                .map(|(subnet, ip)| FixedIp::new(*subnet, ip.parse().expect("fixture address")))
                .collect(),
        )
    }
}

/// Common gateway update fixtures
pub mod gateway_fixtures {
    use super::*;

    /// External network name used by the fixtures
    pub const EXTERNAL_NETWORK: &str = "ext-net";

    /// Attach to the external network with one IPv4 address
    pub fn external_v4(router: &str) -> GatewayChange {
        GatewayChange::set(router)
            .with_network(EXTERNAL_NETWORK)
            .with_fixed_ip("ext-v4", "172.24.4.10")
    }

    /// Attach with an IPv4 and an IPv6 address, in that order
    pub fn dual_stack(router: &str) -> GatewayChange {
        external_v4(router).with_fixed_ip("ext-v6", "2001:db8::10")
    }

    /// Payload with no keys at all
    pub fn empty_payload(router: &str) -> GatewayChange {
        GatewayChange::set(router)
    }

    pub fn snat_disabled(router: &str) -> GatewayChange {
        GatewayChange::set(router).with_snat(false)
    }

    pub fn ipv6_nat_enabled(router: &str) -> GatewayChange {
        GatewayChange::set(router).with_ipv6_nat(true)
    }

    /// IPv6 NAT without SNAT; always rejected
    pub fn ipv6_nat_without_snat(router: &str) -> GatewayChange {
        GatewayChange::set(router)
            .with_snat(false)
            .with_ipv6_nat(true)
    }
}

/// In-memory store plus the gateway-mode plugin
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub plugin: Arc<L3NatDb<L3DbBase>>,
}

impl TestEnv {
    /// Empty environment
    pub fn new() -> L3Result<Self> {
        Ok(Self {
            store: Arc::new(MemoryStore::new()),
            plugin: Arc::new(L3NatDb::with_default_base()?),
        })
    }

    /// Environment with default routers already created
    pub fn with_routers(ids: &[&str]) -> L3Result<Self> {
        let env = Self::new()?;
        let ctx = env.context();
        for id in ids {
            env.plugin.create_router(&ctx, router_fixtures::router(id))?;
        }
        Ok(env)
    }

    /// Fresh request context (own session) on the shared store
    pub fn context(&self) -> Context {
        Context::new(self.store.clone())
    }

    /// Applies one gateway change in its own request
    pub async fn apply(&self, change: &GatewayChange) -> L3Result<RouterView> {
        self.plugin
            .update_router_gateway(&self.context(), &change.router, change.info.as_ref())
            .await
    }

    /// Stored flags of a router, straight from the store
    pub fn stored_mode(&self, id: &str) -> L3Result<Option<GatewayMode>> {
        Ok(self
            .store
            .get_router(&RouterId::new(id))?
            .map(|router| GatewayMode::of(&router)))
    }
}

/// Multi-step scenario with expected final flags
#[derive(Debug)]
pub struct TestScenario {
    /// Scenario name
    pub name: String,
    /// Changes applied in order
    pub changes: Vec<GatewayChange>,
    /// Expected stored flags per router after all changes
    pub expected_modes: HashMap<RouterId, GatewayMode>,
}

impl TestScenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: Vec::new(),
            expected_modes: HashMap::new(),
        }
    }

    pub fn add_change(mut self, change: GatewayChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn expect_mode(mut self, router: &str, enable_snat: bool, enable_ipv6_nat: bool) -> Self {
        self.expected_modes.insert(
            RouterId::new(router),
            GatewayMode::new(enable_snat, enable_ipv6_nat),
        );
        self
    }
}
