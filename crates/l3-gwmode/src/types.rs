//! Gateway-mode types and constants.

use l3_db::{GatewayInfo, L3Error, L3Result, Router, RouterColumn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration name of the router dict extension.
pub const GW_MODE_EXTENSION: &str = "gw_mode";

/// Rejection message for IPv6 NAT without SNAT.
pub const ERR_SNAT_REQUIRED_FOR_IPV6_NAT: &str = "SNAT must be enabled if IPv6 NAT is enabled";

/// Resolved NAT flags for a router gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayMode {
    pub enable_snat: bool,
    pub enable_ipv6_nat: bool,
}

impl GatewayMode {
    pub fn new(enable_snat: bool, enable_ipv6_nat: bool) -> Self {
        Self {
            enable_snat,
            enable_ipv6_nat,
        }
    }

    /// Current flags of a router.
    pub fn of(router: &Router) -> Self {
        Self::new(router.enable_snat, router.enable_ipv6_nat)
    }

    /// Resolves the flags an update should write.
    ///
    /// With no payload at all both flags are turned off. With a payload, each
    /// key that is present wins and a missing key keeps the router's value.
    pub fn resolve(info: Option<&GatewayInfo>, router: &Router) -> Self {
        match info {
            None => Self::new(false, false),
            Some(info) => Self::new(
                info.enable_snat.unwrap_or(router.enable_snat),
                info.enable_ipv6_nat.unwrap_or(router.enable_ipv6_nat),
            ),
        }
    }

    /// Checks that IPv6 NAT is only enabled together with SNAT.
    pub fn validate(&self) -> L3Result<()> {
        if self.enable_ipv6_nat && !self.enable_snat {
            return Err(L3Error::bad_request(
                "router",
                ERR_SNAT_REQUIRED_FOR_IPV6_NAT,
            ));
        }
        Ok(())
    }

    /// Column writes persisting this mode.
    pub fn columns(&self) -> [RouterColumn; 2] {
        [
            RouterColumn::EnableSnat(self.enable_snat),
            RouterColumn::EnableIpv6Nat(self.enable_ipv6_nat),
        ]
    }

    /// Copies the flags onto an entity.
    pub fn apply_to(&self, router: &mut Router) {
        router.enable_snat = self.enable_snat;
        router.enable_ipv6_nat = self.enable_ipv6_nat;
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "enable_snat={} enable_ipv6_nat={}",
            self.enable_snat, self.enable_ipv6_nat
        )
    }
}
