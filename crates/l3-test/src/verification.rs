//! Verification helpers for stored routers and rendered views

use l3_db::{L3Error, RouterStore, RouterView, EXTERNAL_GW_INFO};
use l3_gwmode::GatewayMode;
use l3_types::RouterId;
use thiserror::Error;

use crate::fixtures::TestScenario;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Store error: {0}")]
    Store(#[from] L3Error),

    #[error("Expected router '{router}' not found")]
    RouterNotFound { router: String },

    #[error("Value mismatch for {router}:{field}: expected '{expected}', got '{actual}'")]
    ValueMismatch {
        router: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Router '{router}' has enable_ipv6_nat without enable_snat")]
    InvariantViolated { router: String },

    #[error("Expected key '{key}' on router '{router}'")]
    KeyNotFound { router: String, key: String },

    #[error("Unexpected key '{key}' on router '{router}'")]
    UnexpectedKey { router: String, key: String },

    #[error("Expected {expected} {what}, found {actual}")]
    CountMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Store state verifier
pub struct StoreVerifier<'a> {
    store: &'a dyn RouterStore,
}

impl<'a> StoreVerifier<'a> {
    pub fn new(store: &'a dyn RouterStore) -> Self {
        Self { store }
    }

    /// Verify the stored NAT flags of a router
    pub fn assert_mode(&self, router: &str, expected: GatewayMode) -> VerifyResult<()> {
        let stored = self
            .store
            .get_router(&RouterId::new(router))?
            .ok_or_else(|| VerificationError::RouterNotFound {
                router: router.to_string(),
            })?;

        let actual = GatewayMode::of(&stored);
        if actual != expected {
            return Err(VerificationError::ValueMismatch {
                router: router.to_string(),
                field: "gateway_mode".to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Verify that no stored router has IPv6 NAT without SNAT
    pub fn assert_invariant(&self) -> VerifyResult<()> {
        for router in self.store.list_routers()? {
            if router.enable_ipv6_nat && !router.enable_snat {
                return Err(VerificationError::InvariantViolated {
                    router: router.id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Verify that a router has (or lacks) a gateway port reference
    pub fn assert_gateway(&self, router: &str, expected: bool) -> VerifyResult<()> {
        let stored = self
            .store
            .get_router(&RouterId::new(router))?
            .ok_or_else(|| VerificationError::RouterNotFound {
                router: router.to_string(),
            })?;

        if stored.has_gateway() != expected {
            return Err(VerificationError::ValueMismatch {
                router: router.to_string(),
                field: "gw_port_id".to_string(),
                expected: if expected { "set" } else { "unset" }.to_string(),
                actual: format!("{:?}", stored.gw_port_id),
            });
        }
        Ok(())
    }

    /// Verify every expected mode of a scenario
    pub fn assert_scenario(&self, scenario: &TestScenario) -> VerifyResult<()> {
        for (router, mode) in &scenario.expected_modes {
            self.assert_mode(router.as_str(), *mode)?;
        }
        self.assert_invariant()
    }
}

/// Rendered router verifier
pub struct ViewVerifier<'a> {
    view: &'a RouterView,
    json: serde_json::Value,
}

impl<'a> ViewVerifier<'a> {
    pub fn new(view: &'a RouterView) -> VerifyResult<Self> {
        let json = serde_json::to_value(view).map_err(L3Error::from)?;
        Ok(Self { view, json })
    }

    fn router(&self) -> String {
        self.view.id.to_string()
    }

    /// Verify that `external_gateway_info` is present with the given flags
    pub fn assert_gateway_info(&self, expected: GatewayMode) -> VerifyResult<()> {
        let info = self
            .json
            .get(EXTERNAL_GW_INFO)
            .ok_or_else(|| VerificationError::KeyNotFound {
                router: self.router(),
                key: EXTERNAL_GW_INFO.to_string(),
            })?;

        let actual = GatewayMode::new(
            info["enable_snat"].as_bool().unwrap_or(false),
            info["enable_ipv6_nat"].as_bool().unwrap_or(false),
        );
        if actual != expected {
            return Err(VerificationError::ValueMismatch {
                router: self.router(),
                field: EXTERNAL_GW_INFO.to_string(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Verify that `external_gateway_info` is omitted entirely
    pub fn assert_no_gateway_info(&self) -> VerifyResult<()> {
        if self.json.get(EXTERNAL_GW_INFO).is_some() {
            return Err(VerificationError::UnexpectedKey {
                router: self.router(),
                key: EXTERNAL_GW_INFO.to_string(),
            });
        }
        Ok(())
    }

    /// Verify the fixed IPs as `(subnet_id, ip_address)` pairs, in order
    pub fn assert_fixed_ips(&self, expected: &[(&str, &str)]) -> VerifyResult<()> {
        let actual: Vec<(String, String)> = self
            .view
            .external_gateway_info
            .as_ref()
            .map(|info| {
                info.external_fixed_ips
                    .iter()
                    .map(|ip| (ip.subnet_id.to_string(), ip.ip_address.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let expected: Vec<(String, String)> = expected
            .iter()
            .map(|(s, ip)| (s.to_string(), ip.to_string()))
            .collect();

        if actual != expected {
            return Err(VerificationError::ValueMismatch {
                router: self.router(),
                field: "external_fixed_ips".to_string(),
                expected: format!("{:?}", expected),
                actual: format!("{:?}", actual),
            });
        }
        Ok(())
    }

    /// Verify the top-level keys added by bulk list annotation
    pub fn assert_sync_annotated(&self, expected: bool) -> VerifyResult<()> {
        for key in ["enable_snat", "enable_ipv6_nat", "gw_port"] {
            match (self.json.get(key).is_some(), expected) {
                (false, true) => {
                    return Err(VerificationError::KeyNotFound {
                        router: self.router(),
                        key: key.to_string(),
                    })
                }
                (true, false) => {
                    return Err(VerificationError::UnexpectedKey {
                        router: self.router(),
                        key: key.to_string(),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Verify the number of views carrying sync annotations
pub fn assert_annotated_count(views: &[RouterView], expected: usize) -> VerifyResult<()> {
    let actual = views.iter().filter(|v| v.gw_port.is_some()).count();
    if actual != expected {
        return Err(VerificationError::CountMismatch {
            what: "annotated routers".to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::router_fixtures;
    use l3_db::{MemoryStore, Write, WriteBatch};

    fn store_with(routers: Vec<l3_db::Router>) -> MemoryStore {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.extend(routers.into_iter().map(Write::InsertRouter));
        store.apply(batch).unwrap();
        store
    }

    #[test]
    fn test_store_verifier() {
        let store = store_with(vec![
            router_fixtures::router("r1"),
            router_fixtures::router_with_mode("r2", false, false),
        ]);
        let verifier = StoreVerifier::new(&store);

        assert!(verifier.assert_mode("r1", GatewayMode::new(true, false)).is_ok());
        assert!(verifier.assert_mode("r2", GatewayMode::new(false, false)).is_ok());
        assert!(verifier.assert_mode("r2", GatewayMode::new(true, false)).is_err());
        assert!(matches!(
            verifier.assert_mode("r3", GatewayMode::new(true, false)),
            Err(VerificationError::RouterNotFound { .. })
        ));
        assert!(verifier.assert_invariant().is_ok());
        assert!(verifier.assert_gateway("r1", false).is_ok());
        assert!(verifier.assert_gateway("r1", true).is_err());
    }

    #[test]
    fn test_view_verifier_without_gateway() {
        let view = RouterView::from_router(&router_fixtures::router("r1"));
        let verifier = ViewVerifier::new(&view).unwrap();

        assert!(verifier.assert_no_gateway_info().is_ok());
        assert!(verifier.assert_gateway_info(GatewayMode::new(true, false)).is_err());
        assert!(verifier.assert_fixed_ips(&[]).is_ok());
        assert!(verifier.assert_sync_annotated(false).is_ok());
        assert!(assert_annotated_count(&[view.clone()], 0).is_ok());
    }
}
