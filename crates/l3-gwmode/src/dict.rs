//! Rendering of the gateway-mode flags into router dicts.

use std::collections::HashMap;

use l3_db::{GatewayInfoView, Port, Router, RouterDictExtension, RouterView};
use l3_types::PortId;
use tracing::warn;

use crate::types::GW_MODE_EXTENSION;

/// Populates `external_gateway_info` from the router and its gateway port.
///
/// Routers without a gateway get no `external_gateway_info` at all.
/// Fixed IPs keep the port's ordering.
pub fn extend_router_dict_gw_mode(view: &mut RouterView, router: &Router) {
    if router.gw_port_id.is_none() {
        return;
    }
    let Some(gw_port) = &router.gw_port else {
        warn!(
            "Router {} references gateway port {:?} that was not loaded",
            router.id, router.gw_port_id
        );
        return;
    };

    view.external_gateway_info = Some(GatewayInfoView {
        network_id: gw_port.network_id.clone(),
        enable_snat: router.enable_snat,
        enable_ipv6_nat: router.enable_ipv6_nat,
        external_fixed_ips: gw_port.fixed_ips.clone(),
    });
}

/// Registry entry for [`extend_router_dict_gw_mode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GwModeDictExtension;

impl RouterDictExtension for GwModeDictExtension {
    fn name(&self) -> &'static str {
        GW_MODE_EXTENSION
    }

    fn extend_router_dict(&self, view: &mut RouterView, router: &Router) {
        extend_router_dict_gw_mode(view, router);
    }
}

/// Annotates already-rendered routers for bulk sync.
///
/// Routers whose gateway port is in `gw_ports` get the port attached and the
/// two NAT flags copied to the top level. All others pass through unchanged.
pub fn build_routers_list(
    mut routers: Vec<RouterView>,
    gw_ports: &HashMap<PortId, Port>,
) -> Vec<RouterView> {
    for router in &mut routers {
        let Some(port) = router.gw_port_id.as_ref().and_then(|id| gw_ports.get(id)) else {
            continue;
        };
        router.gw_port = Some(port.clone());
        if let Some(info) = &router.external_gateway_info {
            router.enable_snat = Some(info.enable_snat);
            router.enable_ipv6_nat = Some(info.enable_ipv6_nat);
        }
    }
    routers
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3_db::EXTERNAL_GW_INFO;
    use l3_types::{FixedIp, NetworkId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn gw_router(id: &str, port_id: &str, fixed_ips: Vec<FixedIp>) -> Router {
        let mut router = Router::new(id);
        let port = Port::gateway(
            PortId::new(port_id),
            NetworkId::new("ext-net"),
            &router.id,
            fixed_ips,
        );
        router.gw_port_id = Some(port.id.clone());
        router.gw_port = Some(port);
        router
    }

    fn render(router: &Router) -> RouterView {
        let mut view = RouterView::from_router(router);
        extend_router_dict_gw_mode(&mut view, router);
        view
    }

    #[test]
    fn test_gateway_info_preserves_fixed_ip_order() {
        let router = gw_router(
            "r1",
            "p1",
            vec![
                FixedIp::new("v6", "2001:db8::5".parse().unwrap()),
                FixedIp::new("v4", "172.24.4.5".parse().unwrap()),
            ],
        );

        let json = serde_json::to_value(render(&router)).unwrap();
        assert_eq!(
            json[EXTERNAL_GW_INFO],
            json!({
                "network_id": "ext-net",
                "enable_snat": true,
                "enable_ipv6_nat": false,
                "external_fixed_ips": [
                    {"subnet_id": "v6", "ip_address": "2001:db8::5"},
                    {"subnet_id": "v4", "ip_address": "172.24.4.5"},
                ],
            })
        );
    }

    #[test]
    fn test_no_gateway_omits_key() {
        let json = serde_json::to_value(render(&Router::new("r1"))).unwrap();
        assert!(json.get(EXTERNAL_GW_INFO).is_none());
    }

    #[test]
    fn test_flags_come_from_entity() {
        let mut router = gw_router("r1", "p1", vec![]);
        router.enable_ipv6_nat = true;

        let info = render(&router).external_gateway_info.unwrap();
        assert!(info.enable_snat);
        assert!(info.enable_ipv6_nat);
        assert!(info.external_fixed_ips.is_empty());
    }

    #[test]
    fn test_build_routers_list_skips_missing_ports() {
        let with_port = gw_router("r1", "p1", vec![]);
        let mut snat_off = gw_router("r2", "p2", vec![]);
        snat_off.enable_snat = false;
        let dangling = gw_router("r3", "p3", vec![]);

        let gw_ports: HashMap<PortId, Port> = [&with_port, &snat_off]
            .iter()
            .filter_map(|r| r.gw_port.clone())
            .map(|p| (p.id.clone(), p))
            .collect();

        let views: Vec<RouterView> = [&with_port, &snat_off, &dangling]
            .iter()
            .map(|r| render(r))
            .collect();
        let untouched = views[2].clone();

        let out = build_routers_list(views, &gw_ports);
        assert_eq!(out.len(), 3);

        assert_eq!(out[0].enable_snat, Some(true));
        assert_eq!(out[0].enable_ipv6_nat, Some(false));
        assert_eq!(out[0].gw_port.as_ref().map(|p| p.id.as_str()), Some("p1"));

        assert_eq!(out[1].enable_snat, Some(false));
        assert_eq!(out[1].gw_port.as_ref().map(|p| p.id.as_str()), Some("p2"));

        assert_eq!(out[2], untouched);
        assert_eq!(out.iter().filter(|r| r.gw_port.is_some()).count(), 2);
    }

    #[test]
    fn test_build_routers_list_ignores_routers_without_gateway() {
        let views = vec![render(&Router::new("r1"))];
        let out = build_routers_list(views.clone(), &HashMap::new());
        assert_eq!(out, views);
    }

    #[test]
    fn test_extension_name() {
        assert_eq!(GwModeDictExtension.name(), "gw_mode");
    }
}
