//! Base gateway-update routine.
//!
//! [`GatewayBase`] is the seam extensions wrap: an extension performs its own
//! work and then delegates to the routine below it. [`L3DbBase`] is the
//! bottom of that chain and manages the gateway port itself.

use async_trait::async_trait;
use l3_types::{FixedIp, PortId, RouterId};
use tracing::{debug, info, instrument};

use crate::error::{L3Error, L3Result};
use crate::models::{Port, Router, RouterColumn};
use crate::session::Context;
use crate::store::Write;
use crate::view::{FixedIpRequest, GatewayInfo};

/// Updates a router's external gateway.
#[async_trait]
pub trait GatewayBase: Send + Sync {
    /// Applies `info` to the router's gateway.
    ///
    /// `router` is the already-loaded entity, if the caller has one; it is
    /// loaded through the context's session otherwise. `None` for `info`
    /// removes the gateway. Returns the updated router.
    async fn update_router_gw_info(
        &self,
        ctx: &Context,
        router_id: &RouterId,
        info: Option<&GatewayInfo>,
        router: Option<Router>,
    ) -> L3Result<Router>;
}

/// Reference gateway routine: creates, replaces and removes gateway ports.
///
/// Addresses are never allocated; every requested fixed IP must name both
/// its subnet and its address.
#[derive(Debug, Clone, Copy, Default)]
pub struct L3DbBase;

impl L3DbBase {
    pub fn new() -> Self {
        Self
    }
}

fn resolve_fixed_ips(requests: &[FixedIpRequest]) -> L3Result<Vec<FixedIp>> {
    requests
        .iter()
        .map(|req| match (&req.subnet_id, req.ip_address) {
            (Some(subnet_id), Some(ip)) => Ok(FixedIp::new(subnet_id.clone(), ip)),
            (_, None) => Err(L3Error::bad_request(
                "router",
                "external_fixed_ips entries must specify ip_address",
            )),
            (None, Some(ip)) => Err(L3Error::bad_request(
                "router",
                format!("external fixed IP {} must specify subnet_id", ip),
            )),
        })
        .collect()
}

#[async_trait]
impl GatewayBase for L3DbBase {
    #[instrument(skip(self, ctx, info, router), fields(request_id = %ctx.request_id()))]
    async fn update_router_gw_info(
        &self,
        ctx: &Context,
        router_id: &RouterId,
        info: Option<&GatewayInfo>,
        router: Option<Router>,
    ) -> L3Result<Router> {
        let session = ctx.session();
        let mut router = match router {
            Some(router) => router,
            None => session.get_router(router_id)?,
        };

        let network_id = info.and_then(|i| i.network_id.as_ref());
        let fixed_ips = match info.and_then(|i| i.external_fixed_ips.as_deref()) {
            Some(requests) if network_id.is_some() => Some(resolve_fixed_ips(requests)?),
            _ => None,
        };

        let current_port = match (&router.gw_port, &router.gw_port_id) {
            (Some(port), _) => Some(port.clone()),
            (None, Some(port_id)) => session.get_port(port_id)?,
            (None, None) => None,
        };

        let txn = session.begin();
        let gw_port = match network_id {
            None => {
                if let Some(old) = &current_port {
                    txn.update_router(router_id, RouterColumn::GwPortId(None))?;
                    txn.stage(Write::DeletePort(old.id.clone()))?;
                    info!("Removing gateway port {} from router {}", old.id, router_id);
                }
                None
            }
            Some(network_id) => match current_port {
                Some(mut port) if &port.network_id == network_id => {
                    if let Some(ips) = fixed_ips {
                        txn.stage(Write::UpdatePortFixedIps {
                            id: port.id.clone(),
                            fixed_ips: ips.clone(),
                        })?;
                        debug!("Replacing fixed IPs on gateway port {}", port.id);
                        port.fixed_ips = ips;
                    }
                    Some(port)
                }
                old => {
                    if let Some(old) = old {
                        txn.stage(Write::DeletePort(old.id.clone()))?;
                    }
                    let port = Port::gateway(
                        PortId::generate(),
                        network_id.clone(),
                        router_id,
                        fixed_ips.unwrap_or_default(),
                    );
                    txn.stage(Write::InsertPort(port.clone()))?;
                    txn.update_router(router_id, RouterColumn::GwPortId(Some(port.id.clone())))?;
                    info!(
                        "Attaching router {} to external network {} via port {}",
                        router_id, network_id, port.id
                    );
                    Some(port)
                }
            },
        };
        txn.commit()?;

        router.apply(&RouterColumn::GwPortId(gw_port.as_ref().map(|p| p.id.clone())));
        router.gw_port = gw_port;
        Ok(router)
    }
}

/// Inserts a new router row and returns it as stored.
///
/// # Errors
///
/// Returns [`L3Error::BadRequest`] if the router already carries a gateway
/// (gateways are set through [`GatewayBase`]) or its NAT flags violate the
/// SNAT requirement.
#[instrument(skip(ctx, router), fields(router_id = %router.id))]
pub fn create_router(ctx: &Context, router: Router) -> L3Result<Router> {
    if router.gw_port_id.is_some() {
        return Err(L3Error::bad_request(
            "router",
            "external gateway must be set through a gateway update",
        ));
    }
    if router.enable_ipv6_nat && !router.enable_snat {
        return Err(L3Error::bad_request(
            "router",
            "SNAT must be enabled if IPv6 NAT is enabled",
        ));
    }

    let session = ctx.session();
    let id = router.id.clone();
    let txn = session.begin();
    txn.stage(Write::InsertRouter(router))?;
    txn.commit()?;

    info!("Created router {}", id);
    session.get_router(&id)
}

/// Deletes a router together with its gateway port.
#[instrument(skip(ctx))]
pub fn delete_router(ctx: &Context, router_id: &RouterId) -> L3Result<()> {
    let session = ctx.session();
    let router = session.get_router(router_id)?;

    let txn = session.begin();
    txn.stage(Write::DeleteRouter(router_id.clone()))?;
    if let Some(port_id) = router.gw_port_id {
        txn.stage(Write::DeletePort(port_id))?;
    }
    txn.commit()?;

    info!("Deleted router {}", router_id);
    Ok(())
}
