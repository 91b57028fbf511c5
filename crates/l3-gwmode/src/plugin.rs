//! Router plugin with the gateway-mode extension applied.

use std::collections::HashMap;
use std::sync::Arc;

use l3_db::{
    create_router, delete_router, Context, DictExtendRegistry, GatewayBase, GatewayInfo,
    L3DbBase, L3Result, Router, RouterView,
};
use l3_types::RouterId;
use serde_json::json;
use tracing::{info, instrument};

use crate::audit::{AuditCategory, AuditRecord, AUDIT_SOURCE};
use crate::audit_log;
use crate::dict::{build_routers_list, GwModeDictExtension};
use crate::gw_mode::GatewayModeDb;
use crate::types::GatewayMode;

/// Router CRUD and rendering with NAT-aware gateway updates.
///
/// Composes [`GatewayModeDb`] over a base gateway routine and renders
/// routers through a frozen [`DictExtendRegistry`].
pub struct L3NatDb<B = L3DbBase> {
    gateway: GatewayModeDb<B>,
    registry: Arc<DictExtendRegistry>,
}

impl L3NatDb<L3DbBase> {
    /// Plugin over the reference gateway routine.
    pub fn with_default_base() -> L3Result<Self> {
        Self::new(L3DbBase::new())
    }
}

impl<B: GatewayBase> L3NatDb<B> {
    /// Builds the plugin and registers the `gw_mode` dict extension.
    pub fn new(base: B) -> L3Result<Self> {
        let registry = DictExtendRegistry::builder()
            .register(GwModeDictExtension)?
            .build();
        Ok(Self::with_registry(base, Arc::new(registry)))
    }

    /// Builds the plugin with an already-frozen registry.
    pub fn with_registry(base: B, registry: Arc<DictExtendRegistry>) -> Self {
        info!("Router dict extensions: {:?}", registry.names());
        Self {
            gateway: GatewayModeDb::new(base),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<DictExtendRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &GatewayModeDb<B> {
        &self.gateway
    }

    /// Renders a router through every registered extension.
    pub fn make_router_dict(&self, router: &Router) -> RouterView {
        self.registry.make_router_dict(router)
    }

    #[instrument(skip(self, ctx, router), fields(router_id = %router.id))]
    pub fn create_router(&self, ctx: &Context, router: Router) -> L3Result<RouterView> {
        let id = router.id.clone();
        let record = AuditRecord::new(AuditCategory::ResourceCreate, AUDIT_SOURCE, "create_router")
            .with_object_id(id.as_str())
            .with_object_type("router")
            .with_correlation_id(ctx.request_id());

        match create_router(ctx, router) {
            Ok(router) => {
                audit_log!(record.with_details(json!(GatewayMode::of(&router))));
                Ok(self.make_router_dict(&router))
            }
            Err(e) => {
                audit_log!(record.with_l3_error(&e));
                Err(e)
            }
        }
    }

    #[instrument(skip(self, ctx))]
    pub fn delete_router(&self, ctx: &Context, router_id: &RouterId) -> L3Result<()> {
        let record = AuditRecord::new(AuditCategory::ResourceDelete, AUDIT_SOURCE, "delete_router")
            .with_object_id(router_id.as_str())
            .with_object_type("router")
            .with_correlation_id(ctx.request_id());

        let result = delete_router(ctx, router_id);
        match &result {
            Ok(()) => {
                audit_log!(record);
            }
            Err(e) => {
                audit_log!(record.with_l3_error(e));
            }
        }
        result
    }

    pub fn get_router(&self, ctx: &Context, router_id: &RouterId) -> L3Result<RouterView> {
        let router = ctx.session().get_router(router_id)?;
        Ok(self.make_router_dict(&router))
    }

    /// All routers, ordered by id.
    pub fn get_routers(&self, ctx: &Context) -> L3Result<Vec<RouterView>> {
        Ok(ctx
            .session()
            .list_routers()?
            .iter()
            .map(|router| self.make_router_dict(router))
            .collect())
    }

    /// Applies a gateway update and returns the rendered router.
    ///
    /// `None` for `info` clears the gateway and turns SNAT off.
    #[instrument(skip(self, ctx, info))]
    pub async fn update_router_gateway(
        &self,
        ctx: &Context,
        router_id: &RouterId,
        info: Option<&GatewayInfo>,
    ) -> L3Result<RouterView> {
        let record = AuditRecord::new(AuditCategory::NetworkConfig, AUDIT_SOURCE, "update_router_gateway")
            .with_object_id(router_id.as_str())
            .with_object_type("router")
            .with_correlation_id(ctx.request_id());

        match self
            .gateway
            .update_router_gw_info(ctx, router_id, info, None)
            .await
        {
            Ok(router) => {
                audit_log!(record.with_details(json!({
                    "enable_snat": router.enable_snat,
                    "enable_ipv6_nat": router.enable_ipv6_nat,
                    "gw_port_id": router.gw_port_id,
                })));
                Ok(self.make_router_dict(&router))
            }
            Err(e) => {
                audit_log!(record
                    .with_l3_error(&e)
                    .with_details(json!({ "request": info })));
                Err(e)
            }
        }
    }

    /// Routers rendered for bulk sync, with gateway ports attached.
    ///
    /// Gateway ports are looked up in one batch rather than per router.
    pub fn get_sync_routers(&self, ctx: &Context) -> L3Result<Vec<RouterView>> {
        let routers = self.get_routers(ctx)?;
        let port_ids: Vec<_> = routers
            .iter()
            .filter_map(|r| r.gw_port_id.clone())
            .collect();

        let gw_ports: HashMap<_, _> = ctx
            .session()
            .get_ports(&port_ids)?
            .into_iter()
            .map(|port| (port.id.clone(), port))
            .collect();

        Ok(build_routers_list(routers, &gw_ports))
    }
}
