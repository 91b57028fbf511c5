//! Gateway-mode update protocol.

use async_trait::async_trait;
use l3_db::{Context, GatewayBase, GatewayInfo, L3Result, Router, Session};
use l3_types::RouterId;
use tracing::{debug, instrument};

use crate::types::GatewayMode;

/// Gateway routine that maintains the NAT flags, layered over `B`.
///
/// Every gateway update resolves and validates the flags, commits both in one
/// transaction scope, then hands the updated router to the wrapped routine.
#[derive(Debug, Clone, Default)]
pub struct GatewayModeDb<B> {
    base: B,
}

impl<B: GatewayBase> GatewayModeDb<B> {
    pub fn new(base: B) -> Self {
        Self { base }
    }

    /// The wrapped gateway routine.
    pub fn base(&self) -> &B {
        &self.base
    }
}

/// Writes both flags in one scope. Either both persist or neither does.
fn commit_gw_mode(session: &Session, router_id: &RouterId, mode: GatewayMode) -> L3Result<()> {
    let txn = session.begin();
    for column in mode.columns() {
        txn.update_router(router_id, column)?;
    }
    txn.commit()
}

#[async_trait]
impl<B: GatewayBase> GatewayBase for GatewayModeDb<B> {
    #[instrument(skip(self, ctx, info, router), fields(request_id = %ctx.request_id()))]
    async fn update_router_gw_info(
        &self,
        ctx: &Context,
        router_id: &RouterId,
        info: Option<&GatewayInfo>,
        router: Option<Router>,
    ) -> L3Result<Router> {
        let mut router = match router {
            Some(router) => router,
            None => ctx.session().get_router(router_id)?,
        };

        let mode = GatewayMode::resolve(info, &router);
        mode.validate()?;

        commit_gw_mode(ctx.session(), &router.id, mode)?;
        mode.apply_to(&mut router);
        debug!("Router {} gateway mode set: {}", router.id, mode);

        self.base
            .update_router_gw_info(ctx, router_id, info, Some(router))
            .await
    }
}
