//! Per-request sessions and transaction scopes.
//!
//! A [`Session`] wraps a shared [`RouterStore`] and owns at most one pending
//! transaction. [`Session::begin`] opens a scope; a scope opened while another
//! is active on the same session joins it, and only the outermost scope
//! hands its [`WriteBatch`] to the store. Reads through the session see the
//! writes staged so far.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use l3_types::{PortId, RouterId};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{L3Error, L3Result};
use crate::models::{Port, Router, RouterColumn};
use crate::store::{RouterStore, Write, WriteBatch};

#[derive(Debug, Default)]
struct PendingTxn {
    depth: usize,
    writes: WriteBatch,
    rollback_only: bool,
}

/// A unit of work against a [`RouterStore`].
pub struct Session {
    store: Arc<dyn RouterStore>,
    pending: Mutex<Option<PendingTxn>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pending", &*self.pending.lock())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(store: Arc<dyn RouterStore>) -> Self {
        Self {
            store,
            pending: Mutex::new(None),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn RouterStore> {
        &self.store
    }

    /// Returns true while a transaction scope is open.
    pub fn in_transaction(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Number of writes staged in the open transaction.
    pub fn staged_len(&self) -> usize {
        self.pending.lock().as_ref().map_or(0, |p| p.writes.len())
    }

    /// Opens a transaction scope, joining the active one if present.
    pub fn begin(&self) -> Transaction<'_> {
        let mut pending = self.pending.lock();
        let nested = match pending.as_mut() {
            Some(txn) => {
                txn.depth += 1;
                true
            }
            None => {
                *pending = Some(PendingTxn {
                    depth: 1,
                    ..Default::default()
                });
                false
            }
        };
        debug!("Transaction scope opened (nested: {})", nested);

        Transaction {
            session: self,
            nested,
            finished: false,
        }
    }

    /// Loads a router with its gateway port hydrated.
    ///
    /// # Errors
    ///
    /// Returns [`L3Error::NotFound`] if no such router exists.
    pub fn get_router(&self, id: &RouterId) -> L3Result<Router> {
        self.find_router(id)?
            .ok_or_else(|| L3Error::not_found("router", id))
    }

    /// Like [`get_router`](Self::get_router) but returns `None` when missing.
    pub fn find_router(&self, id: &RouterId) -> L3Result<Option<Router>> {
        let pending = self.pending.lock();
        let row = self.store.get_router(id)?;
        let row = match pending.as_ref() {
            Some(txn) => txn.writes.overlay_router(id, row),
            None => row,
        };
        match row {
            Some(router) => Ok(Some(self.hydrate(&pending, router)?)),
            None => Ok(None),
        }
    }

    /// Lists all routers ordered by id, including staged inserts.
    pub fn list_routers(&self) -> L3Result<Vec<Router>> {
        let pending = self.pending.lock();
        let mut rows: BTreeMap<RouterId, Option<Router>> = self
            .store
            .list_routers()?
            .into_iter()
            .map(|r| (r.id.clone(), Some(r)))
            .collect();

        if let Some(txn) = pending.as_ref() {
            for id in txn.writes.inserted_router_ids() {
                rows.entry(id.clone()).or_insert(None);
            }
            for (id, row) in rows.iter_mut() {
                *row = txn.writes.overlay_router(id, row.take());
            }
        }

        rows.into_values()
            .flatten()
            .map(|router| self.hydrate(&pending, router))
            .collect()
    }

    /// Loads a port, if it exists.
    pub fn get_port(&self, id: &PortId) -> L3Result<Option<Port>> {
        let pending = self.pending.lock();
        self.port_with_overlay(&pending, id)
    }

    /// Loads the ports that exist among `ids`, in `ids` order.
    pub fn get_ports(&self, ids: &[PortId]) -> L3Result<Vec<Port>> {
        let pending = self.pending.lock();
        if pending.is_none() {
            return self.store.get_ports(ids);
        }
        let mut ports = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(port) = self.port_with_overlay(&pending, id)? {
                ports.push(port);
            }
        }
        Ok(ports)
    }

    fn port_with_overlay(
        &self,
        pending: &MutexGuard<'_, Option<PendingTxn>>,
        id: &PortId,
    ) -> L3Result<Option<Port>> {
        let row = self.store.get_port(id)?;
        Ok(match pending.as_ref() {
            Some(txn) => txn.writes.overlay_port(id, row),
            None => row,
        })
    }

    fn hydrate(
        &self,
        pending: &MutexGuard<'_, Option<PendingTxn>>,
        mut router: Router,
    ) -> L3Result<Router> {
        router.gw_port = match &router.gw_port_id {
            Some(port_id) => self.port_with_overlay(pending, port_id)?,
            None => None,
        };
        Ok(router)
    }

    fn stage(&self, write: Write) -> L3Result<()> {
        let mut pending = self.pending.lock();
        let txn = pending
            .as_mut()
            .ok_or_else(|| L3Error::internal("write staged outside a transaction"))?;
        txn.writes.push(write);
        Ok(())
    }

    fn finish(&self, nested: bool, commit: bool) -> L3Result<()> {
        let mut pending = self.pending.lock();
        if nested {
            if let Some(txn) = pending.as_mut() {
                txn.depth -= 1;
                if !commit {
                    txn.rollback_only = true;
                }
            }
            return Ok(());
        }

        let Some(txn) = pending.take() else {
            return Err(L3Error::internal("no transaction to finish"));
        };
        drop(pending);

        if !commit {
            debug!("Transaction rolled back, {} writes discarded", txn.writes.len());
            return Ok(());
        }
        if txn.rollback_only {
            warn!("Nested scope rolled back, discarding {} writes", txn.writes.len());
            return Err(L3Error::database(
                "commit",
                "transaction was rolled back by a nested scope",
            ));
        }
        self.store.apply(txn.writes)
    }
}

/// A transaction scope on a [`Session`].
///
/// Dropping an unfinished scope rolls it back. Rolling back a nested scope
/// dooms the enclosing transaction.
#[must_use = "a transaction is rolled back when dropped"]
pub struct Transaction<'s> {
    session: &'s Session,
    nested: bool,
    finished: bool,
}

impl<'s> Transaction<'s> {
    /// Returns true if this scope joined an enclosing transaction.
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Stages a raw write.
    pub fn stage(&self, write: Write) -> L3Result<()> {
        self.session.stage(write)
    }

    /// Stages a single-column router update.
    pub fn update_router(&self, id: &RouterId, column: RouterColumn) -> L3Result<()> {
        debug!("Staging router {} update {}", id, column);
        self.stage(Write::UpdateRouter {
            id: id.clone(),
            column,
        })
    }

    /// Ends the scope. The outermost scope applies every staged write.
    pub fn commit(mut self) -> L3Result<()> {
        self.finished = true;
        self.session.finish(self.nested, true)
    }

    /// Ends the scope, discarding its writes.
    pub fn rollback(mut self) {
        self.finished = true;
        // Only the outer scope can fail here, and a rollback never does.
        let _ = self.session.finish(self.nested, false);
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.session.finish(self.nested, false);
        }
    }
}

/// Request context: the caller's identity plus its session.
#[derive(Debug, Clone)]
pub struct Context {
    session: Arc<Session>,
    tenant_id: Option<String>,
    is_admin: bool,
    request_id: String,
}

impl Context {
    /// Creates an admin context with a fresh session on `store`.
    pub fn new(store: Arc<dyn RouterStore>) -> Self {
        Self::with_session(Arc::new(Session::new(store)))
    }

    /// Creates an admin context sharing an existing session.
    pub fn with_session(session: Arc<Session>) -> Self {
        Self {
            session,
            tenant_id: None,
            is_admin: true,
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Scopes the context to a tenant.
    pub fn for_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self.is_admin = false;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use l3_types::{FixedIp, NetworkId};

    fn seeded() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertRouter(Router::new("r1")));
        store.apply(batch).unwrap();
        let session = Session::new(store.clone());
        (store, session)
    }

    fn stored(store: &MemoryStore, id: &str) -> Router {
        store.get_router(&RouterId::new(id)).unwrap().unwrap()
    }

    #[test]
    fn test_get_router_not_found() {
        let (_, session) = seeded();
        let err = session.get_router(&RouterId::new("missing")).unwrap_err();
        assert!(matches!(err, L3Error::NotFound { ref resource, .. } if resource == "router"));
    }

    #[test]
    fn test_commit_applies_writes() {
        let (store, session) = seeded();
        let id = RouterId::new("r1");

        let txn = session.begin();
        txn.update_router(&id, RouterColumn::EnableSnat(false)).unwrap();
        assert!(stored(&store, "r1").enable_snat);
        txn.commit().unwrap();

        assert!(!stored(&store, "r1").enable_snat);
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_reads_see_staged_writes() {
        let (store, session) = seeded();
        let id = RouterId::new("r1");

        let txn = session.begin();
        txn.update_router(&id, RouterColumn::EnableSnat(false)).unwrap();

        assert!(!session.get_router(&id).unwrap().enable_snat);
        assert!(stored(&store, "r1").enable_snat);
        txn.rollback();

        assert!(session.get_router(&id).unwrap().enable_snat);
    }

    #[test]
    fn test_nested_scope_joins_outer() {
        let (store, session) = seeded();
        let id = RouterId::new("r1");

        let outer = session.begin();
        assert!(!outer.is_nested());
        {
            let inner = session.begin();
            assert!(inner.is_nested());
            inner.update_router(&id, RouterColumn::EnableIpv6Nat(true)).unwrap();
            inner.commit().unwrap();
        }
        // Inner commit alone persists nothing.
        assert!(!stored(&store, "r1").enable_ipv6_nat);
        assert_eq!(session.staged_len(), 1);

        outer.commit().unwrap();
        assert!(stored(&store, "r1").enable_ipv6_nat);
    }

    #[test]
    fn test_nested_rollback_dooms_outer() {
        let (store, session) = seeded();
        let id = RouterId::new("r1");

        let outer = session.begin();
        outer.update_router(&id, RouterColumn::EnableSnat(false)).unwrap();
        session.begin().rollback();

        let err = outer.commit().unwrap_err();
        assert!(matches!(err, L3Error::Database { .. }));
        assert!(stored(&store, "r1").enable_snat);
    }

    #[test]
    fn test_drop_rolls_back() {
        let (store, session) = seeded();
        {
            let txn = session.begin();
            txn.update_router(&RouterId::new("r1"), RouterColumn::EnableSnat(false))
                .unwrap();
        }
        assert!(!session.in_transaction());
        assert!(stored(&store, "r1").enable_snat);
    }

    #[test]
    fn test_failed_commit_leaves_store_unchanged() {
        let (store, session) = seeded();
        let id = RouterId::new("r1");

        let txn = session.begin();
        txn.update_router(&id, RouterColumn::EnableSnat(false)).unwrap();
        txn.update_router(&id, RouterColumn::EnableIpv6Nat(true)).unwrap();
        assert!(txn.commit().is_err());

        let router = stored(&store, "r1");
        assert_eq!((router.enable_snat, router.enable_ipv6_nat), (true, false));
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_gateway_port_hydrated() {
        let (_, session) = seeded();
        let id = RouterId::new("r1");
        let port = Port::gateway(
            PortId::new("p1"),
            NetworkId::new("ext"),
            &id,
            vec![FixedIp::new("s1", "10.0.0.5".parse().unwrap())],
        );

        let txn = session.begin();
        txn.stage(Write::InsertPort(port.clone())).unwrap();
        txn.update_router(&id, RouterColumn::GwPortId(Some(port.id.clone())))
            .unwrap();
        txn.commit().unwrap();

        let router = session.get_router(&id).unwrap();
        assert_eq!(router.gw_port, Some(port));
    }

    #[test]
    fn test_list_routers_includes_staged_inserts() {
        let (_, session) = seeded();
        let txn = session.begin();
        txn.stage(Write::InsertRouter(Router::new("r0"))).unwrap();

        let ids: Vec<String> = session
            .list_routers()
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["r0", "r1"]);
        txn.rollback();

        assert_eq!(session.list_routers().unwrap().len(), 1);
    }

    #[test]
    fn test_context_identity() {
        let (store, _) = seeded();
        let ctx = Context::new(store);
        assert!(ctx.is_admin());
        assert!(ctx.request_id().starts_with("req-"));

        let tenant = ctx.clone().for_tenant("t1");
        assert!(!tenant.is_admin());
        assert_eq!(tenant.tenant_id(), Some("t1"));
    }
}
