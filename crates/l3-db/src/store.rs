//! Router storage.
//!
//! [`RouterStore`] is the seam between sessions and the physical tables.
//! Stores apply a [`WriteBatch`] all-or-nothing: either every write and every
//! table constraint succeeds and the whole batch becomes visible at once, or
//! nothing changes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use l3_types::{FixedIp, PortId, RouterId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{L3Error, L3Result};
use crate::models::{Port, Router, RouterColumn};
use crate::schema::{self, CURRENT_SCHEMA_VERSION};

/// A single staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    InsertRouter(Router),
    UpdateRouter { id: RouterId, column: RouterColumn },
    DeleteRouter(RouterId),
    InsertPort(Port),
    UpdatePortFixedIps { id: PortId, fixed_ips: Vec<FixedIp> },
    DeletePort(PortId),
}

/// Ordered set of writes committed as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Write> {
        self.writes.iter()
    }

    /// Returns the router as it would look after this batch commits.
    pub fn overlay_router(&self, id: &RouterId, base: Option<Router>) -> Option<Router> {
        self.writes.iter().fold(base, |current, write| match write {
            Write::InsertRouter(router) if &router.id == id => Some(router.clone()),
            Write::UpdateRouter { id: target, column } if target == id => {
                current.map(|mut router| {
                    router.apply(column);
                    router
                })
            }
            Write::DeleteRouter(target) if target == id => None,
            _ => current,
        })
    }

    /// Returns the port as it would look after this batch commits.
    pub fn overlay_port(&self, id: &PortId, base: Option<Port>) -> Option<Port> {
        self.writes.iter().fold(base, |current, write| match write {
            Write::InsertPort(port) if &port.id == id => Some(port.clone()),
            Write::UpdatePortFixedIps { id: target, fixed_ips } if target == id => {
                current.map(|mut port| {
                    port.fixed_ips = fixed_ips.clone();
                    port
                })
            }
            Write::DeletePort(target) if target == id => None,
            _ => current,
        })
    }

    /// Router ids inserted by this batch.
    pub fn inserted_router_ids(&self) -> impl Iterator<Item = &RouterId> {
        self.writes.iter().filter_map(|write| match write {
            Write::InsertRouter(router) => Some(&router.id),
            _ => None,
        })
    }
}

impl Extend<Write> for WriteBatch {
    fn extend<I: IntoIterator<Item = Write>>(&mut self, iter: I) {
        self.writes.extend(iter);
    }
}

/// Physical storage for routers and ports.
///
/// Reads return rows as last committed; `gw_port` is never hydrated here.
pub trait RouterStore: Send + Sync {
    /// Fetches a router row.
    fn get_router(&self, id: &RouterId) -> L3Result<Option<Router>>;

    /// Fetches all router rows ordered by id.
    fn list_routers(&self) -> L3Result<Vec<Router>>;

    /// Fetches a port row.
    fn get_port(&self, id: &PortId) -> L3Result<Option<Port>>;

    /// Fetches the ports that exist among `ids`, in `ids` order.
    fn get_ports(&self, ids: &[PortId]) -> L3Result<Vec<Port>> {
        let mut ports = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(port) = self.get_port(id)? {
                ports.push(port);
            }
        }
        Ok(ports)
    }

    /// Applies a batch atomically.
    fn apply(&self, batch: WriteBatch) -> L3Result<()>;
}

/// Persisted snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub routers: Vec<Router>,
    #[serde(default)]
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    routers: BTreeMap<RouterId, Router>,
    ports: BTreeMap<PortId, Port>,
}

impl Tables {
    fn apply(&mut self, write: &Write) -> L3Result<()> {
        match write {
            Write::InsertRouter(router) => {
                if self.routers.contains_key(&router.id) {
                    return Err(L3Error::database(
                        "insert",
                        format!("router {} already exists", router.id),
                    ));
                }
                let mut row = router.clone();
                row.gw_port = None;
                self.routers.insert(row.id.clone(), row);
            }
            Write::UpdateRouter { id, column } => {
                let row = self
                    .routers
                    .get_mut(id)
                    .ok_or_else(|| L3Error::not_found("router", id))?;
                row.apply(column);
                row.gw_port = None;
            }
            Write::DeleteRouter(id) => {
                self.routers
                    .remove(id)
                    .ok_or_else(|| L3Error::not_found("router", id))?;
            }
            Write::InsertPort(port) => {
                if self.ports.contains_key(&port.id) {
                    return Err(L3Error::database(
                        "insert",
                        format!("port {} already exists", port.id),
                    ));
                }
                self.ports.insert(port.id.clone(), port.clone());
            }
            Write::UpdatePortFixedIps { id, fixed_ips } => {
                let row = self
                    .ports
                    .get_mut(id)
                    .ok_or_else(|| L3Error::not_found("port", id))?;
                row.fixed_ips = fixed_ips.clone();
            }
            Write::DeletePort(id) => {
                self.ports
                    .remove(id)
                    .ok_or_else(|| L3Error::not_found("port", id))?;
            }
        }
        Ok(())
    }

    fn check_constraints(&self) -> L3Result<()> {
        for router in self.routers.values() {
            if router.enable_ipv6_nat && !router.enable_snat {
                return Err(L3Error::constraint(
                    "routers",
                    format!(
                        "router {}: enable_ipv6_nat requires enable_snat",
                        router.id
                    ),
                ));
            }
            if let Some(port_id) = &router.gw_port_id {
                if !self.ports.contains_key(port_id) {
                    return Err(L3Error::constraint(
                        "routers",
                        format!("router {}: gw_port_id {} does not exist", router.id, port_id),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// In-memory store with JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a snapshot already at the current schema version.
    pub fn from_snapshot(snapshot: Snapshot) -> L3Result<Self> {
        if snapshot.schema_version != CURRENT_SCHEMA_VERSION {
            return Err(L3Error::schema(format!(
                "snapshot at version {} must be migrated to {} first",
                snapshot.schema_version, CURRENT_SCHEMA_VERSION
            )));
        }

        let mut tables = Tables::default();
        for port in snapshot.ports {
            tables.apply(&Write::InsertPort(port))?;
        }
        for router in snapshot.routers {
            tables.apply(&Write::InsertRouter(router))?;
        }
        tables.check_constraints()?;

        Ok(Self {
            tables: RwLock::new(tables),
        })
    }

    /// Returns the committed state as a snapshot.
    pub fn snapshot(&self) -> Snapshot {
        let tables = self.tables.read();
        Snapshot {
            schema_version: CURRENT_SCHEMA_VERSION,
            routers: tables.routers.values().cloned().collect(),
            ports: tables.ports.values().cloned().collect(),
        }
    }

    /// Loads a snapshot file, migrating it to the current schema.
    pub fn load(path: impl AsRef<Path>) -> L3Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| L3Error::io(path.display().to_string(), e))?;
        let mut doc: serde_json::Value = serde_json::from_str(&raw)?;

        let from = schema::migrate(&mut doc)?;
        if from != CURRENT_SCHEMA_VERSION {
            info!(
                "Migrated snapshot {} from schema version {} to {}",
                path.display(),
                from,
                CURRENT_SCHEMA_VERSION
            );
        }

        let store = Self::from_snapshot(serde_json::from_value(doc)?)?;
        debug!(
            "Loaded {} routers and {} ports from {}",
            store.router_count(),
            store.port_count(),
            path.display()
        );
        Ok(store)
    }

    /// Writes the committed state to `path` (temp file + rename).
    pub fn save(&self, path: impl AsRef<Path>) -> L3Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_string_pretty(&self.snapshot())?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, body).map_err(|e| L3Error::io(path.display().to_string(), e))?;
        fs::rename(&tmp, path).map_err(|e| L3Error::io(path.display().to_string(), e))?;

        debug!("Saved snapshot to {}", path.display());
        Ok(())
    }

    pub fn router_count(&self) -> usize {
        self.tables.read().routers.len()
    }

    pub fn port_count(&self) -> usize {
        self.tables.read().ports.len()
    }
}

impl RouterStore for MemoryStore {
    fn get_router(&self, id: &RouterId) -> L3Result<Option<Router>> {
        Ok(self.tables.read().routers.get(id).cloned())
    }

    fn list_routers(&self) -> L3Result<Vec<Router>> {
        Ok(self.tables.read().routers.values().cloned().collect())
    }

    fn get_port(&self, id: &PortId) -> L3Result<Option<Port>> {
        Ok(self.tables.read().ports.get(id).cloned())
    }

    fn apply(&self, batch: WriteBatch) -> L3Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write();
        let mut next = tables.clone();
        for write in batch.iter() {
            next.apply(write)?;
        }
        next.check_constraints()?;
        *tables = next;

        debug!("Committed {} writes", batch.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3_types::NetworkId;
    use pretty_assertions::assert_eq;

    fn gw_port(id: &str, router: &str) -> Port {
        Port::gateway(
            PortId::new(id),
            NetworkId::new("ext-net"),
            &RouterId::new(router),
            vec![FixedIp::new("ext-v4", "172.24.4.2".parse().unwrap())],
        )
    }

    fn store_with_router(id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertRouter(Router::new(id)));
        store.apply(batch).unwrap();
        store
    }

    #[test]
    fn test_apply_batch() {
        let store = store_with_router("r1");

        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPort(gw_port("p1", "r1")));
        batch.push(Write::UpdateRouter {
            id: RouterId::new("r1"),
            column: RouterColumn::GwPortId(Some(PortId::new("p1"))),
        });
        store.apply(batch).unwrap();

        let router = store.get_router(&RouterId::new("r1")).unwrap().unwrap();
        assert_eq!(router.gw_port_id, Some(PortId::new("p1")));
        assert_eq!(store.port_count(), 1);
    }

    #[test]
    fn test_failed_write_discards_whole_batch() {
        let store = store_with_router("r1");

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateRouter {
            id: RouterId::new("r1"),
            column: RouterColumn::EnableSnat(false),
        });
        batch.push(Write::UpdateRouter {
            id: RouterId::new("missing"),
            column: RouterColumn::EnableIpv6Nat(false),
        });

        assert!(matches!(store.apply(batch), Err(L3Error::NotFound { .. })));
        let router = store.get_router(&RouterId::new("r1")).unwrap().unwrap();
        assert!(router.enable_snat);
    }

    #[test]
    fn test_check_constraint_rejects_ipv6_nat_without_snat() {
        let store = store_with_router("r1");

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateRouter {
            id: RouterId::new("r1"),
            column: RouterColumn::EnableIpv6Nat(true),
        });
        batch.push(Write::UpdateRouter {
            id: RouterId::new("r1"),
            column: RouterColumn::EnableSnat(false),
        });

        let err = store.apply(batch).unwrap_err();
        assert!(matches!(err, L3Error::ConstraintViolation { .. }));

        let router = store.get_router(&RouterId::new("r1")).unwrap().unwrap();
        assert_eq!((router.enable_snat, router.enable_ipv6_nat), (true, false));
    }

    #[test]
    fn test_dangling_gw_port_rejected() {
        let store = store_with_router("r1");

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateRouter {
            id: RouterId::new("r1"),
            column: RouterColumn::GwPortId(Some(PortId::new("nope"))),
        });
        assert!(store.apply(batch).is_err());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = store_with_router("r1");
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertRouter(Router::new("r1")));
        assert!(matches!(store.apply(batch), Err(L3Error::Database { .. })));
    }

    #[test]
    fn test_overlay_router() {
        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateRouter {
            id: RouterId::new("r1"),
            column: RouterColumn::EnableSnat(false),
        });

        let overlaid = batch
            .overlay_router(&RouterId::new("r1"), Some(Router::new("r1")))
            .unwrap();
        assert!(!overlaid.enable_snat);

        // Other routers are untouched.
        let other = batch
            .overlay_router(&RouterId::new("r2"), Some(Router::new("r2")))
            .unwrap();
        assert!(other.enable_snat);

        batch.push(Write::DeleteRouter(RouterId::new("r1")));
        assert!(batch
            .overlay_router(&RouterId::new("r1"), Some(Router::new("r1")))
            .is_none());
    }

    #[test]
    fn test_get_ports_skips_missing() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPort(gw_port("p1", "r1")));
        batch.push(Write::InsertPort(gw_port("p2", "r2")));
        store.apply(batch).unwrap();

        let ports = store
            .get_ports(&[PortId::new("p2"), PortId::new("gone"), PortId::new("p1")])
            .unwrap();
        let ids: Vec<&str> = ports.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l3.json");

        let store = store_with_router("r1");
        let mut batch = WriteBatch::new();
        batch.push(Write::UpdateRouter {
            id: RouterId::new("r1"),
            column: RouterColumn::EnableIpv6Nat(true),
        });
        store.apply(batch).unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
        let router = loaded.get_router(&RouterId::new("r1")).unwrap().unwrap();
        assert!(router.enable_snat);
        assert!(router.enable_ipv6_nat);
    }

    #[test]
    fn test_load_migrates_v1_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        fs::write(&path, r#"{"routers": [{"id": "r1", "name": "edge"}], "ports": []}"#).unwrap();

        let store = MemoryStore::load(&path).unwrap();
        let router = store.get_router(&RouterId::new("r1")).unwrap().unwrap();
        assert_eq!(router.name, "edge");
        assert!(router.enable_snat);
        assert!(!router.enable_ipv6_nat);
    }

    #[test]
    fn test_load_rejects_violating_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(
            &path,
            r#"{"schema_version": 2, "routers": [{"id": "r1", "enable_snat": false, "enable_ipv6_nat": true}]}"#,
        )
        .unwrap();

        assert!(matches!(
            MemoryStore::load(&path),
            Err(L3Error::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MemoryStore::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, L3Error::Io { .. }));
    }
}
