//! Base L3 data layer for the virtual-router control plane.
//!
//! This crate provides the pieces every router extension builds on:
//!
//! - [`models`]: router and port entities as persisted
//! - [`schema`]: versioned schema and snapshot migration
//! - [`store`]: the [`RouterStore`] trait and the in-memory [`MemoryStore`]
//! - [`session`]: per-request [`Context`] with nested, joinable transactions
//! - [`view`]: the external (dict) representation of routers
//! - [`extend`]: explicit registration of router dict extensions
//! - [`gateway`]: the base gateway-update routine ([`GatewayBase`])
//! - [`error`]: error types shared by the data layer and its extensions
//!
//! # Architecture
//!
//! ```text
//! caller ──> Context ──> Session ──begin()──> Transaction ──commit()──> RouterStore
//!                           │                    (staged WriteBatch)        │
//!                           └──────── get_router() (store + staged) <───────┘
//! ```
//!
//! Writes are always staged on a session and reach the store as one
//! [`WriteBatch`], which the store applies all-or-nothing.

pub mod error;
pub mod extend;
pub mod gateway;
pub mod models;
pub mod schema;
pub mod session;
pub mod store;
pub mod view;

// Re-export commonly used items at crate root
pub use error::{L3Error, L3Result};
pub use extend::{DictExtendRegistry, DictExtendRegistryBuilder, RouterDictExtension};
pub use gateway::{create_router, delete_router, GatewayBase, L3DbBase};
pub use models::{Port, Router, RouterColumn, DEVICE_OWNER_ROUTER_GW};
pub use schema::{migrate, CURRENT_SCHEMA_VERSION};
pub use session::{Context, Session, Transaction};
pub use store::{MemoryStore, RouterStore, Snapshot, Write, WriteBatch};
pub use view::{FixedIpRequest, GatewayInfo, GatewayInfoView, RouterView, EXTERNAL_GW_INFO};
