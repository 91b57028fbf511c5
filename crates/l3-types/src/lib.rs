//! Common L3 types for the virtual-router control plane.
//!
//! This crate provides type-safe representations of the identifiers and
//! address assignments shared by the router data layer and its extensions:
//!
//! - [`RouterId`], [`PortId`], [`NetworkId`], [`SubnetId`]: opaque identifiers
//! - [`FixedIp`]: a statically assigned address within a subnet

mod id;
mod ip;

pub use id::{NetworkId, PortId, RouterId, SubnetId};
pub use ip::FixedIp;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("identifier must not be empty")]
    EmptyId,

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid fixed IP specification: {0}")]
    InvalidFixedIp(String),
}
