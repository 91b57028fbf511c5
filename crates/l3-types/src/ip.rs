//! Fixed IP assignments.

use crate::{ParseError, SubnetId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A statically assigned address bound to a port within a specific subnet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: SubnetId,
    pub ip_address: IpAddr,
}

impl FixedIp {
    pub fn new(subnet_id: impl Into<SubnetId>, ip_address: IpAddr) -> Self {
        Self {
            subnet_id: subnet_id.into(),
            ip_address,
        }
    }

    /// Returns true if the address is an IPv6 address.
    pub fn is_ipv6(&self) -> bool {
        self.ip_address.is_ipv6()
    }
}

impl fmt::Display for FixedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subnet={},ip={}", self.subnet_id, self.ip_address)
    }
}

/// Parses the `subnet=<id>,ip=<addr>` form used on the command line.
impl FromStr for FixedIp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut subnet_id = None;
        let mut ip_address = None;

        for part in s.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ParseError::InvalidFixedIp(s.to_string()))?;
            match key.trim() {
                "subnet" | "subnet_id" => subnet_id = Some(value.parse::<SubnetId>()?),
                "ip" | "ip_address" => {
                    let addr = value
                        .trim()
                        .parse::<IpAddr>()
                        .map_err(|_| ParseError::InvalidIpAddress(value.to_string()))?;
                    ip_address = Some(addr);
                }
                _ => return Err(ParseError::InvalidFixedIp(s.to_string())),
            }
        }

        match (subnet_id, ip_address) {
            (Some(subnet_id), Some(ip_address)) => Ok(FixedIp {
                subnet_id,
                ip_address,
            }),
            _ => Err(ParseError::InvalidFixedIp(s.to_string())),
        }
    }
}
