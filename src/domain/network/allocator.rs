// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Deterministic IPv4 address derivation from a cluster CIDR.
//!
//! Addresses are handed out by offset from the network's base address:
//! offset 1 is the gateway, node addresses start at offset 2. The allocator
//! does not check offsets against the prefix length; callers keep node counts
//! within the subnet (see `ProvisionerConfig::validate`). Arithmetic that would
//! leave the 32-bit address space is an error rather than a wraparound.

use crate::infrastructure::constants::GATEWAY_OFFSET;
use crate::shared::error::{ProvisionError, Result};
use ipnet::{IpNet, Ipv4Net};
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAllocation {
    net: Ipv4Net,
    gateway: Ipv4Addr,
}

/// Parse `cidr` and derive the gateway address for it.
pub fn allocate(cidr: &str) -> Result<NetworkAllocation> {
    let parsed = IpNet::from_str(cidr.trim())
        .map_err(|e| ProvisionError::invalid_cidr(cidr, e.to_string()))?;

    let net = match parsed {
        IpNet::V4(net) => net,
        IpNet::V6(_) => return Err(ProvisionError::Ipv6NotSupported(cidr.to_string())),
    };

    let mut allocation = NetworkAllocation {
        net,
        gateway: net.network(),
    };
    allocation.gateway = allocation.addr(GATEWAY_OFFSET)?;
    Ok(allocation)
}

impl NetworkAllocation {
    /// Address at `offset` from the network base address.
    pub fn addr(&self, offset: i64) -> Result<Ipv4Addr> {
        if offset < 0 {
            return Err(ProvisionError::NegativeOffset(offset));
        }

        let base = u32::from(self.net.network());
        u32::try_from(offset)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .map(Ipv4Addr::from)
            .ok_or_else(|| ProvisionError::OffsetOutOfRange {
                offset,
                cidr: self.net.to_string(),
            })
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn net(&self) -> Ipv4Net {
        self.net
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// Number of usable addresses after the gateway, excluding broadcast.
    pub fn node_capacity(&self) -> u64 {
        let size = 1u64 << (32 - u32::from(self.net.prefix_len()));
        size.saturating_sub(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_default_network() {
        let alloc = allocate("10.5.0.0/24").unwrap();
        assert_eq!(alloc.gateway(), Ipv4Addr::new(10, 5, 0, 1));
        assert_eq!(alloc.addr(2).unwrap(), Ipv4Addr::new(10, 5, 0, 2));
        assert_eq!(alloc.addr(0).unwrap(), Ipv4Addr::new(10, 5, 0, 0));
        assert_eq!(alloc.prefix_len(), 24);
        assert_eq!(alloc.node_capacity(), 253);
    }

    #[test]
    fn test_host_bits_are_masked() {
        let alloc = allocate("10.5.0.17/24").unwrap();
        assert_eq!(alloc.addr(2).unwrap(), Ipv4Addr::new(10, 5, 0, 2));
    }

    #[test]
    fn test_offsets_carry_across_octets() {
        let alloc = allocate("192.168.0.0/16").unwrap();
        assert_eq!(alloc.addr(258).unwrap(), Ipv4Addr::new(192, 168, 1, 2));
    }

    #[test]
    fn test_addresses_strictly_increase() {
        let alloc = allocate("10.5.0.0/24").unwrap();
        let addrs: Vec<Ipv4Addr> = (2..10).map(|i| alloc.addr(i).unwrap()).collect();
        assert!(addrs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_negative_offset_rejected() {
        let alloc = allocate("10.5.0.0/24").unwrap();
        assert!(matches!(
            alloc.addr(-1),
            Err(ProvisionError::NegativeOffset(-1))
        ));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let alloc = allocate("255.255.255.0/24").unwrap();
        assert_eq!(alloc.addr(255).unwrap(), Ipv4Addr::new(255, 255, 255, 255));
        assert!(matches!(
            alloc.addr(256),
            Err(ProvisionError::OffsetOutOfRange { offset: 256, .. })
        ));
        assert!(matches!(
            alloc.addr(i64::MAX),
            Err(ProvisionError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn test_ipv6_rejected() {
        assert!(matches!(
            allocate("fd00::/64"),
            Err(ProvisionError::Ipv6NotSupported(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            allocate("not-a-cidr"),
            Err(ProvisionError::InvalidCidr { .. })
        ));
        assert!(matches!(
            allocate("10.5.0.0"),
            Err(ProvisionError::InvalidCidr { .. })
        ));
    }
}
