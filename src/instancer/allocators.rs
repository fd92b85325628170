// ============================================================================
// File: packages/adles/src/instancer/allocators.rs
// ----------------------------------------------------------------------------
// Subnet and VLAN allocation for concrete networks
// ============================================================================

use std::collections::BTreeSet;

use crate::spec::{NetworkSpec, Subnet};

use super::{VLAN_FIRST, VLAN_LAST};

/// Monotonic subnet allocator for one generic network
///
/// The k-th allocation (0-based) is `base + k * block` when the network
/// increments, otherwise always the base subnet.
#[derive(Debug, Clone)]
pub struct SubnetAllocator {
    base: Option<Subnet>,
    increment: bool,
    issued: u64,
}

impl SubnetAllocator {
    pub fn new(spec: &NetworkSpec) -> Self {
        Self {
            base: spec.subnet,
            increment: spec.increments(),
            issued: 0,
        }
    }

    /// Next subnet, `Ok(None)` when the network has no subnet
    pub fn allocate(&mut self) -> Result<Option<Subnet>, String> {
        let Some(base) = self.base else {
            return Ok(None);
        };
        if !self.increment {
            return Ok(Some(base));
        }
        let subnet = base.advance(self.issued).ok_or_else(|| {
            format!(
                "incrementing {base} {} times leaves the IPv4 address space",
                self.issued
            )
        })?;
        self.issued += 1;
        Ok(Some(subnet))
    }
}

/// Allocator for VLAN tags not used anywhere else in the specification
#[derive(Debug, Clone)]
pub struct VlanAllocator {
    used: BTreeSet<u16>,
    next: u16,
}

impl VlanAllocator {
    /// Create an allocator that never hands out any of `used`
    pub fn new<I: IntoIterator<Item = u16>>(used: I) -> Self {
        Self {
            used: used.into_iter().collect(),
            next: VLAN_FIRST,
        }
    }

    /// Next free tag in the reserved range
    pub fn allocate(&mut self) -> Result<u16, String> {
        while self.next <= VLAN_LAST {
            let candidate = self.next;
            self.next += 1;
            if self.used.insert(candidate) {
                return Ok(candidate);
            }
        }
        Err(format!(
            "no free VLAN tags left in {VLAN_FIRST}-{VLAN_LAST}"
        ))
    }

    /// Number of tags handed out or reserved so far
    pub fn used(&self) -> usize {
        self.used.len()
    }
}
