//! Subnet derivation and the bounded claim loop.
//!
//! Candidate subnets are `<network>.<user>.<subnet>.0/24` with the user
//! octet starting at 1 and incrementing on every conflict, so concurrent
//! users on a shared host end up on disjoint /24s. Candidate derivation is a
//! pure function of the attempt ordinal; claiming a candidate goes through
//! the injected runtime.

use std::net::Ipv4Addr;

use log::{info, warn};

use super::AllocationError;
use crate::runtime::{ContainerRuntime, NetworkHandle, RuntimeError};

/// Upper bound on subnet candidates tried before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 250;

/// The fixed octets a subnet search starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetBase {
    /// First octet of every candidate (default: 10)
    pub network_octet: u8,
    /// Third octet of every candidate (default: 1)
    pub subnet_octet: u8,
}

impl Default for SubnetBase {
    fn default() -> Self {
        SubnetBase {
            network_octet: 10,
            subnet_octet: 1,
        }
    }
}

/// The chosen /24: `<network_octet>.<user_octet>.<subnet_octet>.0/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetPlan {
    pub network_octet: u8,
    pub user_octet: u8,
    pub subnet_octet: u8,
}

impl SubnetPlan {
    /// Candidate subnet for a given retry ordinal (attempt 0 uses user
    /// octet 1). Fails once the user octet would leave `u8` range.
    pub fn for_attempt(base: SubnetBase, attempt: u32) -> Result<Self, AllocationError> {
        let user_octet = 1u32 + attempt;
        let user_octet = u8::try_from(user_octet).map_err(|_| {
            AllocationError::SubnetExhausted {
                attempts: attempt,
                last_tried: format!("{}.{}.{}.0/24", base.network_octet, 255, base.subnet_octet),
            }
        })?;
        Ok(SubnetPlan {
            network_octet: base.network_octet,
            user_octet,
            subnet_octet: base.subnet_octet,
        })
    }

    /// CIDR notation for this /24, e.g. `10.1.1.0/24`
    pub fn cidr(&self) -> String {
        format!(
            "{}.{}.{}.0/24",
            self.network_octet, self.user_octet, self.subnet_octet
        )
    }

    /// Address of the host at the given offset within this /24
    pub fn host(&self, offset: u8) -> Ipv4Addr {
        Ipv4Addr::new(
            self.network_octet,
            self.user_octet,
            self.subnet_octet,
            offset,
        )
    }
}

/// Claim the first free candidate subnet by creating the named network
/// through the runtime.
///
/// A conflict error from the runtime (subnet overlap) moves the search to
/// the next candidate; any other runtime error aborts immediately. The
/// created network is internal (no default route) with the subnet managed
/// via IPAM. Fails with `SubnetExhausted` after `max_attempts` candidates.
pub fn allocate_network<R: ContainerRuntime>(
    runtime: &R,
    network_name: &str,
    base: SubnetBase,
    max_attempts: u32,
) -> Result<(NetworkHandle, SubnetPlan), AllocationError> {
    let mut last_tried = String::new();
    for attempt in 0..max_attempts {
        let plan = SubnetPlan::for_attempt(base, attempt)?;
        let cidr = plan.cidr();
        match runtime.create_network(network_name, &cidr, true) {
            Ok(handle) => {
                info!("Created network {} on subnet {}", network_name, cidr);
                return Ok((handle, plan));
            }
            Err(RuntimeError::Conflict { .. }) => {
                warn!("Subnet {} is taken, trying the next candidate", cidr);
                last_tried = cidr;
            }
            Err(error) => return Err(error.into()),
        }
    }
    Err(AllocationError::SubnetExhausted {
        attempts: max_attempts,
        last_tried,
    })
}
