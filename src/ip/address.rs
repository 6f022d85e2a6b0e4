//! Deterministic host-address assignment within the chosen /24.
//!
//! Host numbering starts at offset 2: host 0 is the network address and
//! host 1 is reserved for the gateway. Identical container order always
//! produces identical addresses, which is what makes re-runs idempotent.

use std::net::Ipv4Addr;

use super::subnet::SubnetPlan;
use super::AllocationError;
use crate::ordered_map::OrderedMap;

/// First host offset handed to a container
pub const FIRST_HOST_OFFSET: u8 = 2;

/// Usable hosts in a /24 once the network, gateway, and broadcast addresses
/// are excluded (offsets 2 through 254)
pub const HOST_CAPACITY: usize = 253;

/// Container name -> assigned address, in declaration order
pub type AddressTable = OrderedMap<Ipv4Addr>;

/// Assign each container a host address within `plan`, in declaration order.
///
/// Fails with `AddressSpaceExhausted` when the container count does not fit
/// the /24; nothing is assigned in that case.
pub fn assign_addresses<'a, I>(
    names_in_order: I,
    plan: &SubnetPlan,
) -> Result<AddressTable, AllocationError>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names_in_order.into_iter().collect();
    if names.len() > HOST_CAPACITY {
        return Err(AllocationError::AddressSpaceExhausted {
            containers: names.len(),
            capacity: HOST_CAPACITY,
        });
    }

    let mut table = AddressTable::new();
    for (index, name) in names.into_iter().enumerate() {
        let offset = FIRST_HOST_OFFSET + index as u8;
        table.insert(name, plan.host(offset));
    }
    Ok(table)
}
