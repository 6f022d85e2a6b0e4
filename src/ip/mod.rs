//! IP address allocation and management module.
//!
//! This module derives a conflict-free /24 subnet for the user's network and
//! assigns each container a deterministic host address within it.

pub mod address;
pub mod subnet;

// Re-export commonly used types
pub use address::{assign_addresses, AddressTable, FIRST_HOST_OFFSET, HOST_CAPACITY};
pub use subnet::{allocate_network, SubnetBase, SubnetPlan, DEFAULT_MAX_ATTEMPTS};

/// Errors from subnet search and address assignment
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("no free /24 subnet after {attempts} attempts (last tried {last_tried})")]
    SubnetExhausted { attempts: u32, last_tried: String },

    #[error("{containers} containers exceed the /24 capacity of {capacity} usable hosts")]
    AddressSpaceExhausted { containers: usize, capacity: usize },

    #[error(transparent)]
    Runtime(#[from] crate::runtime::RuntimeError),
}
