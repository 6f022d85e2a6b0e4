//! Container runtime capability.
//!
//! The provisioning core never talks to Docker directly; it consumes this
//! trait so the allocation and orchestration logic can be exercised against
//! a fake runtime in tests. The production implementation shells out to the
//! `docker` CLI.

pub mod docker;

use std::net::Ipv4Addr;
use std::path::Path;

pub use docker::DockerCli;

/// Handle to a created network resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    /// Runtime-level network name (already user-prefixed)
    pub name: String,
}

/// Handle to a created container resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Runtime-level container name (already user-prefixed)
    pub name: String,
}

/// Errors surfaced by runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The name or address range is already taken. Retried only inside the
    /// subnet claim loop; fatal everywhere else.
    #[error("runtime resource conflict for '{resource}': {detail}")]
    Conflict { resource: String, detail: String },

    /// The named resource does not exist. Absorbed only during stale-state
    /// cleanup; fatal everywhere else.
    #[error("runtime resource '{resource}' not found")]
    NotFound { resource: String },

    #[error("'{command}' did not finish within {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("'{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// The injected container-runtime capability.
///
/// All methods are synchronous and expected to finish within the runtime's
/// configured per-call timeout.
pub trait ContainerRuntime {
    /// Create a bridge network with the given /24 subnet. `internal` networks
    /// have no default route to outside networks. The subnet is managed via
    /// IPAM so containers can be connected at fixed addresses.
    fn create_network(
        &self,
        name: &str,
        subnet_cidr: &str,
        internal: bool,
    ) -> Result<NetworkHandle, RuntimeError>;

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Create (but do not start) a container with `bind_mount` mounted
    /// read-write at the identical path inside the container.
    fn create_container(
        &self,
        image: &str,
        name: &str,
        bind_mount: &Path,
        working_dir: &Path,
        hostname: &str,
    ) -> Result<ContainerHandle, RuntimeError>;

    /// Connect a container to a network at a fixed address, registering the
    /// given DNS aliases.
    fn connect_to_network(
        &self,
        container: &ContainerHandle,
        network: &NetworkHandle,
        ip: Ipv4Addr,
        aliases: &[&str],
    ) -> Result<(), RuntimeError>;

    fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError>;

    /// Look up an existing container by name.
    fn get_container(&self, name: &str) -> Result<ContainerHandle, RuntimeError>;
}
