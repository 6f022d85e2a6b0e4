//! Network provisioning orchestrator.
//!
//! This module coordinates the overall provisioning flow: stale-state
//! cleanup, subnet allocation, address and port planning, container
//! creation, and manifest generation. Any step failure aborts the remaining
//! steps; partially created runtime resources are not rolled back.

use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result, WrapErr};
use log::info;

use crate::config::NetworkSpec;
use crate::ip::{allocate_network, assign_addresses, AddressTable, SubnetBase, SubnetPlan};
use crate::manifest::{
    build_known_hosts, write_knownhosts_json, write_knownhosts_txt, Protocol, KNOWNHOSTS_JSON,
    KNOWNHOSTS_TCP, KNOWNHOSTS_UDP,
};
use crate::ports::{plan_ports, PortPlan, DEFAULT_TCP_START, DEFAULT_UDP_START};
use crate::runtime::{ContainerRuntime, NetworkHandle, RuntimeError};
use crate::workdir;

/// Per-run identity and filesystem root, passed explicitly instead of read
/// from ambient process state.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Name of the invoking user; prefixes every runtime resource so
    /// concurrent users on a shared host do not clobber each other
    pub username: String,
    /// Directory holding one subdirectory per container
    pub working_dir: PathBuf,
}

impl RunContext {
    pub fn new(username: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        RunContext {
            username: username.into(),
            working_dir: working_dir.into(),
        }
    }

    /// The per-user network name, `<username>_network`
    pub fn network_name(&self) -> String {
        format!("{}_network", self.username)
    }

    /// The user-prefixed runtime name for a container
    pub fn container_name(&self, name: &str) -> String {
        format!("{}_{}", self.username, name)
    }

    /// The working directory owned by a container
    pub fn container_dir(&self, name: &str) -> PathBuf {
        self.working_dir.join(name)
    }
}

/// What a successful run produced
#[derive(Debug)]
pub struct ProvisionReport {
    pub network: NetworkHandle,
    pub subnet: SubnetPlan,
    pub addresses: AddressTable,
    pub ports: PortPlan,
    /// User-prefixed container names, in declaration order
    pub containers: Vec<String>,
}

/// Drives a full provisioning run against an injected container runtime.
pub struct NetworkOrchestrator<R: ContainerRuntime> {
    runtime: R,
    context: RunContext,
    subnet_base: SubnetBase,
    max_subnet_attempts: u32,
}

impl<R: ContainerRuntime> NetworkOrchestrator<R> {
    pub fn new(runtime: R, context: RunContext) -> Self {
        NetworkOrchestrator {
            runtime,
            context,
            subnet_base: SubnetBase::default(),
            max_subnet_attempts: crate::ip::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the subnet search parameters.
    pub fn with_subnet_search(mut self, base: SubnetBase, max_attempts: u32) -> Self {
        self.subnet_base = base;
        self.max_subnet_attempts = max_attempts;
        self
    }

    /// Run the full provisioning flow for a validated specification.
    ///
    /// Step order: cleanup stale resources, allocate a subnet, plan all
    /// addresses and ports, create and connect containers one at a time in
    /// declaration order, then write the knownhosts manifests into every
    /// container directory.
    pub fn run(&self, spec: &NetworkSpec) -> Result<ProvisionReport> {
        spec.validate()
            .wrap_err("network specification failed validation")?;
        if !spec.solution_directory.is_dir() {
            return Err(eyre!(
                "solution directory '{}' does not exist",
                spec.solution_directory.display()
            ));
        }

        info!("Removing old containers...");
        self.cleanup_stale(spec)
            .wrap_err("failed to clean up stale resources")?;

        info!("Creating your network...");
        let (network, subnet) = allocate_network(
            &self.runtime,
            &self.context.network_name(),
            self.subnet_base,
            self.max_subnet_attempts,
        )
        .wrap_err("failed to allocate a network subnet")?;

        // Plan every address and port range up front so capacity violations
        // surface before any container exists.
        let addresses = assign_addresses(spec.containers.keys(), &subnet)
            .wrap_err("failed to assign container addresses")?;
        let ports = plan_ports(
            spec.containers
                .iter()
                .map(|(name, c)| (name, c.number_of_ports)),
            DEFAULT_TCP_START,
            DEFAULT_UDP_START,
        )
        .wrap_err("failed to partition port ranges")?;

        info!("Creating new containers...");
        let containers = self
            .create_containers(spec, &network, &addresses)
            .wrap_err("failed to create containers")?;

        self.write_manifests(spec, &addresses, &ports)
            .wrap_err("failed to write knownhosts manifests")?;

        Ok(ProvisionReport {
            network,
            subnet,
            addresses,
            ports,
            containers,
        })
    }

    /// Remove same-named containers and the per-user network left over from
    /// a previous run. Absence of a stale resource is success; every other
    /// error is fatal.
    fn cleanup_stale(&self, spec: &NetworkSpec) -> Result<()> {
        for name in spec.containers.keys() {
            let full_name = self.context.container_name(name);
            match self.runtime.get_container(&full_name) {
                Ok(stale) => {
                    info!("Removing stale container {}", stale.name);
                    self.runtime.remove_container(&stale.name, true)?;
                }
                Err(RuntimeError::NotFound { .. }) => continue,
                Err(error) => return Err(error.into()),
            }
        }

        let network_name = self.context.network_name();
        match self.runtime.remove_network(&network_name) {
            Ok(()) => info!("Removed stale network {}", network_name),
            Err(RuntimeError::NotFound { .. }) => {}
            Err(error) => return Err(error.into()),
        }
        Ok(())
    }

    /// Create each container in declaration order: materialize its working
    /// directory, copy the solution tree into it, create the container with
    /// the directory bind-mounted read-write at the identical path, and
    /// connect it to the network at its planned address with the bare name
    /// as a DNS alias.
    fn create_containers(
        &self,
        spec: &NetworkSpec,
        network: &NetworkHandle,
        addresses: &AddressTable,
    ) -> Result<Vec<String>> {
        let mut created = Vec::with_capacity(spec.containers.len());
        for (name, container_spec) in spec.containers.iter() {
            let container_dir = self.context.container_dir(name);
            std::fs::create_dir_all(&container_dir).wrap_err_with(|| {
                format!(
                    "failed to create container directory '{}'",
                    container_dir.display()
                )
            })?;
            workdir::copy_tree(&spec.solution_directory, &container_dir).wrap_err_with(|| {
                format!(
                    "failed to copy solution tree into '{}'",
                    container_dir.display()
                )
            })?;

            let full_name = self.context.container_name(name);
            let handle = self.runtime.create_container(
                &container_spec.image,
                &full_name,
                &container_dir,
                &container_dir,
                name,
            )?;

            let ip = addresses
                .get(name)
                .ok_or_else(|| eyre!("no address planned for container '{}'", name))?;
            self.runtime
                .connect_to_network(&handle, network, *ip, &[name])?;
            info!("Created container {} at {}", full_name, ip);
            created.push(full_name);
        }
        Ok(created)
    }

    /// Write the three knownhosts files into every container directory.
    /// Every container receives the complete network view.
    fn write_manifests(
        &self,
        spec: &NetworkSpec,
        addresses: &AddressTable,
        ports: &PortPlan,
    ) -> Result<()> {
        let known_hosts = build_known_hosts(addresses, ports)?;
        for name in spec.containers.keys() {
            let container_dir = self.context.container_dir(name);
            write_knownhosts_json(&container_dir.join(KNOWNHOSTS_JSON), &known_hosts)?;
            write_knownhosts_txt(&container_dir.join(KNOWNHOSTS_TCP), ports, Protocol::Tcp)?;
            write_knownhosts_txt(&container_dir.join(KNOWNHOSTS_UDP), ports, Protocol::Udp)?;
        }
        Ok(())
    }
}
