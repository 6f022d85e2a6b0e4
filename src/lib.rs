//! # Labnet - per-user Docker network provisioning for assignment testing
//!
//! This library provisions an isolated, per-user Docker network of
//! containers from a declarative JSON specification, assigns deterministic
//! IP addresses, and emits host-discovery manifests that let code running
//! inside each container locate its peers by name, IP, and port range.
//!
//! ## Overview
//!
//! Labnet lets an instructor deploy one container per host named in a
//! specification file, wired together on a private /24 subnet with no route
//! to outside networks. Each container's working directory receives a copy
//! of the solution tree plus three generated "knownhosts" files describing
//! every peer in the network.
//!
//! ## Key Guarantees
//!
//! - **Deterministic addressing**: identical specification order always
//!   produces identical addresses and port ranges, so re-runs are idempotent
//! - **Conflict-free subnets**: the subnet search skips /24s taken by other
//!   users on the same host, bounded by an explicit attempt ceiling
//! - **Order-dependent planning**: container declaration order drives both
//!   host offsets and port ranges, and that contract is explicit in the
//!   `OrderedMap` type
//! - **Full peer visibility**: every container receives the complete network
//!   manifest, not just its own entry
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `config`: network specification parsing and validation
//! - `ordered_map`: the insertion-ordered map the ordering contract lives in
//! - `ip`: subnet derivation, the bounded claim loop, and address assignment
//! - `ports`: contiguous TCP/UDP port-range partitioning
//! - `manifest`: knownhosts manifest generation (JSON + per-protocol text)
//! - `runtime`: the injected container-runtime capability and its Docker
//!   CLI implementation
//! - `workdir`: working-directory lifecycle and solution-tree copy
//! - `orchestrator`: high-level composition of a full provisioning run
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use labnet::config;
//! use labnet::orchestrator::{NetworkOrchestrator, RunContext};
//! use labnet::runtime::DockerCli;
//! use std::path::Path;
//!
//! let spec = config::load_spec(Path::new("network_spec.json"))?;
//! let context = RunContext::new("instructor", "WORKING_DIRECTORY");
//! let orchestrator = NetworkOrchestrator::new(DockerCli::default(), context);
//! let report = orchestrator.run(&spec)?;
//!
//! for container in &report.containers {
//!     println!("docker start -i --attach {}", container);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Specification Format
//!
//! Specifications use JSON; the order of the `containers` keys decides the
//! address and port assignment order:
//!
//! ```json
//! {
//!   "solution_directory": "/home/instructor/solution",
//!   "containers": {
//!     "alice": { "image": "ubuntu:22.04", "number_of_ports": 2 },
//!     "bob":   { "image": "ubuntu:22.04" }
//!   }
//! }
//! ```

pub mod config;
pub mod ip;
pub mod manifest;
pub mod ordered_map;
pub mod orchestrator;
pub mod ports;
pub mod runtime;
pub mod workdir;
