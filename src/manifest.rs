//! Knownhosts manifest generation.
//!
//! Every container's working directory receives the same three files: a JSON
//! directory of all hosts (`knownhosts.json`) and one plaintext port listing
//! per protocol (`knownhosts_tcp.txt`, `knownhosts_udp.txt`). Full network
//! visibility is intentional: every host can resolve every peer. Files are
//! rendered to an in-memory buffer and written in a single call so a failed
//! run never leaves a truncated manifest behind.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ip::AddressTable;
use crate::ordered_map::OrderedMap;
use crate::ports::PortPlan;

/// File name of the JSON manifest
pub const KNOWNHOSTS_JSON: &str = "knownhosts.json";

/// File name of the TCP port listing
pub const KNOWNHOSTS_TCP: &str = "knownhosts_tcp.txt";

/// File name of the UDP port listing
pub const KNOWNHOSTS_UDP: &str = "knownhosts_udp.txt";

/// One host's entry in the JSON manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub tcp_start_port: u16,
    pub tcp_end_port: u16,
    pub udp_start_port: u16,
    pub udp_end_port: u16,
    pub ip_address: String,
}

/// The JSON manifest: every container's address and port ranges, in
/// declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownHosts {
    pub hosts: OrderedMap<HostEntry>,
}

/// Protocol selector for the plaintext listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Errors while building or writing manifests
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("container '{container}' has a port assignment but no address")]
    MissingAddress { container: String },

    #[error("failed to write manifest '{path}'")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to serialize manifest")]
    Serialize(#[from] serde_json::Error),
}

/// Combine the address table and port plan into the manifest value.
///
/// The port plan drives iteration, so every container with ports must also
/// have an address; a missing address fails loudly rather than producing a
/// partial directory.
pub fn build_known_hosts(
    addresses: &AddressTable,
    ports: &PortPlan,
) -> Result<KnownHosts, ManifestError> {
    let mut hosts = OrderedMap::new();
    for (name, assignment) in ports.iter() {
        let ip = addresses
            .get(name)
            .ok_or_else(|| ManifestError::MissingAddress {
                container: name.to_string(),
            })?;
        hosts.insert(
            name,
            HostEntry {
                tcp_start_port: assignment.tcp.start,
                tcp_end_port: assignment.tcp.end,
                udp_start_port: assignment.udp.start,
                udp_end_port: assignment.udp.end,
                ip_address: ip.to_string(),
            },
        );
    }
    Ok(KnownHosts { hosts })
}

/// Write the JSON manifest in one call from a fully serialized buffer.
pub fn write_knownhosts_json(path: &Path, known_hosts: &KnownHosts) -> Result<(), ManifestError> {
    let mut buffer = serde_json::to_vec_pretty(known_hosts)?;
    buffer.push(b'\n');
    fs::write(path, buffer).map_err(|source| ManifestError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Write the plaintext listing for one protocol: one line per container in
/// declaration order, `<name> <port>` for single-port containers and
/// `<name> <start>-<end>` otherwise.
pub fn write_knownhosts_txt(
    path: &Path,
    ports: &PortPlan,
    protocol: Protocol,
) -> Result<(), ManifestError> {
    let mut buffer = String::new();
    for (name, assignment) in ports.iter() {
        let range = match protocol {
            Protocol::Tcp => assignment.tcp,
            Protocol::Udp => assignment.udp,
        };
        if range.len() > 1 {
            buffer.push_str(&format!("{} {}-{}\n", name, range.start, range.end));
        } else {
            buffer.push_str(&format!("{} {}\n", name, range.start));
        }
    }
    fs::write(path, buffer).map_err(|source| ManifestError::Write {
        path: path.display().to_string(),
        source,
    })
}
