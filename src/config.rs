//! Network specification parsing and validation.
//!
//! The specification file is a JSON document naming the solution directory
//! and the containers to create. Container order in the file is significant:
//! it drives both IP host-offset order and port-range order.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ordered_map::OrderedMap;

/// Specification for a single container
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSpec {
    /// Docker image reference to create the container from
    pub image: String,
    /// Number of TCP ports (and, in parallel, UDP ports) reserved for this
    /// container (default: 1)
    #[serde(default = "default_number_of_ports")]
    pub number_of_ports: u16,
}

fn default_number_of_ports() -> u16 {
    1
}

/// Top-level network specification that mirrors the JSON specification file
#[derive(Debug, Deserialize)]
pub struct NetworkSpec {
    /// Directory whose contents are copied into every container's working
    /// directory before the container is created
    pub solution_directory: PathBuf,
    /// Containers to create, in declaration order
    pub containers: OrderedMap<ContainerSpec>,
}

/// Semantic errors in an otherwise well-formed specification
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("container '{container}': number_of_ports must be 1 or more (got {count})")]
    NonPositivePortCount { container: String, count: u16 },

    #[error("container names must not be empty")]
    EmptyContainerName,

    #[error("the specification defines no containers")]
    NoContainers,
}

/// Errors while loading a specification file
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("failed to read specification file '{path}'")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse specification file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl NetworkSpec {
    /// Check the semantic invariants the parser cannot express: at least one
    /// container, non-empty names, and a positive port count everywhere.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.containers.is_empty() {
            return Err(ValidationError::NoContainers);
        }
        for (name, container) in self.containers.iter() {
            if name.is_empty() {
                return Err(ValidationError::EmptyContainerName);
            }
            if container.number_of_ports == 0 {
                return Err(ValidationError::NonPositivePortCount {
                    container: name.to_string(),
                    count: container.number_of_ports,
                });
            }
        }
        Ok(())
    }
}

/// Load and validate a network specification from a JSON file.
///
/// Duplicate container names are rejected during parsing; semantic checks
/// run before the caller touches any runtime resource.
pub fn load_spec(path: &Path) -> Result<NetworkSpec, SpecError> {
    let contents = fs::read_to_string(path).map_err(|source| SpecError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let spec: NetworkSpec =
        serde_json::from_str(&contents).map_err(|source| SpecError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    spec.validate()?;
    Ok(spec)
}
