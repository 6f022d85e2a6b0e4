//! End-to-end provisioning tests against a fake container runtime.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tempfile::tempdir;

use labnet::config::{ContainerSpec, NetworkSpec};
use labnet::ip::SubnetBase;
use labnet::manifest::KnownHosts;
use labnet::ordered_map::OrderedMap;
use labnet::orchestrator::{NetworkOrchestrator, RunContext};
use labnet::runtime::{ContainerHandle, ContainerRuntime, NetworkHandle, RuntimeError};

/// Everything the fake runtime saw during a run
#[derive(Debug, Default)]
struct FakeState {
    /// Subnets other users already claimed on this host
    taken_subnets: HashSet<String>,
    /// Containers left over from a previous run
    stale_containers: HashSet<String>,
    /// A network left over from a previous run
    stale_network: Option<String>,
    /// Container name whose creation should fail
    fail_container: Option<String>,

    created_networks: Vec<(String, String, bool)>,
    removed_networks: Vec<String>,
    created_containers: Vec<(String, String, PathBuf, String)>,
    removed_containers: Vec<String>,
    connections: Vec<(String, String, Ipv4Addr, Vec<String>)>,
}

#[derive(Debug, Clone, Default)]
struct FakeRuntime {
    state: Rc<RefCell<FakeState>>,
}

impl FakeRuntime {
    fn with_state(state: FakeState) -> Self {
        FakeRuntime {
            state: Rc::new(RefCell::new(state)),
        }
    }
}

impl ContainerRuntime for FakeRuntime {
    fn create_network(
        &self,
        name: &str,
        subnet_cidr: &str,
        internal: bool,
    ) -> Result<NetworkHandle, RuntimeError> {
        let mut state = self.state.borrow_mut();
        if state.taken_subnets.contains(subnet_cidr) {
            return Err(RuntimeError::Conflict {
                resource: name.to_string(),
                detail: format!("pool overlaps: {}", subnet_cidr),
            });
        }
        state
            .created_networks
            .push((name.to_string(), subnet_cidr.to_string(), internal));
        Ok(NetworkHandle {
            name: name.to_string(),
        })
    }

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.borrow_mut();
        if state.stale_network.as_deref() == Some(name) {
            state.stale_network = None;
            state.removed_networks.push(name.to_string());
            Ok(())
        } else {
            Err(RuntimeError::NotFound {
                resource: name.to_string(),
            })
        }
    }

    fn create_container(
        &self,
        image: &str,
        name: &str,
        bind_mount: &Path,
        working_dir: &Path,
        hostname: &str,
    ) -> Result<ContainerHandle, RuntimeError> {
        assert_eq!(bind_mount, working_dir, "mount path must equal workdir");
        let mut state = self.state.borrow_mut();
        if state.fail_container.as_deref() == Some(name) {
            return Err(RuntimeError::CommandFailed {
                command: format!("docker create {}", name),
                stderr: "injected failure".to_string(),
            });
        }
        state.created_containers.push((
            name.to_string(),
            image.to_string(),
            bind_mount.to_path_buf(),
            hostname.to_string(),
        ));
        Ok(ContainerHandle {
            name: name.to_string(),
        })
    }

    fn connect_to_network(
        &self,
        container: &ContainerHandle,
        network: &NetworkHandle,
        ip: Ipv4Addr,
        aliases: &[&str],
    ) -> Result<(), RuntimeError> {
        self.state.borrow_mut().connections.push((
            container.name.clone(),
            network.name.clone(),
            ip,
            aliases.iter().map(|a| a.to_string()).collect(),
        ));
        Ok(())
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        assert!(force, "stale containers are removed with force");
        let mut state = self.state.borrow_mut();
        if state.stale_containers.remove(name) {
            state.removed_containers.push(name.to_string());
            Ok(())
        } else {
            Err(RuntimeError::NotFound {
                resource: name.to_string(),
            })
        }
    }

    fn get_container(&self, name: &str) -> Result<ContainerHandle, RuntimeError> {
        if self.state.borrow().stale_containers.contains(name) {
            Ok(ContainerHandle {
                name: name.to_string(),
            })
        } else {
            Err(RuntimeError::NotFound {
                resource: name.to_string(),
            })
        }
    }
}

/// A specification with a real solution directory under `root`.
fn sample_spec(root: &Path, counts: &[(&str, u16)]) -> NetworkSpec {
    let solution = root.join("solution");
    fs::create_dir_all(solution.join("src")).unwrap();
    fs::write(solution.join("run.sh"), "#!/bin/sh\n").unwrap();
    fs::write(solution.join("src/peer.py"), "print('peer')\n").unwrap();

    let mut containers = OrderedMap::new();
    for (name, ports) in counts {
        containers.insert(
            *name,
            ContainerSpec {
                image: "ubuntu:22.04".to_string(),
                number_of_ports: *ports,
            },
        );
    }
    NetworkSpec {
        solution_directory: solution,
        containers,
    }
}

fn orchestrator_for(
    runtime: &FakeRuntime,
    root: &Path,
) -> NetworkOrchestrator<FakeRuntime> {
    let context = RunContext::new("grader", root.join("WORKING_DIRECTORY"));
    NetworkOrchestrator::new(runtime.clone(), context)
}

#[test]
fn test_full_run_provisions_network_and_manifests() {
    let dir = tempdir().unwrap();
    let spec = sample_spec(dir.path(), &[("alice", 1), ("bob", 2), ("carol", 1)]);
    let runtime = FakeRuntime::default();

    let report = orchestrator_for(&runtime, dir.path()).run(&spec).unwrap();

    let state = runtime.state.borrow();
    assert_eq!(
        state.created_networks,
        vec![("grader_network".to_string(), "10.1.1.0/24".to_string(), true)]
    );

    // Containers are created in declaration order with user-prefixed names
    // and the bare name as hostname.
    let names: Vec<&str> = state
        .created_containers
        .iter()
        .map(|(name, _, _, _)| name.as_str())
        .collect();
    assert_eq!(names, vec!["grader_alice", "grader_bob", "grader_carol"]);
    assert_eq!(state.created_containers[0].3, "alice");
    assert_eq!(report.containers, names);

    // Each container is connected at its planned address with its bare name
    // as an alias.
    let ips: Vec<Ipv4Addr> = state.connections.iter().map(|(_, _, ip, _)| *ip).collect();
    assert_eq!(
        ips,
        vec![
            Ipv4Addr::new(10, 1, 1, 2),
            Ipv4Addr::new(10, 1, 1, 3),
            Ipv4Addr::new(10, 1, 1, 4),
        ]
    );
    assert_eq!(state.connections[1].3, vec!["bob".to_string()]);
    drop(state);

    // Every container directory received the solution tree and an identical
    // set of manifests.
    let workdir = dir.path().join("WORKING_DIRECTORY");
    let reference = fs::read_to_string(workdir.join("alice/knownhosts.json")).unwrap();
    for name in ["alice", "bob", "carol"] {
        let container_dir = workdir.join(name);
        assert!(container_dir.join("src/peer.py").is_file());
        assert_eq!(
            fs::read_to_string(container_dir.join("knownhosts.json")).unwrap(),
            reference
        );
        assert_eq!(
            fs::read_to_string(container_dir.join("knownhosts_tcp.txt")).unwrap(),
            "alice 9000\nbob 9001-9002\ncarol 9003\n"
        );
        assert_eq!(
            fs::read_to_string(container_dir.join("knownhosts_udp.txt")).unwrap(),
            "alice 10000\nbob 10001-10002\ncarol 10003\n"
        );
    }

    let manifest: KnownHosts = serde_json::from_str(&reference).unwrap();
    let bob = manifest.hosts.get("bob").unwrap();
    assert_eq!(bob.ip_address, "10.1.1.3");
    assert_eq!(bob.tcp_start_port, 9001);
    assert_eq!(bob.tcp_end_port, 9002);
}

#[test]
fn test_stale_resources_are_removed_first() {
    let dir = tempdir().unwrap();
    let spec = sample_spec(dir.path(), &[("alice", 1), ("bob", 1)]);
    let runtime = FakeRuntime::with_state(FakeState {
        stale_containers: ["grader_alice".to_string()].into_iter().collect(),
        stale_network: Some("grader_network".to_string()),
        ..FakeState::default()
    });

    orchestrator_for(&runtime, dir.path()).run(&spec).unwrap();

    let state = runtime.state.borrow();
    // Only the container that actually existed was removed; the absent one
    // was treated as already clean.
    assert_eq!(state.removed_containers, vec!["grader_alice"]);
    assert_eq!(state.removed_networks, vec!["grader_network"]);
}

#[test]
fn test_subnet_conflict_moves_to_next_candidate() {
    let dir = tempdir().unwrap();
    let spec = sample_spec(dir.path(), &[("alice", 1)]);
    let runtime = FakeRuntime::with_state(FakeState {
        taken_subnets: ["10.1.1.0/24".to_string(), "10.2.1.0/24".to_string()]
            .into_iter()
            .collect(),
        ..FakeState::default()
    });

    let report = orchestrator_for(&runtime, dir.path()).run(&spec).unwrap();

    assert_eq!(report.subnet.cidr(), "10.3.1.0/24");
    assert_eq!(
        report.addresses.get("alice"),
        Some(&Ipv4Addr::new(10, 3, 1, 2))
    );
}

#[test]
fn test_subnet_exhaustion_reports_last_candidate() {
    let dir = tempdir().unwrap();
    let spec = sample_spec(dir.path(), &[("alice", 1)]);
    let runtime = FakeRuntime::with_state(FakeState {
        taken_subnets: (1..=255u32)
            .map(|user| format!("10.{}.1.0/24", user))
            .collect(),
        ..FakeState::default()
    });

    let context = RunContext::new("grader", dir.path().join("WORKING_DIRECTORY"));
    let orchestrator = NetworkOrchestrator::new(runtime, context)
        .with_subnet_search(SubnetBase::default(), 3);
    let error = orchestrator.run(&spec).unwrap_err();
    let message = format!("{:?}", error);
    assert!(message.contains("10.3.1.0/24"), "got: {}", message);
}

#[test]
fn test_container_failure_aborts_before_manifests() {
    let dir = tempdir().unwrap();
    let spec = sample_spec(dir.path(), &[("alice", 1), ("bob", 1)]);
    let runtime = FakeRuntime::with_state(FakeState {
        fail_container: Some("grader_bob".to_string()),
        ..FakeState::default()
    });

    let error = orchestrator_for(&runtime, dir.path()).run(&spec).unwrap_err();
    assert!(format!("{:?}", error).contains("injected failure"));

    // The first container was created, but no manifest was written anywhere.
    let workdir = dir.path().join("WORKING_DIRECTORY");
    assert!(!workdir.join("alice/knownhosts.json").exists());
    assert!(!workdir.join("bob/knownhosts.json").exists());
}

#[test]
fn test_invalid_port_count_touches_nothing() {
    let dir = tempdir().unwrap();
    let spec = sample_spec(dir.path(), &[("alice", 0)]);
    let runtime = FakeRuntime::default();

    let error = orchestrator_for(&runtime, dir.path()).run(&spec).unwrap_err();
    assert!(format!("{:?}", error).contains("'alice'"));

    let state = runtime.state.borrow();
    assert!(state.created_networks.is_empty());
    assert!(state.created_containers.is_empty());
    assert!(!dir.path().join("WORKING_DIRECTORY/alice").exists());
}

#[test]
fn test_missing_solution_directory_aborts_up_front() {
    let dir = tempdir().unwrap();
    let mut spec = sample_spec(dir.path(), &[("alice", 1)]);
    spec.solution_directory = dir.path().join("no_such_solution");
    let runtime = FakeRuntime::default();

    let error = orchestrator_for(&runtime, dir.path()).run(&spec).unwrap_err();
    assert!(format!("{:?}", error).contains("no_such_solution"));
    assert!(runtime.state.borrow().created_networks.is_empty());
}

#[test]
fn test_reruns_are_idempotent() {
    let dir = tempdir().unwrap();
    let spec = sample_spec(dir.path(), &[("alice", 2), ("bob", 1)]);

    let first = orchestrator_for(&FakeRuntime::default(), dir.path())
        .run(&spec)
        .unwrap();
    let first_manifest =
        fs::read_to_string(dir.path().join("WORKING_DIRECTORY/alice/knownhosts.json")).unwrap();

    let second = orchestrator_for(&FakeRuntime::default(), dir.path())
        .run(&spec)
        .unwrap();
    let second_manifest =
        fs::read_to_string(dir.path().join("WORKING_DIRECTORY/alice/knownhosts.json")).unwrap();

    assert_eq!(first.addresses, second.addresses);
    assert_eq!(first.ports, second.ports);
    assert_eq!(first_manifest, second_manifest);
}
