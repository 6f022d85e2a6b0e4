//! Docker CLI runtime implementation.
//!
//! Every operation shells out to the `docker` binary with piped output and a
//! watchdog: the child is spawned, polled, and killed if it runs past the
//! configured per-call timeout. Conflict and not-found outcomes are
//! classified from stderr so callers can dispatch on them.

use std::net::Ipv4Addr;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use log::debug;

use super::{ContainerHandle, ContainerRuntime, NetworkHandle, RuntimeError};

/// Default timeout for a single `docker` invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Container runtime backed by the `docker` command-line client
#[derive(Debug, Clone)]
pub struct DockerCli {
    timeout: Duration,
}

impl DockerCli {
    pub fn new(timeout: Duration) -> Self {
        DockerCli { timeout }
    }

    /// Run `docker` with the given arguments, enforcing the per-call timeout.
    /// Returns stdout on success; failures are classified from stderr, with
    /// `resource` naming the network or container the call was about.
    fn run(&self, resource: &str, args: &[&str]) -> Result<String, RuntimeError> {
        let command = format!("docker {}", args.join(" "));
        debug!("Running: {}", command);

        let child = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: command.clone(),
                source,
            })?;

        let output = self.wait_with_timeout(child, &command)?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(classify_failure(resource, &command, stderr))
        }
    }

    /// Poll the child until it exits or the timeout elapses, killing it in
    /// the latter case.
    fn wait_with_timeout(
        &self,
        mut child: Child,
        command: &str,
    ) -> Result<std::process::Output, RuntimeError> {
        let started = Instant::now();
        loop {
            let status = child.try_wait().map_err(|source| RuntimeError::Spawn {
                command: command.to_string(),
                source,
            })?;
            if status.is_some() {
                return child
                    .wait_with_output()
                    .map_err(|source| RuntimeError::Spawn {
                        command: command.to_string(),
                        source,
                    });
            }
            if started.elapsed() >= self.timeout {
                // Best effort: the process may have exited between the poll
                // and the kill.
                let _ = child.kill();
                let _ = child.wait();
                return Err(RuntimeError::Timeout {
                    command: command.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        DockerCli::new(DEFAULT_TIMEOUT)
    }
}

/// Map a failed `docker` invocation to the error variant callers dispatch on.
fn classify_failure(resource: &str, command: &str, stderr: String) -> RuntimeError {
    let resource = resource.to_string();
    let lower = stderr.to_lowercase();
    if lower.contains("no such") || lower.contains("not found") {
        RuntimeError::NotFound { resource }
    } else if lower.contains("already in use")
        || lower.contains("already exists")
        || lower.contains("pool overlaps")
    {
        RuntimeError::Conflict {
            resource,
            detail: stderr,
        }
    } else {
        RuntimeError::CommandFailed {
            command: command.to_string(),
            stderr,
        }
    }
}

impl ContainerRuntime for DockerCli {
    fn create_network(
        &self,
        name: &str,
        subnet_cidr: &str,
        internal: bool,
    ) -> Result<NetworkHandle, RuntimeError> {
        let mut args = vec!["network", "create", "--driver", "bridge"];
        if internal {
            args.push("--internal");
        }
        args.extend(["--subnet", subnet_cidr, name]);
        self.run(name, &args)?;
        Ok(NetworkHandle {
            name: name.to_string(),
        })
    }

    fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.run(name, &["network", "rm", name])?;
        Ok(())
    }

    fn create_container(
        &self,
        image: &str,
        name: &str,
        bind_mount: &Path,
        working_dir: &Path,
        hostname: &str,
    ) -> Result<ContainerHandle, RuntimeError> {
        let volume = format!("{}:{}:rw", bind_mount.display(), bind_mount.display());
        let workdir = working_dir.display().to_string();
        self.run(name, &[
            "create",
            "--interactive",
            "--tty",
            "--volume",
            volume.as_str(),
            "--workdir",
            workdir.as_str(),
            "--hostname",
            hostname,
            "--name",
            name,
            image,
            "/bin/bash",
        ])?;
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
        let ip = ip.to_string();
        let mut args = vec!["network", "connect", "--ip", ip.as_str()];
        for alias in aliases {
            args.extend(["--alias", *alias]);
        }
        args.extend([network.name.as_str(), container.name.as_str()]);
        self.run(&container.name, &args)?;
        Ok(())
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        if force {
            self.run(name, &["rm", "--force", name])?;
        } else {
            self.run(name, &["rm", name])?;
        }
        Ok(())
    }

    fn get_container(&self, name: &str) -> Result<ContainerHandle, RuntimeError> {
        self.run(name, &["container", "inspect", name])?;
        Ok(ContainerHandle {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let error = classify_failure(
            "alice",
            "docker container inspect alice",
            "Error: No such container: alice".to_string(),
        );
        assert!(matches!(
            error,
            RuntimeError::NotFound { resource } if resource == "alice"
        ));
    }

    #[test]
    fn test_classify_subnet_conflict() {
        let error = classify_failure(
            "user_network",
            "docker network create user_network",
            "Error response from daemon: Pool overlaps with other one on this address space"
                .to_string(),
        );
        assert!(matches!(error, RuntimeError::Conflict { .. }));
    }

    #[test]
    fn test_classify_name_conflict() {
        let error = classify_failure(
            "user_a",
            "docker create",
            "Error: the container name \"/user_a\" is already in use".to_string(),
        );
        assert!(matches!(error, RuntimeError::Conflict { .. }));
    }

    #[test]
    fn test_classify_other_failure() {
        let error = classify_failure(
            "user_network",
            "docker network rm user_network",
            "Cannot connect to the Docker daemon".to_string(),
        );
        assert!(matches!(error, RuntimeError::CommandFailed { .. }));
    }
}
