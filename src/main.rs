use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use env_logger::Env;
use log::info;

use labnet::config;
use labnet::orchestrator::{NetworkOrchestrator, RunContext};
use labnet::runtime::DockerCli;
use labnet::workdir;

/// Deploy an isolated per-user Docker network for testing student
/// assignment submissions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the network specification JSON file
    spec: PathBuf,

    /// Directory where per-container working directories are created
    #[arg(long, default_value = "WORKING_DIRECTORY")]
    working_dir: PathBuf,

    /// Skip the confirmation prompt before removing an existing working
    /// directory
    #[arg(short = 'y', long)]
    yes: bool,

    /// Timeout in seconds for each docker invocation
    #[arg(long, default_value_t = 60)]
    runtime_timeout: u64,
}

/// Ask a yes/no question on stdout; anything other than "y"/"yes" is no.
fn yes_or_no(question: &str) -> Result<bool> {
    print!("{} (y/n) ", question);
    io::stdout().flush().wrap_err("failed to flush stdout")?;
    let mut response = String::new();
    io::stdin()
        .read_line(&mut response)
        .wrap_err("failed to read confirmation")?;
    Ok(matches!(response.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Name of the invoking user, used to namespace every runtime resource.
fn current_username() -> Result<String> {
    env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .map_err(|_| eyre!("cannot determine the current user (USER and LOGNAME are unset)"))
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let spec = config::load_spec(&args.spec)
        .wrap_err_with(|| format!("failed to load specification '{}'", args.spec.display()))?;
    if !spec.solution_directory.is_dir() {
        return Err(eyre!(
            "it looks like '{}' doesn't exist",
            spec.solution_directory.display()
        ));
    }

    let working_dir = if args.working_dir.is_absolute() {
        args.working_dir.clone()
    } else {
        env::current_dir()
            .wrap_err("cannot determine the current directory")?
            .join(&args.working_dir)
    };

    // A safety check so an existing directory the user wants around is never
    // removed without confirmation.
    if working_dir.is_dir() && !args.yes {
        let question = format!(
            "It looks like {} already exists. Is it alright to remove it?",
            working_dir.display()
        );
        if !yes_or_no(&question)? {
            return Err(eyre!("terminating: working directory left untouched"));
        }
    }
    workdir::reset_working_directory(&working_dir).wrap_err_with(|| {
        format!(
            "failed to reset working directory '{}'",
            working_dir.display()
        )
    })?;

    let username = current_username()?;
    info!("Provisioning network for user '{}'", username);

    let context = RunContext::new(username, working_dir);
    let runtime = DockerCli::new(Duration::from_secs(args.runtime_timeout));
    let orchestrator = NetworkOrchestrator::new(runtime, context);
    let report = orchestrator.run(&spec)?;

    info!(
        "Provisioned {} containers on subnet {}",
        report.containers.len(),
        report.subnet.cidr()
    );

    println!("To start your containers, run the following commands:");
    for container in &report.containers {
        println!("docker start -i --attach {}", container);
    }

    Ok(())
}
