//! # Refscope CLI Entry Point
//!
//! The main executable for refscope. This file drives the application lifecycle:
//!
//! 1. **Initialization**: Parses command-line arguments using [`cli::Cli`] and installs the
//!    `tracing` subscriber (stderr, filtered by `--log-level`).
//! 2. **Target**: Resolves the chain id or `--address` into a single server, before any dial.
//! 3. **Execution**: Opens a [`ReflectionSession`] and runs the requested inspection from
//!    `refscope_core::inspect`, racing it against Ctrl-C.
//! 4. **Presentation**: Writes results to stdout and errors to stderr, then sets the exit code
//!    (`1` on failure, `130` when cancelled).
mod cli;
mod config;
mod formatter;

use anyhow::Result;
use clap::Parser;
use cli::{ChainField, ChainsCommands, Cli, Commands, DynamicCommands, TargetArgs};
use config::{Config, ConfigManager};
use formatter::{Cancelled, FormattedString};
use refscope_core::{
    error::ChainNotFoundError,
    inspect,
    resolver::{QualifiedMethod, ServiceResolver},
    session::{ReflectionSession, SessionOptions},
    target::{ChainRegistry, TransportSecurity, resolve_target},
};
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(&args.log_level);

    let outcome = tokio::select! {
        result = run(args) => result,
        Ok(()) = tokio::signal::ctrl_c() => Err(Cancelled.into()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", FormattedString::from(&err));

            if err.is::<Cancelled>() {
                ExitCode::from(130)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(args: Cli) -> Result<()> {
    let manager = ConfigManager::new(args.config)?;

    let options = SessionOptions {
        connect_timeout: seconds(args.connect_timeout),
        request_timeout: seconds(args.request_timeout),
        ..SessionOptions::default()
    };

    match args.command {
        Commands::Dynamic { sub } => dynamic(sub, &manager.load()?, &options).await,
        Commands::Chains { sub } => chains(sub, &manager),
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

async fn dynamic(
    command: DynamicCommands,
    registry: &Config,
    options: &SessionOptions,
) -> Result<()> {
    let mut stdout = std::io::stdout();

    match command {
        DynamicCommands::ListServices { chain_id, target } => {
            let mut session = connect(chain_id.as_deref(), &target, registry, options).await?;
            let mut resolver = ServiceResolver::new(&mut session, options);

            tracing::debug!("Listing remote services");
            inspect::list_services(&mut resolver, &mut stdout).await?;
        }
        DynamicCommands::ListMethods { args, target } => {
            let (chain_id, service) = cli::split_chain_id(&args);

            let mut session = connect(chain_id, &target, registry, options).await?;
            let mut resolver = ServiceResolver::new(&mut session, options);

            inspect::list_methods(&mut resolver, service, &mut stdout).await?;
        }
        DynamicCommands::ShowMessages { args, target } => {
            let (chain_id, name) = cli::split_chain_id(&args);
            let method: QualifiedMethod = name.parse()?;

            let mut session = connect(chain_id, &target, registry, options).await?;
            let mut resolver = ServiceResolver::new(&mut session, options);

            let shapes = inspect::show_messages(&mut resolver, &method).await?;
            writeln!(stdout, "{}", serde_json::to_string_pretty(&shapes)?)?;
        }
        DynamicCommands::Inspect {
            chain_id,
            service,
            method,
            target,
        } => {
            let mut session = connect(chain_id.as_deref(), &target, registry, options).await?;
            tracing::debug!(address = session.address(), "Inspecting server");

            let mut resolver = ServiceResolver::new(&mut session, options);
            inspect::inspect(
                &mut resolver,
                service.as_deref(),
                method.as_deref(),
                &mut stdout,
            )
            .await?;
        }
    }

    stdout.flush()?;
    Ok(())
}

/// Resolves the target and dials it. Usage errors surface here, before any network traffic.
async fn connect(
    chain_id: Option<&str>,
    target: &TargetArgs,
    registry: &Config,
    options: &SessionOptions,
) -> Result<ReflectionSession> {
    let target = resolve_target(
        chain_id,
        target.address.as_deref(),
        TransportSecurity::from_insecure_flag(target.insecure),
        registry,
    )?;

    Ok(ReflectionSession::open(&target, options).await?)
}

fn chains(command: ChainsCommands, manager: &ConfigManager) -> Result<()> {
    let mut config = manager.load()?;

    match command {
        ChainsCommands::List => {
            for (chain_id, chain) in &config.chains {
                println!("{chain_id}\t{}", chain.grpc_addr);
            }
        }
        ChainsCommands::Show { chain_id } => {
            let chain = config
                .chains
                .get(&chain_id)
                .ok_or_else(|| ChainNotFoundError::new(&chain_id, config.chain_ids()))?;

            println!("{}", serde_json::to_string_pretty(chain)?);
        }
        ChainsCommands::Edit {
            chain_id,
            field,
            value,
        } => {
            let chain = config.chains.entry(chain_id.clone()).or_default();

            match field {
                ChainField::GrpcAddr => chain.grpc_addr = value,
            }

            manager.save(&config)?;
            tracing::debug!(chain_id, path = %manager.path().display(), "Updated chain");
        }
    }

    Ok(())
}
