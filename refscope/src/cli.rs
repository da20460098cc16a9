//! # CLI
//!
//! This module defines the command-line interface of `refscope` using `clap`.
//!
//! Commands that take an optional leading `CHAIN_ID` before a required name collect both into one
//! positional list; [`split_chain_id`] tells them apart.
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "refscope",
    version,
    about = "Inspect gRPC servers through their reflection service"
)]
pub struct Cli {
    /// Path to the chain registry file
    #[arg(long, global = true, env = "REFSCOPE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `refscope_core=trace`
    #[arg(long, global = true, env = "REFSCOPE_LOG", default_value = "warn")]
    pub log_level: String,

    /// Seconds allowed to establish the connection (0 disables the limit)
    #[arg(long, global = true, default_value_t = 10, value_name = "SECS")]
    pub connect_timeout: u64,

    /// Seconds allowed for each reflection round trip (0 disables the limit)
    #[arg(long, global = true, default_value_t = 30, value_name = "SECS")]
    pub request_timeout: u64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Query a gRPC server through its reflection service
    #[command(alias = "dyn")]
    Dynamic {
        #[command(subcommand)]
        sub: DynamicCommands,
    },

    /// Manage the chain registry
    Chains {
        #[command(subcommand)]
        sub: ChainsCommands,
    },
}

/// How to reach the server when no chain id is given.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// gRPC address to dial instead of a chain's configured address
    #[arg(long)]
    pub address: Option<String>,

    /// Connect without TLS
    #[arg(long)]
    pub insecure: bool,
}

#[derive(Subcommand)]
pub enum DynamicCommands {
    /// List remote gRPC services
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// refscope dynamic list-services cosmoshub
    /// refscope dynamic list-services --address example.com:9090
    /// ```
    #[command(alias = "ls")]
    ListServices {
        chain_id: Option<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// List the methods of a remote gRPC service
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// refscope dynamic list-methods cosmoshub cosmos.staking.v1beta1.Query
    /// refscope dynamic list-methods cosmos.staking.v1beta1.Query --address example.com:9090
    /// ```
    #[command(alias = "lm")]
    ListMethods {
        #[arg(value_name = "[CHAIN_ID] SERVICE", num_args = 1..=2, required = true)]
        args: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show the top level fields of a method's request and response as JSON
    ///
    /// ## Examples:
    ///
    /// ```bash
    /// refscope dynamic show-messages cosmoshub cosmos.bank.v1beta1.Query.Balance
    /// refscope dynamic show-messages cosmos.bank.v1beta1.Query.Balance --address example.com:9090
    /// ```
    #[command(alias = "sm")]
    ShowMessages {
        #[arg(value_name = "[CHAIN_ID] QUALIFIED_METHOD", num_args = 1..=2, required = true)]
        args: Vec<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print the canonical definitions of services, methods and the types they use
    #[command(alias = "i")]
    Inspect {
        chain_id: Option<String>,

        /// Name of gRPC service to inspect
        #[arg(long)]
        service: Option<String>,

        /// Name of method within gRPC service to inspect
        #[arg(long, requires = "service")]
        method: Option<String>,

        #[command(flatten)]
        target: TargetArgs,
    },
}

#[derive(Subcommand)]
pub enum ChainsCommands {
    /// List configured chains and their gRPC addresses
    List,

    /// Show the configuration of one chain
    Show { chain_id: String },

    /// Set a configuration field of a chain, adding the chain if needed
    Edit {
        chain_id: String,
        field: ChainField,
        value: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainField {
    GrpcAddr,
}

/// Splits `[CHAIN_ID] NAME` into its optional chain id and the name.
pub fn split_chain_id(args: &[String]) -> (Option<&str>, &str) {
    match args {
        [chain_id, name] => (Some(chain_id.as_str()), name.as_str()),
        [name] => (None, name.as_str()),
        _ => (None, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_split_chain_id() {
        let one = vec!["pkg.Alpha".to_string()];
        let two = vec!["cosmoshub".to_string(), "pkg.Alpha".to_string()];

        assert_eq!(split_chain_id(&one), (None, "pkg.Alpha"));
        assert_eq!(split_chain_id(&two), (Some("cosmoshub"), "pkg.Alpha"));
    }

    #[test]
    fn test_aliases_and_positionals() {
        let cli = Cli::try_parse_from([
            "refscope",
            "dyn",
            "lm",
            "cosmoshub",
            "pkg.Alpha",
            "--insecure",
        ])
        .unwrap();

        match cli.command {
            Commands::Dynamic {
                sub: DynamicCommands::ListMethods { args, target },
            } => {
                assert_eq!(args, vec!["cosmoshub", "pkg.Alpha"]);
                assert!(target.insecure);
                assert_eq!(target.address, None);
            }
            _ => panic!("Expected dynamic list-methods"),
        }
    }

    #[test]
    fn test_chains_edit_field() {
        let cli = Cli::try_parse_from([
            "refscope",
            "chains",
            "edit",
            "cosmoshub",
            "grpc-addr",
            "localhost:9090",
        ])
        .unwrap();

        match cli.command {
            Commands::Chains {
                sub:
                    ChainsCommands::Edit {
                        chain_id,
                        field,
                        value,
                    },
            } => {
                assert_eq!(chain_id, "cosmoshub");
                assert_eq!(field, ChainField::GrpcAddr);
                assert_eq!(value, "localhost:9090");
            }
            _ => panic!("Expected chains edit"),
        }
    }

    #[test]
    fn test_global_defaults() {
        let cli = Cli::try_parse_from(["refscope", "chains", "list"]).unwrap();

        assert_eq!(cli.connect_timeout, 10);
        assert_eq!(cli.request_timeout, 30);
    }
}
