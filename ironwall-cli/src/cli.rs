//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ironwall -- rule-chain packet classification engine.
///
/// Use `ironwall <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironwall", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironwall.toml configuration file.
    #[arg(short, long, default_value = "ironwall.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate one packet against a ruleset.
    Eval(EvalArgs),

    /// Build a ruleset and run commit-time validation.
    Check(CheckArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- eval ----

/// Evaluate a hex-encoded packet starting at a base chain.
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Ruleset file (TOML).
    #[arg(short, long)]
    pub ruleset: PathBuf,

    /// Base chain to start from.
    #[arg(long, default_value = "input")]
    pub chain: String,

    /// Packet bytes as hex, starting at the network header unless
    /// `--network-offset` says otherwise.
    #[arg(short, long)]
    pub packet: String,

    /// Offset of the network header in the packet buffer.
    #[arg(long)]
    pub network_offset: Option<usize>,

    /// Offset of the transport header (default: derived from the IPv4 IHL).
    #[arg(long)]
    pub transport_offset: Option<usize>,

    /// Network namespace the packet belongs to.
    #[arg(long, default_value_t = 0)]
    pub namespace: u32,

    /// Mark the packet for rule tracing and print the trace events.
    #[arg(short, long)]
    pub trace: bool,
}

// ---- check ----

/// Validate a ruleset file without evaluating packets.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Ruleset file (TOML).
    #[arg(short, long)]
    pub ruleset: PathBuf,
}

// ---- config ----

/// Manage ironwall configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, engine).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_eval_defaults() {
        let args = Cli::try_parse_from(["ironwall", "eval", "-r", "filter.toml", "-p", "4500"]);
        assert!(args.is_ok(), "should parse 'eval' subcommand");
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Eval(eval_args) => {
                assert_eq!(eval_args.ruleset, PathBuf::from("filter.toml"));
                assert_eq!(eval_args.chain, "input");
                assert_eq!(eval_args.packet, "4500");
                assert!(eval_args.network_offset.is_none());
                assert!(eval_args.transport_offset.is_none());
                assert_eq!(eval_args.namespace, 0);
                assert!(!eval_args.trace, "trace should default to false");
            }
            _ => panic!("expected Eval command"),
        }
    }

    #[test]
    fn test_cli_parse_eval_all_options() {
        let args = Cli::try_parse_from([
            "ironwall",
            "eval",
            "--ruleset",
            "r.toml",
            "--chain",
            "forward",
            "--packet",
            "00",
            "--network-offset",
            "14",
            "--transport-offset",
            "34",
            "--namespace",
            "7",
            "--trace",
        ]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Eval(eval_args) => {
                assert_eq!(eval_args.chain, "forward");
                assert_eq!(eval_args.network_offset, Some(14));
                assert_eq!(eval_args.transport_offset, Some(34));
                assert_eq!(eval_args.namespace, 7);
                assert!(eval_args.trace);
            }
            _ => panic!("expected Eval command"),
        }
    }

    #[test]
    fn test_cli_parse_eval_requires_packet() {
        let args = Cli::try_parse_from(["ironwall", "eval", "-r", "filter.toml"]);
        assert!(args.is_err(), "eval without --packet should fail");
    }

    #[test]
    fn test_cli_parse_check() {
        let args = Cli::try_parse_from(["ironwall", "check", "--ruleset", "filter.toml"]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Check(check_args) => {
                assert_eq!(check_args.ruleset, PathBuf::from("filter.toml"));
            }
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn test_cli_parse_config_validate() {
        let args = Cli::try_parse_from(["ironwall", "config", "validate"]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Validate => {}
                _ => panic!("expected Validate action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let args = Cli::try_parse_from(["ironwall", "config", "show", "--section", "engine"]);
        let cli = args.expect("parse succeeded");
        match cli.command {
            Commands::Config(config_args) => match config_args.action {
                ConfigAction::Show { section } => {
                    assert_eq!(section, Some("engine".to_owned()));
                }
                _ => panic!("expected Show action"),
            },
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn test_cli_parse_global_options() {
        let args = Cli::try_parse_from([
            "ironwall",
            "-c",
            "/etc/ironwall.toml",
            "check",
            "-r",
            "x.toml",
            "--log-level",
            "debug",
            "--output",
            "json",
        ]);
        let cli = args.expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/etc/ironwall.toml"));
        assert_eq!(cli.log_level, Some("debug".to_owned()));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_invalid_command_fails() {
        let args = Cli::try_parse_from(["ironwall", "invalid-command"]);
        assert!(args.is_err(), "should fail on invalid command");
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "ironwall");

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        assert!(subcommands.contains(&"eval"), "should have 'eval' subcommand");
        assert!(subcommands.contains(&"check"), "should have 'check' subcommand");
        assert!(subcommands.contains(&"config"), "should have 'config' subcommand");
    }
}
