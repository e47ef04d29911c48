use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    #[command(flatten)]
    pub global_args: GlobalArgs,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// fail every provider call still running this many seconds after start
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    /// enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose_logging: bool,
    /// enable trace output (more detailed than verbose, overrides it if present)
    #[arg(long = "trace", global = true)]
    pub trace_logging: bool,
}

impl GlobalArgs {
    pub fn get_log_level(&self) -> LogLevel {
        if self.trace_logging {
            return LogLevel::Trace;
        }

        if self.verbose_logging {
            return LogLevel::Verbose;
        }

        LogLevel::Normal
    }
}

pub enum LogLevel {
    Normal,
    Verbose,
    Trace,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// create or update the cluster network and the machine interfaces
    #[command(alias = "r")]
    Reconcile(ApplyArgs),
    /// delete the machine interfaces and the cluster network
    #[command(alias = "d")]
    Delete(ApplyArgs),
    /// print the deterministic names derived for the cluster
    #[command(alias = "n")]
    Names(NamesArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// only names, one per line
    Names,
    /// table without headers
    Table,
    /// table with headers
    #[default]
    TableWithHeaders,
    /// compact JSON
    Json,
    /// pretty-printed JSON
    JsonPretty,
    /// YAML
    Yaml,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// cluster description (YAML)
    #[arg(short = 'f', long = "file")]
    pub config: PathBuf,
    /// provider state and allocated names, read before and written after the run
    #[arg(long)]
    pub state: Option<PathBuf>,
    /// output format of the recorded provider mutations
    #[arg(short = 'o', long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct NamesArgs {
    /// cluster description (YAML)
    #[arg(short = 'f', long = "file")]
    pub config: PathBuf,
    /// output format
    #[arg(short = 'o', long, value_enum, default_value_t)]
    pub output: OutputFormat,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Commands, OutputFormat};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn reconcile_arguments_parse() {
        let cli = Cli::try_parse_from([
            "netsubstrate",
            "reconcile",
            "-f",
            "demo.yaml",
            "--state",
            "state.yaml",
            "-o",
            "json",
            "--timeout",
            "30",
        ])
        .unwrap();

        let Commands::Reconcile(args) = cli.command else {
            panic!("expected the reconcile command");
        };

        assert_eq!(args.config.to_str(), Some("demo.yaml"));
        assert!(args.state.is_some());
        assert!(matches!(args.output, OutputFormat::Json));
        assert_eq!(cli.global_args.timeout, Some(30));
    }
}
