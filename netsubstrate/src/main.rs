use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, GlobalArgs, LogLevel};
use commands::{delete::delete, names::names, reconcile::reconcile};
use env_logger::Target;
use log::{warn, LevelFilter};
use netsubstrate_core::call::CallContext;
use tokio_util::sync::CancellationToken;

mod cli;
mod commands;
mod config;
mod output;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    configure_logging(&cli.global_args);

    let call = create_call_context(&cli.global_args);

    match cli.command {
        Commands::Reconcile(args) => reconcile(args, call).await?,
        Commands::Delete(args) => delete(args, call).await?,
        Commands::Names(args) => names(args)?,
    }

    Ok(())
}

/// Ctrl-C cancels every provider call still in flight.
fn create_call_context(global_args: &GlobalArgs) -> CallContext {
    let token = CancellationToken::new();
    let interrupted = token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding calls...");
            interrupted.cancel();
        }
    });

    let call = CallContext::new(token);

    match global_args.timeout {
        Some(seconds) => call.with_timeout(Duration::from_secs(seconds)),
        None => call,
    }
}

fn configure_logging(global_args: &GlobalArgs) {
    let log_level = global_args.get_log_level();
    let mut logger = env_logger::builder();

    logger
        .format_timestamp(None)
        .format_module_path(matches!(log_level, LogLevel::Trace))
        .format_target(false)
        .format_level(!matches!(log_level, LogLevel::Normal))
        .target(Target::Stderr);

    match log_level {
        LogLevel::Normal => {
            logger.filter(Some("netsubstrate"), LevelFilter::Info);
            logger.filter(Some("netsubstrate_core"), LevelFilter::Info);
        }
        LogLevel::Verbose => {
            logger.filter(Some("netsubstrate"), LevelFilter::Debug);
            logger.filter(Some("netsubstrate_core"), LevelFilter::Debug);
        }
        LogLevel::Trace => {
            logger.filter(None, LevelFilter::Trace);
        }
    }

    logger.init();
}
