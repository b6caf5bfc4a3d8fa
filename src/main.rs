use anyhow::Result;
use clap::Parser;
use k3s_provision::cli::{self, Commands};
use k3s_provision::commands;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Only use colors when outputting to a TTY (not when piped to file)
    let use_color = atty::is(atty::Stream::Stdout);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_ansi(use_color)
        .init();

    let result = match cli.cmd {
        None => commands::cmd_provision(cli.run).await.map(|_| ()),
        Some(Commands::Detect(args)) => commands::cmd_detect(args).await,
        Some(Commands::Status(args)) => commands::cmd_status(args).await,
        Some(Commands::Preflight) => commands::cmd_preflight().await,
        Some(Commands::InitConfig(args)) => commands::cmd_init_config(args),
        Some(Commands::Completions(args)) => {
            commands::cmd_completions(args);
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}
