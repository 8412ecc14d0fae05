//! rdu binary entry point.

use clap::Parser;
use rdu::auth::SystemBrowser;
use rdu::cli::{auth, deployment, Cli, Commands};
use rdu::config::RduConfig;
use rdu::deployment::GitHubCli;
use rdu::error::RduError;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter: tracing_subscriber::EnvFilter = if cli.verbose {
        "rdu=debug".into()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        if e.requires_login() {
            eprintln!("Run `rdu login` to log in.");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RduError> {
    let mut config = RduConfig::load()?;
    if let Some(backend) = cli.credential_backend {
        config.credential_backend = backend;
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Login(target) => auth::handle_login(&config, &target, &cancel).await,
        Commands::Logout(args) => auth::handle_logout(&config, &args).await,
        Commands::Whoami(target) => auth::handle_whoami(&config, &target, &cancel).await,
        Commands::Token(target) => auth::handle_token(&config, &target, &cancel).await,
        Commands::Namespace => deployment::handle_namespace(&GitHubCli::new())
            .await
            .map(|_| ()),
        Commands::Open(target) => {
            deployment::handle_open(&config, &target, &GitHubCli::new(), &SystemBrowser)
                .await
                .map(|_| ())
        }
    }
}
