//! Command-line surface of rdu.

pub mod auth;
pub mod deployment;

use clap::{Parser, Subcommand};

use crate::config::{CredentialBackend, RduConfig};
use crate::deployment::{resolve_base_url, GitHubCli};
use crate::error::RduError;

/// Developer utilities for Renku preview deployments
#[derive(Parser, Debug)]
#[command(name = "rdu", version, about = "Developer utilities for Renku preview deployments")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Where tokens are stored (keyring, file)
    #[arg(long, global = true, value_name = "BACKEND")]
    pub credential_backend: Option<CredentialBackend>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in to a Renku deployment
    Login(TargetArgs),
    /// Log out of a Renku deployment
    Logout(LogoutArgs),
    /// Show the logged-in user
    Whoami(TargetArgs),
    /// Print a valid access token
    Token(TargetArgs),
    /// Print the Kubernetes namespace of the current deployment
    #[command(visible_alias = "ns")]
    Namespace,
    /// Open a Renku deployment in the browser
    Open(TargetArgs),
}

/// Which deployment a command talks to.
///
/// Without `--url` or `--namespace` the namespace is derived from the pull
/// request checked out in the current directory.
#[derive(Parser, Debug, Default, Clone)]
pub struct TargetArgs {
    /// Instance URL
    #[arg(long)]
    pub url: Option<String>,

    /// Kubernetes namespace of the deployment
    #[arg(short, long)]
    pub namespace: Option<String>,
}

impl TargetArgs {
    /// Deployment URL from the flags, then the config file, then `gh`.
    pub async fn base_url(&self, config: &RduConfig, gh: &GitHubCli) -> Result<String, RduError> {
        let url = self.url.as_deref().or(config.url.as_deref());
        let namespace = self.namespace.as_deref().or(config.namespace.as_deref());
        resolve_base_url(url, namespace, gh).await
    }
}

/// Arguments for `rdu logout`.
#[derive(Parser, Debug)]
pub struct LogoutArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Remove all saved logins
    #[arg(long)]
    pub all: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_login_with_namespace() {
        let cli = Cli::try_parse_from(["rdu", "login", "-n", "ci-renku-42"]).unwrap();
        match cli.command {
            Commands::Login(target) => {
                assert_eq!(target.namespace.as_deref(), Some("ci-renku-42"));
                assert!(target.url.is_none());
            }
            other => panic!("expected Login, got {other:?}"),
        }
        assert!(!cli.verbose);
        assert!(cli.credential_backend.is_none());
    }

    #[test]
    fn parse_logout_all() {
        let cli = Cli::try_parse_from(["rdu", "logout", "--all"]).unwrap();
        match cli.command {
            Commands::Logout(args) => {
                assert!(args.all);
                assert!(args.target.url.is_none());
            }
            other => panic!("expected Logout, got {other:?}"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rdu",
            "token",
            "--url",
            "https://x.example",
            "-v",
            "--credential-backend",
            "file",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.credential_backend, Some(CredentialBackend::File));
        match cli.command {
            Commands::Token(target) => assert_eq!(target.url.as_deref(), Some("https://x.example")),
            other => panic!("expected Token, got {other:?}"),
        }
    }

    #[test]
    fn parse_whoami() {
        let cli = Cli::try_parse_from(["rdu", "whoami"]).unwrap();
        assert!(matches!(cli.command, Commands::Whoami(_)));
    }

    #[test]
    fn parse_namespace_and_alias() {
        let cli = Cli::try_parse_from(["rdu", "namespace"]).unwrap();
        assert!(matches!(cli.command, Commands::Namespace));
        let cli = Cli::try_parse_from(["rdu", "ns"]).unwrap();
        assert!(matches!(cli.command, Commands::Namespace));
        assert!(Cli::try_parse_from(["rdu", "namespace", "-n", "x"]).is_err());
    }

    #[test]
    fn parse_open_with_namespace() {
        let cli = Cli::try_parse_from(["rdu", "open", "-n", "renku-ci-ui-3"]).unwrap();
        match cli.command {
            Commands::Open(target) => {
                assert_eq!(target.namespace.as_deref(), Some("renku-ci-ui-3"));
                assert!(target.url.is_none());
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn target_flags_override_config() {
        let gh = GitHubCli::with_command("false", Vec::<String>::new());
        let config = RduConfig {
            namespace: Some("ci-renku-1".to_string()),
            ..RduConfig::default()
        };
        let from_config = TargetArgs::default().base_url(&config, &gh).await.unwrap();
        assert_eq!(from_config, "https://ci-renku-1.dev.renku.ch/");

        let flagged = TargetArgs {
            url: None,
            namespace: Some("ci-renku-2".to_string()),
        };
        assert_eq!(
            flagged.base_url(&config, &gh).await.unwrap(),
            "https://ci-renku-2.dev.renku.ch/"
        );
    }

    #[test]
    fn unknown_backend_is_error() {
        assert!(Cli::try_parse_from(["rdu", "token", "--credential-backend", "vault"]).is_err());
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["rdu"]).is_err());
    }
}
