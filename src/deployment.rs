//! Preview deployments: namespace discovery and URL derivation.

use reqwest::Url;
use serde::Deserialize;

use crate::error::RduError;

const DEPLOYMENT_DOMAIN: &str = "dev.renku.ch";

/// Repositories with CI preview deployments, and the namespace prefix each
/// pull request is deployed under.
const NAMESPACE_PREFIXES: &[(&str, &str)] = &[
    ("SwissDataScienceCenter/amalthea", "renku-ci-am-"),
    ("SwissDataScienceCenter/renku", "ci-renku-"),
    ("SwissDataScienceCenter/renku-data-services", "renku-ci-ds-"),
    ("SwissDataScienceCenter/renku-ui", "renku-ci-ui-"),
];

/// `https://<namespace>.dev.renku.ch`
pub fn deployment_url(namespace: &str) -> Result<Url, RduError> {
    let namespace = namespace.trim();
    if namespace.is_empty() {
        return Err(RduError::Configuration("namespace must not be empty".to_string()));
    }
    let raw = format!("https://{namespace}.{DEPLOYMENT_DOMAIN}");
    Url::parse(&raw)
        .map_err(|e| RduError::Configuration(format!("invalid namespace '{namespace}': {e}")))
}

/// Namespace of the preview deployment for pull request `pr` of `repo`.
pub fn derive_namespace(repo: &str, pr: u64) -> Result<String, RduError> {
    NAMESPACE_PREFIXES
        .iter()
        .find(|(known, _)| *known == repo)
        .map(|(_, prefix)| format!("{prefix}{pr}"))
        .ok_or_else(|| {
            RduError::Configuration(format!(
                "could not derive namespace from repository: {repo}"
            ))
        })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoView {
    name_with_owner: String,
}

#[derive(Debug, Deserialize)]
struct PrView {
    number: u64,
}

/// Thin wrapper around the GitHub CLI, run in the current directory.
#[derive(Debug, Clone)]
pub struct GitHubCli {
    program: String,
    leading_args: Vec<String>,
}

impl Default for GitHubCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubCli {
    pub fn new() -> Self {
        Self::with_command("gh", Vec::<String>::new())
    }

    /// Run `program leading_args.. <subcommand>` instead of plain `gh`.
    pub fn with_command(
        program: impl Into<String>,
        leading_args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>, RduError> {
        tracing::debug!(program = %self.program, ?args, "running");
        let output = tokio::process::Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.failure(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(self.failure(message));
        }
        Ok(output.stdout)
    }

    fn failure(&self, message: String) -> RduError {
        RduError::Command {
            program: self.program.clone(),
            message,
        }
    }

    /// `owner/name` of the repository checked out here.
    pub async fn current_repository(&self) -> Result<String, RduError> {
        let out = self.run(&["repo", "view", "--json", "nameWithOwner"]).await?;
        let view: RepoView = serde_json::from_slice(&out)?;
        Ok(view.name_with_owner)
    }

    /// Number of the pull request for the current branch.
    pub async fn current_pull_request(&self) -> Result<u64, RduError> {
        let out = self.run(&["pr", "view", "--json", "number"]).await?;
        let view: PrView = serde_json::from_slice(&out)?;
        Ok(view.number)
    }
}

/// Namespace of the preview deployment for the checked-out pull request.
pub async fn find_current_namespace(gh: &GitHubCli) -> Result<String, RduError> {
    let repo = gh.current_repository().await?;
    eprintln!("Repository: {repo}");
    let pr = gh.current_pull_request().await?;
    eprintln!("Pull request: {pr}");
    let namespace = derive_namespace(&repo, pr)?;
    eprintln!("Derived namespace: {namespace}");
    Ok(namespace)
}

/// Pick the deployment URL: explicit URL, else namespace, else the GitHub CLI.
pub async fn resolve_base_url(
    url: Option<&str>,
    namespace: Option<&str>,
    gh: &GitHubCli,
) -> Result<String, RduError> {
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        return Ok(url.trim().to_string());
    }
    let namespace = match namespace.filter(|n| !n.trim().is_empty()) {
        Some(namespace) => namespace.to_string(),
        None => find_current_namespace(gh).await?,
    };
    Ok(deployment_url(&namespace)?.to_string())
}
