//! Handlers for `namespace` and `open`.

use super::TargetArgs;
use crate::auth::BrowserLauncher;
use crate::config::RduConfig;
use crate::deployment::{find_current_namespace, GitHubCli};
use crate::error::RduError;

/// Handle `rdu namespace`. Always derived from the checked-out pull request.
pub async fn handle_namespace(gh: &GitHubCli) -> Result<String, RduError> {
    let namespace = find_current_namespace(gh).await?;
    println!("{namespace}");
    Ok(namespace)
}

/// Handle `rdu open`. Returns the URL handed to the browser.
pub async fn handle_open(
    config: &RduConfig,
    target: &TargetArgs,
    gh: &GitHubCli,
    browser: &dyn BrowserLauncher,
) -> Result<String, RduError> {
    let url = target.base_url(config, gh).await?;
    println!("Open URL: {url}");
    browser.open(&url)?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{NoBrowser, RecordingBrowser};

    fn no_github() -> GitHubCli {
        GitHubCli::with_command("false", Vec::<String>::new())
    }

    #[tokio::test]
    async fn open_sends_deployment_url_to_browser() {
        let browser = RecordingBrowser::new();
        let target = TargetArgs {
            url: None,
            namespace: Some("renku-ci-ui-3".to_string()),
        };
        let url = handle_open(&RduConfig::default(), &target, &no_github(), &browser)
            .await
            .unwrap();
        assert_eq!(url, "https://renku-ci-ui-3.dev.renku.ch/");
        assert_eq!(browser.opened(), vec![url]);
    }

    #[tokio::test]
    async fn open_reports_browser_failure() {
        let target = TargetArgs {
            url: Some("https://x.example".to_string()),
            namespace: None,
        };
        let err = handle_open(&RduConfig::default(), &target, &no_github(), &NoBrowser)
            .await
            .unwrap_err();
        assert!(matches!(err, RduError::Io(_)), "{err:?}");
    }

    #[tokio::test]
    async fn open_without_target_needs_github() {
        let browser = RecordingBrowser::new();
        let err = handle_open(&RduConfig::default(), &TargetArgs::default(), &no_github(), &browser)
            .await
            .unwrap_err();
        assert!(matches!(err, RduError::Command { .. }), "{err:?}");
        assert!(browser.opened().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn namespace_comes_from_pull_request() {
        let script = r#"case "$1" in
  repo) echo '{"nameWithOwner":"SwissDataScienceCenter/renku"}' ;;
  pr) echo '{"number":88}' ;;
  *) exit 2 ;;
esac"#;
        let gh = GitHubCli::with_command("sh", ["-c", script, "gh"]);
        assert_eq!(handle_namespace(&gh).await.unwrap(), "ci-renku-88");
    }
}
