//! Handlers for `login`, `logout`, `whoami` and `token`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{LogoutArgs, TargetArgs};
use crate::api::{DeploymentClient, SelfUserInfo};
use crate::auth::{self, AuthManager, LoginOutcome};
use crate::config::RduConfig;
use crate::deployment::GitHubCli;
use crate::error::RduError;

async fn manager_for(config: &RduConfig, target: &TargetArgs) -> Result<Arc<AuthManager>, RduError> {
    let base_url = target.base_url(config, &GitHubCli::new()).await?;
    eprintln!("Renku URL: {base_url}");

    let auth_config = config.auth_config(&base_url)?;
    Ok(Arc::new(AuthManager::new(auth_config, config.credential_store())?))
}

fn print_user(user: &SelfUserInfo) {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    println!("Logged in as:");
    println!("  username: {}", user.username);
    println!("  email: {}", or_dash(&user.email));
    println!("  first name: {}", or_dash(&user.first_name));
    println!("  last name: {}", or_dash(&user.last_name));
    println!("  is admin: {}", user.is_admin);
}

/// Handle `rdu login`.
pub async fn handle_login(
    config: &RduConfig,
    target: &TargetArgs,
    cancel: &CancellationToken,
) -> Result<(), RduError> {
    let client = DeploymentClient::new(manager_for(config, target).await?)?;
    if client.auth().login(cancel).await? == LoginOutcome::AlreadyLoggedIn {
        eprintln!("Already logged in.");
    }
    let user = client.users().get_user(cancel).await?;
    print_user(&user);
    Ok(())
}

/// Handle `rdu logout [--all]`.
pub async fn handle_logout(config: &RduConfig, args: &LogoutArgs) -> Result<(), RduError> {
    if args.all {
        auth::logout_all(config.credential_store().as_ref())?;
        println!("Removed all saved logins.");
        return Ok(());
    }
    let manager = manager_for(config, &args.target).await?;
    manager.logout().await?;
    println!("Logged out.");
    Ok(())
}

/// Handle `rdu whoami`.
pub async fn handle_whoami(
    config: &RduConfig,
    target: &TargetArgs,
    cancel: &CancellationToken,
) -> Result<(), RduError> {
    let client = DeploymentClient::new(manager_for(config, target).await?)?;
    let user = client.users().get_user(cancel).await?;
    print_user(&user);
    Ok(())
}

/// Handle `rdu token`.
pub async fn handle_token(
    config: &RduConfig,
    target: &TargetArgs,
    cancel: &CancellationToken,
) -> Result<(), RduError> {
    let manager = manager_for(config, target).await?;
    let token = manager.get_access_token(cancel).await?;
    println!("{token}");
    Ok(())
}
