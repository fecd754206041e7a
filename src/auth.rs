use anyhow::{anyhow, Context, Result};
use std::env;
use std::process::Command;
use tracing::debug;

/// Where the access token came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// `--token` flag or config file
    Explicit,
    /// `git config github.token`
    GitConfig,
    /// `GITHUB_TOKEN` environment variable
    EnvironmentToken,
    /// No token, requests are anonymous
    Anonymous,
}

/// Find an access token: explicit value, then git config, then environment.
///
/// A missing token is not an error, public repositories can still be audited
/// with the anonymous rate limit.
pub fn discover_token(explicit: Option<&str>) -> (TokenSource, Option<String>) {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return (TokenSource::Explicit, Some(token.to_string()));
    }

    match try_git_config() {
        Ok(token) => return (TokenSource::GitConfig, Some(token)),
        Err(e) => debug!("No token in git config: {}", e),
    }

    match try_environment_token() {
        Ok(token) => (TokenSource::EnvironmentToken, Some(token)),
        Err(e) => {
            debug!("No token in environment: {}", e);
            (TokenSource::Anonymous, None)
        }
    }
}

/// Try to get token from `git config github.token`
fn try_git_config() -> Result<String> {
    debug!("Attempting git config authentication");

    let output = Command::new("git")
        .args(["config", "github.token"])
        .output()
        .context("Failed to run git config")?;

    if !output.status.success() {
        return Err(anyhow!("github.token is not set in git config"));
    }

    let token = String::from_utf8(output.stdout)
        .context("git config token is not valid UTF-8")?
        .trim()
        .to_string();

    if token.is_empty() {
        return Err(anyhow!("git config returned empty token"));
    }

    Ok(token)
}

/// Try to get token from environment variable
fn try_environment_token() -> Result<String> {
    debug!("Attempting environment variable authentication");

    let token = env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable not set")?;

    if token.trim().is_empty() {
        return Err(anyhow!("GITHUB_TOKEN is empty"));
    }

    Ok(token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_explicit_token_wins() {
        let (source, token) = discover_token(Some(" abc123 "));
        assert_eq!(source, TokenSource::Explicit);
        assert_eq!(token.as_deref(), Some("abc123"));
    }

    #[test]
    #[serial]
    fn test_environment_token() {
        let original = env::var("GITHUB_TOKEN").ok();
        env::set_var("GITHUB_TOKEN", "ghp_from_env");

        assert_eq!(try_environment_token().unwrap(), "ghp_from_env");

        env::set_var("GITHUB_TOKEN", "   ");
        assert!(try_environment_token().is_err());

        match original {
            Some(value) => env::set_var("GITHUB_TOKEN", value),
            None => env::remove_var("GITHUB_TOKEN"),
        }
    }

    #[test]
    #[serial]
    fn test_blank_explicit_token_falls_through() {
        let (source, _) = discover_token(Some(""));
        assert_ne!(source, TokenSource::Explicit);
    }
}
