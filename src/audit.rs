//! Audit runner - applies a check to every repository of an account
//!
//! Repositories are listed once, filtered through the ignore list and then
//! checked concurrently. Each repository gets its own [`Repository`] value, so
//! no cache is shared between concurrent checks. A failing repository is
//! reported and the run moves on.

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::filter::IgnoreList;
use crate::repository::{Repository, RepositorySet, Selector};
use crate::transport::auth_headers;

/// What to look at in each repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// Who committed last on the default branch
    Committer,
    /// Whether the repository ships a gemspec
    Gem,
    /// Whether a file exists on the default branch
    File(String),
}

/// Result of a check on one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Committer(String),
    /// Path of the gemspec, if any
    Gem(Option<String>),
    File { path: String, present: bool },
}

#[derive(Debug, Clone)]
pub enum AuditOutcome {
    Completed { url: String, finding: Finding },
    Failed { url: String, error: String },
}

impl AuditOutcome {
    pub fn url(&self) -> &str {
        match self {
            AuditOutcome::Completed { url, .. } | AuditOutcome::Failed { url, .. } => url,
        }
    }
}

/// Results from a complete audit run
#[derive(Debug, Clone)]
pub struct AuditSummary {
    pub total_repositories: usize,
    pub completed: usize,
    pub failed: usize,
    pub duration: Duration,
    /// One outcome per repository, in listing order
    pub outcomes: Vec<AuditOutcome>,
}

impl AuditSummary {
    fn from_outcomes(outcomes: Vec<AuditOutcome>, duration: Duration) -> Self {
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, AuditOutcome::Failed { .. }))
            .count();

        Self {
            total_repositories: outcomes.len(),
            completed: outcomes.len() - failed,
            failed,
            duration,
            outcomes,
        }
    }
}

pub struct Auditor {
    repositories: RepositorySet,
    selector: Selector,
    token: Option<String>,
    max_pages: Option<u32>,
    ignore: IgnoreList,
    max_parallel: usize,
}

impl Auditor {
    /// Create an auditor; `token` has already been discovered by the caller
    pub fn new(config: &Config, token: Option<String>) -> Result<Self> {
        let transport = config.transport()?;
        auth_headers(token.as_deref()).context("Cannot authenticate with the given token")?;

        Ok(Self {
            repositories: RepositorySet::new(transport, config.hosts()),
            selector: config.selector(),
            token,
            max_pages: config.github.max_pages,
            ignore: IgnoreList::new(&config.audit.ignore, config.audit.ignore_public),
            max_parallel: config.http.max_parallel.max(1),
        })
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// List repositories, minus the ignored ones
    pub async fn repositories(&self) -> Result<Vec<Repository>> {
        let all = self
            .repositories
            .all(&self.selector, self.token.as_deref(), self.max_pages)
            .await
            .with_context(|| format!("Failed to list repositories of {}", self.selector))?;

        let total = all.len();
        let kept = self.ignore.apply(all);
        info!("Auditing {} of {} repositories", kept.len(), total);
        Ok(kept)
    }

    /// Find a single repository by name or web URL
    pub async fn repository(&self, name: &str) -> Result<Repository> {
        self.repositories()
            .await?
            .into_iter()
            .find(|repo| repo.name() == name || repo.url() == name)
            .with_context(|| format!("No repository named {} for {}", name, self.selector))
    }

    /// List repositories and run `check` on each of them
    pub async fn run(&self, check: &Check) -> Result<AuditSummary> {
        let start_time = Instant::now();
        let repositories = self.repositories().await?;
        let outcomes = self.check_all(repositories, check).await;
        let summary = AuditSummary::from_outcomes(outcomes, start_time.elapsed());

        info!(
            "Audit finished: {} completed, {} failed in {:?}",
            summary.completed, summary.failed, summary.duration
        );
        Ok(summary)
    }

    /// Run `check` on each repository, at most `max_parallel` at a time
    pub async fn check_all(
        &self,
        repositories: Vec<Repository>,
        check: &Check,
    ) -> Vec<AuditOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut futures = FuturesUnordered::new();

        for (index, mut repo) in repositories.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore.acquire().await;
                (index, check_repository(&mut repo, check).await)
            });
        }

        let mut outcomes = Vec::with_capacity(futures.len());
        while let Some(result) = futures.next().await {
            outcomes.push(result);
        }
        outcomes.sort_by_key(|(index, _)| *index);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// Apply one check; errors become a failed outcome for this repository only
pub async fn check_repository(repo: &mut Repository, check: &Check) -> AuditOutcome {
    let url = repo.url().to_string();
    debug!("Checking {} ({:?})", url, check);

    let finding = match check {
        Check::Committer => repo.last_committer().await.map(Finding::Committer),
        Check::Gem => repo.gemspec_file().await.map(Finding::Gem),
        Check::File(path) => repo.content(path).await.map(|content| Finding::File {
            path: path.clone(),
            present: content.is_some(),
        }),
    };

    match finding {
        Ok(finding) => AuditOutcome::Completed { url, finding },
        Err(e) => {
            error!("Audit of {} failed: {}", url, e);
            AuditOutcome::Failed {
                url,
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_summary_calculation() {
        let outcomes = vec![
            AuditOutcome::Completed {
                url: "https://github.com/o/a".to_string(),
                finding: Finding::Gem(Some("a.gemspec".to_string())),
            },
            AuditOutcome::Failed {
                url: "https://github.com/o/b".to_string(),
                error: "HTTP get error".to_string(),
            },
            AuditOutcome::Completed {
                url: "https://github.com/o/c".to_string(),
                finding: Finding::Gem(None),
            },
        ];

        let summary = AuditSummary::from_outcomes(outcomes, Duration::from_secs(2));

        assert_eq!(summary.total_repositories, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.outcomes[1].url(), "https://github.com/o/b");
    }

    #[test]
    fn test_auditor_uses_config() {
        let mut config = Config::default();
        config.github.organization = Some("zendesk".to_string());
        config.http.max_parallel = 0;

        let auditor = Auditor::new(&config, None).expect("Failed to create auditor");
        assert_eq!(auditor.selector(), &Selector::Organization("zendesk".to_string()));
        assert_eq!(auditor.max_parallel, 1);
    }

    #[test]
    fn test_auditor_rejects_unusable_token() {
        let result = Auditor::new(&Config::default(), Some("abc\ndef".to_string()));
        let err = result.err().expect("token with a newline must be rejected");
        assert!(format!("{:#}", err).contains("Invalid access token"));
    }
}
