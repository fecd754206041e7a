//! Ignore-list matching for audited repositories.
//!
//! An entry matches a repository when it equals the repository's web URL or
//! name. Entries wrapped in slashes (`/^test-/`) are regular expressions
//! matched against the name.

use regex::Regex;
use tracing::{debug, warn};

use crate::repository::Repository;

#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    exact: Vec<String>,
    patterns: Vec<Regex>,
    ignore_public: bool,
}

impl IgnoreList {
    pub fn new(entries: &[String], ignore_public: bool) -> Self {
        let mut exact = Vec::new();
        let mut patterns = Vec::new();

        for entry in entries {
            match regex_body(entry) {
                Some(body) => match Regex::new(body) {
                    Ok(re) => patterns.push(re),
                    Err(e) => warn!("Ignoring invalid pattern {}: {}", entry, e),
                },
                None => exact.push(entry.clone()),
            }
        }

        Self {
            exact,
            patterns,
            ignore_public,
        }
    }

    /// Check a repository by name and web URL
    pub fn matches(&self, name: &str, url: &str) -> bool {
        self.exact.iter().any(|e| e == name || e == url)
            || self.patterns.iter().any(|re| re.is_match(name))
    }

    pub fn is_ignored(&self, repo: &Repository) -> bool {
        (self.ignore_public && repo.is_public()) || self.matches(repo.name(), repo.url())
    }

    /// Drop ignored repositories, keeping order
    pub fn apply(&self, repositories: Vec<Repository>) -> Vec<Repository> {
        repositories
            .into_iter()
            .filter(|repo| {
                let ignored = self.is_ignored(repo);
                if ignored {
                    debug!("Ignoring repository: {}", repo.url());
                }
                !ignored
            })
            .collect()
    }
}

fn regex_body(entry: &str) -> Option<&str> {
    entry
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Hosts, RepositoryRecord};
    use crate::transport::{Transport, DEFAULT_TIMEOUT};

    fn list(entries: &[&str]) -> IgnoreList {
        let entries: Vec<String> = entries.iter().map(|e| e.to_string()).collect();
        IgnoreList::new(&entries, false)
    }

    fn repository(name: &str, private: bool) -> Repository {
        let url = format!("https://api.github.com/repos/grosser/{}", name);
        let transport = Transport::new(DEFAULT_TIMEOUT).expect("Failed to build transport");
        let record = RepositoryRecord::new(&url, private);
        Repository::new(record, None, transport, &Hosts::default()).unwrap()
    }

    #[test]
    fn test_matches_by_name() {
        let ignore = list(&["dotfiles"]);
        assert!(ignore.matches("dotfiles", "https://github.com/grosser/dotfiles"));
        assert!(!ignore.matches("parallel", "https://github.com/grosser/parallel"));
    }

    #[test]
    fn test_matches_by_url() {
        let ignore = list(&["https://github.com/grosser/dotfiles"]);
        assert!(ignore.matches("dotfiles", "https://github.com/grosser/dotfiles"));
        assert!(!ignore.matches("dotfiles", "https://github.com/other/dotfiles"));
    }

    #[test]
    fn test_matches_by_regex() {
        let ignore = list(&["/^test-/", "/-old$/"]);
        assert!(ignore.matches("test-app", ""));
        assert!(ignore.matches("api-old", ""));
        assert!(!ignore.matches("app-test", ""));
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let ignore = list(&["/(unclosed/", "dotfiles"]);
        assert!(ignore.matches("dotfiles", ""));
        assert!(!ignore.matches("(unclosed", ""));
    }

    #[test]
    fn test_single_slash_is_literal() {
        let ignore = list(&["/"]);
        assert!(ignore.matches("/", ""));
        assert!(!ignore.matches("anything", ""));
    }

    #[test]
    fn test_enterprise_repository_ignored_by_web_url() {
        let hosts = Hosts::new("https://ghe.example.com/api/v3", "https://ghe.example.com/raw");
        let transport = Transport::new(DEFAULT_TIMEOUT).expect("Failed to build transport");
        let record = RepositoryRecord::new("https://ghe.example.com/api/v3/repos/acme/widgets", true);
        let repo = Repository::new(record, None, transport, &hosts).unwrap();

        assert!(list(&["https://ghe.example.com/acme/widgets"]).is_ignored(&repo));
        assert!(!list(&["https://ghe.example.com/api/v3/acme/widgets"]).is_ignored(&repo));
    }

    #[test]
    fn test_apply_drops_public_and_listed() {
        let entries = vec!["legacy".to_string()];
        let ignore = IgnoreList::new(&entries, true);
        let repos = vec![
            repository("parallel", false),
            repository("secret", true),
            repository("legacy", true),
        ];

        let kept: Vec<String> = ignore
            .apply(repos)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(kept, vec!["secret"]);
    }
}
