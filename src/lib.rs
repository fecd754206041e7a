//! orgaudit - Audit every repository of a GitHub user or organization
//!
//! The core of the crate is the fetch layer: listing repositories page by
//! page, surviving rate limits and timeouts, and reading files and directory
//! listings of each repository through the cheapest available path.
//!
//! ## Modules
//!
//! - [`transport`]: single GET with rate-limit backoff
//! - [`pagination`]: walking list endpoints page by page
//! - [`content`]: file content and directory listings (API or raw host)
//! - [`repository`]: repository wrapper with memoized content, and listing entry point
//! - [`audit`]: running a check over all repositories
//! - [`config`], [`auth`], [`filter`]: configuration, token discovery, ignore lists

pub mod audit;
pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod filter;
pub mod pagination;
pub mod repository;
pub mod transport;

pub use audit::{AuditOutcome, AuditSummary, Auditor, Check, Finding};
pub use config::Config;
pub use content::{ContentResolver, ContentSource, DirEntry, EntryKind};
pub use error::{FetchError, Result};
pub use repository::{Hosts, Repository, RepositoryRecord, RepositorySet, Selector};
pub use transport::{Clock, SystemClock, Transport};
