use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::content::{ContentResolver, ContentSource, DirEntry};
use crate::error::Result;
use crate::pagination;
use crate::transport::{auth_headers, Transport};

pub const DEFAULT_API_HOST: &str = "https://api.github.com";
pub const DEFAULT_RAW_HOST: &str = "https://raw.githubusercontent.com";

const GEMSPEC_SUFFIX: &str = ".gemspec";

/// API, raw-content and web origins of the forge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hosts {
    pub api: String,
    pub raw: String,
    /// Where people browse and clone, derived from `api`
    pub web: String,
}

impl Hosts {
    pub fn new(api: &str, raw: &str) -> Self {
        let api = api.trim_end_matches('/');
        Self {
            api: api.to_string(),
            raw: raw.trim_end_matches('/').to_string(),
            web: web_origin(api),
        }
    }

    /// Host name of the web origin, as used in SSH remotes
    pub fn web_host(&self) -> &str {
        let host = self.web.split_once("://").map_or(self.web.as_str(), |(_, rest)| rest);
        host.split('/').next().unwrap_or(host)
    }
}

/// `https://api.github.com` serves `https://github.com`, an enterprise
/// `https://ghe.example.com/api/v3` serves `https://ghe.example.com`
fn web_origin(api: &str) -> String {
    let base = api.strip_suffix("/api/v3").unwrap_or(api);
    match base.split_once("://api.") {
        Some((scheme, rest)) => format!("{}://{}", scheme, rest),
        None => base.to_string(),
    }
}

impl Default for Hosts {
    fn default() -> Self {
        Self::new(DEFAULT_API_HOST, DEFAULT_RAW_HOST)
    }
}

/// Repository metadata as returned by the list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Canonical API URL, e.g. `https://api.github.com/repos/owner/name`
    pub url: String,

    #[serde(default)]
    pub private: bool,

    #[serde(default)]
    pub default_branch: Option<String>,

    /// Pre-2012 name of `default_branch`
    #[serde(default)]
    pub master_branch: Option<String>,

    /// Everything else the API sent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RepositoryRecord {
    pub fn new(url: &str, private: bool) -> Self {
        Self {
            url: url.to_string(),
            private,
            default_branch: None,
            master_branch: None,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Deserialize)]
struct CommitResponse {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    committer: Signature,
}

#[derive(Deserialize)]
struct Signature {
    name: String,
    email: String,
}

/// One audited repository with lazily fetched, memoized content.
///
/// File contents and directory listings are fetched at most once per path for
/// the lifetime of the value. A missing file is remembered as `None`, a
/// missing directory as an empty listing.
pub struct Repository {
    record: RepositoryRecord,
    token: Option<String>,
    web_url: String,
    ssh_host: String,
    resolver: ContentResolver,
    contents: HashMap<String, Option<Vec<u8>>>,
    listings: HashMap<String, Vec<DirEntry>>,
}

impl Repository {
    /// Fails only when `token` cannot be sent as a header
    pub fn new(
        record: RepositoryRecord,
        token: Option<String>,
        transport: Transport,
        hosts: &Hosts,
    ) -> Result<Self> {
        let source = ContentSource::for_visibility(record.private);
        let (owner, name) = owner_and_name(&record.url);
        let raw_url = format!("{}/{}/{}", hosts.raw, owner, name);
        let web_url = format!("{}/{}/{}", hosts.web, owner, name);
        let branch = branch_of(&record).to_string();

        let resolver = ContentResolver::new(
            transport,
            source,
            &record.url,
            &raw_url,
            &branch,
            auth_headers(token.as_deref())?,
        );

        Ok(Self {
            record,
            token,
            web_url,
            ssh_host: hosts.web_host().to_string(),
            resolver,
            contents: HashMap::new(),
            listings: HashMap::new(),
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn api_url(&self) -> &str {
        &self.record.url
    }

    /// Last path segment of the API URL
    pub fn name(&self) -> &str {
        owner_and_name(&self.record.url).1
    }

    pub fn owner(&self) -> &str {
        owner_and_name(&self.record.url).0
    }

    /// Public web URL, e.g. `https://github.com/owner/name`
    pub fn url(&self) -> &str {
        &self.web_url
    }

    pub fn branch(&self) -> &str {
        branch_of(&self.record)
    }

    pub fn is_private(&self) -> bool {
        self.record.private
    }

    pub fn is_public(&self) -> bool {
        !self.record.private
    }

    pub fn content_source(&self) -> ContentSource {
        self.resolver.source()
    }

    /// SSH remote for private repositories, HTTPS for public ones
    pub fn clone_url(&self) -> String {
        if self.is_private() {
            format!("git@{}:{}/{}.git", self.ssh_host, self.owner(), self.name())
        } else {
            format!("{}.git", self.web_url)
        }
    }

    /// Content of `path` on the default branch, `None` if it does not exist
    pub async fn content(&mut self, path: &str) -> Result<Option<&[u8]>> {
        let path = path.trim_start_matches('/');
        if !self.contents.contains_key(path) {
            let fetched = self.resolver.fetch_file(path).await?;
            self.contents.insert(path.to_string(), fetched);
        }
        Ok(self.contents.get(path).and_then(|c| c.as_deref()))
    }

    /// Like [`Repository::content`], decoded as UTF-8 (lossy)
    pub async fn text(&mut self, path: &str) -> Result<Option<String>> {
        Ok(self
            .content(path)
            .await?
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    async fn list(&mut self, dir: &str) -> Result<&[DirEntry]> {
        if !self.listings.contains_key(dir) {
            let entries = self.resolver.list_directory(dir).await?;
            debug!("Listed {} entries in {}:{}", entries.len(), self.name(), dir);
            self.listings.insert(dir.to_string(), entries);
        }
        Ok(self.listings.get(dir).map(Vec::as_slice).unwrap_or_default())
    }

    /// Paths of the files (not directories) in `dir`; use `.` for the root
    pub async fn file_list(&mut self, dir: &str) -> Result<Vec<String>> {
        Ok(self
            .list(dir)
            .await?
            .iter()
            .filter(|entry| entry.is_file())
            .map(|entry| entry.path.clone())
            .collect())
    }

    pub async fn is_directory(&mut self, path: &str) -> Result<bool> {
        let path = path.trim_end_matches('/');
        let parent = parent_dir(path);
        Ok(self
            .list(parent)
            .await?
            .iter()
            .any(|entry| entry.path == path && entry.is_dir()))
    }

    /// First top-level `*.gemspec` file, if any
    pub async fn gemspec_file(&mut self) -> Result<Option<String>> {
        Ok(self
            .file_list(".")
            .await?
            .into_iter()
            .find(|path| path.ends_with(GEMSPEC_SUFFIX)))
    }

    pub async fn is_gem(&mut self) -> Result<bool> {
        Ok(self.gemspec_file().await?.is_some())
    }

    pub async fn gemspec_content(&mut self) -> Result<Option<String>> {
        match self.gemspec_file().await? {
            Some(file) => self.text(&file).await,
            None => Ok(None),
        }
    }

    /// `name <email>` of whoever committed last on the default branch.
    ///
    /// Always goes through the API, there is no raw equivalent for commits.
    pub async fn last_committer(&self) -> Result<String> {
        let response: CommitResponse = self
            .resolver
            .call_api(&format!("commits/{}", self.branch()))
            .await?;
        let committer = response.commit.committer;
        Ok(format!("{} <{}>", committer.name, committer.email))
    }

    /// `url -- last committer`
    pub async fn summary(&self) -> Result<String> {
        Ok(format!("{} -- {}", self.url(), self.last_committer().await?))
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("url", &self.api_url())
            .field("private", &self.record.private)
            .field("cached_files", &self.contents.len())
            .field("cached_listings", &self.listings.len())
            .finish()
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url())
    }
}

fn branch_of(record: &RepositoryRecord) -> &str {
    record
        .default_branch
        .as_deref()
        .or(record.master_branch.as_deref())
        .unwrap_or("master")
}

fn owner_and_name(api_url: &str) -> (&str, &str) {
    let mut segments = api_url.trim_end_matches('/').rsplit('/');
    let name = segments.next().unwrap_or_default();
    let owner = segments.next().unwrap_or_default();
    (owner, name)
}

fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent,
        _ => ".",
    }
}

/// Which account's repositories to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Organization(String),
    User(String),
    /// Repositories of whoever owns the token
    Authenticated,
}

impl Selector {
    /// Pick a selector, preferring organization over user over self
    pub fn from_options(organization: Option<&str>, user: Option<&str>) -> Self {
        match (organization, user) {
            (Some(org), _) => Selector::Organization(org.to_string()),
            (None, Some(user)) => Selector::User(user.to_string()),
            (None, None) => Selector::Authenticated,
        }
    }

    /// Path of the list endpoint relative to the API host
    pub fn list_path(&self) -> String {
        match self {
            Selector::Organization(org) => format!("orgs/{}/repos", org),
            Selector::User(user) => format!("users/{}/repos", user),
            Selector::Authenticated => "user/repos".to_string(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Organization(org) => write!(f, "organization {}", org),
            Selector::User(user) => write!(f, "user {}", user),
            Selector::Authenticated => f.write_str("authenticated user"),
        }
    }
}

/// Entry point for enumerating repositories
#[derive(Clone)]
pub struct RepositorySet {
    transport: Transport,
    hosts: Hosts,
}

impl RepositorySet {
    pub fn new(transport: Transport, hosts: Hosts) -> Self {
        Self { transport, hosts }
    }

    /// Every repository of `selector`, in the order the API lists them
    pub async fn all(
        &self,
        selector: &Selector,
        token: Option<&str>,
        max_pages: Option<u32>,
    ) -> Result<Vec<Repository>> {
        let url = format!("{}/{}", self.hosts.api, selector.list_path());
        let headers = auth_headers(token)?;
        let records: Vec<RepositoryRecord> =
            pagination::fetch_all(&self.transport, &url, &headers, max_pages).await?;

        info!("Found {} repositories for {}", records.len(), selector);

        records
            .into_iter()
            .map(|record| self.wrap(record, token))
            .collect()
    }

    /// Wrap a record fetched elsewhere
    pub fn wrap(&self, record: RepositoryRecord, token: Option<&str>) -> Result<Repository> {
        Repository::new(
            record,
            token.map(str::to_string),
            self.transport.clone(),
            &self.hosts,
        )
    }
}
