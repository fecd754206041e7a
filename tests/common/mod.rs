//! Common test utilities and helpers for orgaudit tests
#![allow(dead_code)]

use async_trait::async_trait;
use orgaudit::{Clock, Hosts, Repository, RepositoryRecord, RepositorySet, Transport};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::MockServer;

pub const OWNER: &str = "grosser";
pub const TOKEN: &str = "36a1b2a815b98d755528fa6e09b845965fe1e046";

/// Fixed point in time used by [`RecordingClock`]
pub const NOW: i64 = 1_700_000_000;

/// Clock that never sleeps but remembers what it was asked to do
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> i64 {
        NOW
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Transport with a short timeout and a recording clock
pub fn test_transport(clock: Arc<RecordingClock>) -> Transport {
    Transport::new(Duration::from_millis(200))
        .expect("Failed to build transport")
        .with_clock(clock)
}

/// Both API and raw host point at the mock server
pub fn hosts(server: &MockServer) -> Hosts {
    Hosts::new(&server.uri(), &server.uri())
}

pub fn repository_set(server: &MockServer, clock: Arc<RecordingClock>) -> RepositorySet {
    RepositorySet::new(test_transport(clock), hosts(server))
}

/// API URL of a repository on the mock server
pub fn api_url(server: &MockServer, name: &str) -> String {
    format!("{}/repos/{}/{}", server.uri(), OWNER, name)
}

/// A list endpoint record, the way the API returns it
pub fn record_json(server: &MockServer, name: &str, private: bool) -> Value {
    json!({
        "id": 1,
        "name": name,
        "full_name": format!("{}/{}", OWNER, name),
        "url": api_url(server, name),
        "private": private,
        "default_branch": "master",
        "fork": false,
    })
}

/// A page of `count` records named `{prefix}-{i}`
pub fn page_json(server: &MockServer, prefix: &str, count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|i| record_json(server, &format!("{}-{}", prefix, i), false))
            .collect(),
    )
}

pub fn repository(server: &MockServer, name: &str, private: bool, token: Option<&str>) -> Repository {
    let clock = Arc::new(RecordingClock::default());
    let record = RepositoryRecord::new(&api_url(server, name), private);
    repository_set(server, clock)
        .wrap(record, token)
        .expect("Failed to wrap repository")
}

/// Paths of all requests the server has seen
pub async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect()
}
