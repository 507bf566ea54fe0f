#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use aria::cache::CacheRegistry;
use aria::config::DatabaseConfig;
use aria::database::{DaoManager, DriverManager};
use aria::error::{BackendError, BackendResult};
use aria::music::{LoadResult, SearchBackend, SearchSource, TrackDescriptor};
use aria::tasks::TaskManager;

/// A migrated database in a temporary directory.
pub struct TestDb {
    pub driver: Arc<DriverManager>,
    pub tasks: TaskManager,
    pub caches: CacheRegistry,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("aria.db").display()),
        ..Default::default()
    };
    TestDb {
        driver: Arc::new(DriverManager::connect(&config).await.unwrap()),
        tasks: TaskManager::new(8),
        caches: CacheRegistry::new(),
        _dir: dir,
    }
}

impl TestDb {
    pub async fn daos(&self) -> DaoManager {
        DaoManager::init(Arc::clone(&self.driver), self.tasks.clone(), &self.caches)
            .await
            .unwrap()
    }

    pub fn queries(&self) -> u64 {
        self.driver.stats().queries()
    }
}

pub fn track(title: &str, duration_ms: u64) -> TrackDescriptor {
    TrackDescriptor::new(title, duration_ms, format!("https://tracks.test/{title}"), format!("enc:{title}"))
}

/// In-process backend with canned answers that records every call.
pub struct ScriptedBackend {
    name: &'static str,
    enabled: bool,
    delay: Option<Duration>,
    search_default: BackendResult<Vec<TrackDescriptor>>,
    search_by_query: HashMap<String, Vec<TrackDescriptor>>,
    resolve_result: BackendResult<LoadResult>,
    searches: AtomicUsize,
    resolves: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            enabled: true,
            delay: None,
            search_default: Ok(Vec::new()),
            search_by_query: HashMap::new(),
            resolve_result: Ok(LoadResult::NoMatches),
            searches: AtomicUsize::new(0),
            resolves: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn searching(mut self, result: BackendResult<Vec<TrackDescriptor>>) -> Self {
        self.search_default = result;
        self
    }

    /// Answer searches for `query` in `source` with `tracks`.
    pub fn answering(mut self, source: SearchSource, query: &str, tracks: Vec<TrackDescriptor>) -> Self {
        self.search_by_query.insert(format!("{source:?}:{query}"), tracks);
        self
    }

    pub fn resolving(mut self, result: BackendResult<LoadResult>) -> Self {
        self.resolve_result = result;
        self
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.searches() + self.resolves()
    }

    /// Calls in order, as `search:<source>:<query>` or `resolve:<identifier>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn search(&self, query: &str, source: SearchSource) -> BackendResult<Vec<TrackDescriptor>> {
        if !self.enabled {
            return Err(BackendError::Disabled(self.name));
        }
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(format!("search:{source:?}:{query}"));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.search_by_query.get(&format!("{source:?}:{query}")) {
            Some(tracks) => Ok(tracks.clone()),
            None => self.search_default.clone(),
        }
    }

    async fn resolve(&self, identifier: &str) -> BackendResult<LoadResult> {
        if !self.enabled {
            return Err(BackendError::Disabled(self.name));
        }
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(format!("resolve:{identifier}"));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.resolve_result.clone()
    }
}
