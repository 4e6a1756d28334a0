//! Per-process console state: active project, command history and the
//! completion id cache.
//!
//! Owned by the caller and shared with the completion engine through
//! `Rc<RefCell<_>>`; there is exactly one control thread.

use crate::handler::LookupError;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const DEFAULT_HISTORY_MAX_LINES: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no projects configured")]
    NoProjects,
    #[error("unknown project `{0}`")]
    UnknownProject(String),
    #[error("history file {path}: {source}")]
    History {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Table name in the configuration file.
    pub key: String,
    /// Human readable name, defaults to the key.
    pub name: String,
}

impl Project {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

// ============================================================================
// History
// ============================================================================

/// Ordered input lines, oldest first.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<String>,
    max_lines: Option<usize>,
    file: Option<PathBuf>,
}

impl History {
    /// `max_lines = None` keeps everything.
    pub fn new(max_lines: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_lines,
            file: None,
        }
    }

    /// Load from `path` (a missing file is an empty history) and remember it
    /// for [`History::save`].
    pub fn load(path: impl Into<PathBuf>, max_lines: Option<usize>) -> Result<Self, SessionError> {
        let path = path.into();
        let mut history = Self::new(max_lines);

        match fs::read_to_string(&path) {
            Ok(text) => {
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    history.push(line);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(SessionError::History { path, source }),
        }

        history.file = Some(path);
        Ok(history)
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.entries.push_back(line.into());
        if let Some(max) = self.max_lines {
            while self.entries.len() > max {
                self.entries.pop_front();
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Write all entries to the backing file, if any.
    pub fn save(&self) -> Result<(), SessionError> {
        let Some(path) = self.file.as_ref() else {
            return Ok(());
        };
        let io_err = |source| SessionError::History {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let mut text = String::new();
        for line in &self.entries {
            text.push_str(line);
            text.push('\n');
        }
        fs::write(path, text).map_err(io_err)
    }
}

// ============================================================================
// Id cache
// ============================================================================

/// Resource categories whose ids can be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Server,
    Snapshot,
    Backup,
    Image,
    Iso,
    Volume,
    Network,
    Firewall,
    FloatingIp,
    PrimaryIp,
    LoadBalancer,
    SshKey,
    Location,
    Datacenter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdEntry {
    pub id: String,
    pub label: String,
}

impl IdEntry {
    pub fn new(id: impl ToString, label: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedIds {
    fetched_at: Instant,
    entries: Vec<IdEntry>,
}

/// Last fetched ids per resource kind.
///
/// An entry younger than the freshness window is served as is; anything older
/// is refetched on the next lookup and replaced wholesale.
#[derive(Debug, Clone)]
pub struct IdCache {
    ttl: Duration,
    entries: HashMap<ResourceKind, CachedIds>,
}

impl IdCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached ids regardless of age.
    pub fn get(&self, kind: ResourceKind) -> Option<&[IdEntry]> {
        self.entries.get(&kind).map(|c| c.entries.as_slice())
    }

    pub fn is_fresh(&self, kind: ResourceKind) -> bool {
        self.entries
            .get(&kind)
            .is_some_and(|c| c.fetched_at.elapsed() < self.ttl)
    }

    pub fn store(&mut self, kind: ResourceKind, entries: Vec<IdEntry>) {
        self.entries.insert(
            kind,
            CachedIds {
                fetched_at: Instant::now(),
                entries,
            },
        );
    }

    /// Serve `kind` from the cache when fresh, otherwise call `fetch` and keep
    /// its result. A failed fetch leaves the previous entry untouched.
    pub fn lookup_or_fetch<F>(&mut self, kind: ResourceKind, fetch: F) -> Result<Vec<IdEntry>, LookupError>
    where
        F: FnOnce() -> Result<Vec<IdEntry>, LookupError>,
    {
        if self.is_fresh(kind) {
            if let Some(hit) = self.get(kind) {
                return Ok(hit.to_vec());
            }
        }
        let entries = fetch()?;
        self.store(kind, entries.clone());
        Ok(entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for IdCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug)]
pub struct SessionState {
    projects: Vec<Project>,
    active: usize,
    pub history: History,
    pub id_cache: IdCache,
}

impl SessionState {
    /// `active` must name one of `projects`.
    pub fn new(
        projects: Vec<Project>,
        active: &str,
        history: History,
        id_cache: IdCache,
    ) -> Result<Self, SessionError> {
        if projects.is_empty() {
            return Err(SessionError::NoProjects);
        }
        let active = projects
            .iter()
            .position(|p| p.key == active)
            .ok_or_else(|| SessionError::UnknownProject(active.to_string()))?;
        Ok(Self {
            projects,
            active,
            history,
            id_cache,
        })
    }

    /// A single-project session with in-memory history.
    pub fn single(project: Project) -> Self {
        Self {
            projects: vec![project],
            active: 0,
            history: History::new(Some(DEFAULT_HISTORY_MAX_LINES)),
            id_cache: IdCache::default(),
        }
    }

    pub fn active_project(&self) -> &Project {
        &self.projects[self.active]
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Find a project by key or by its 1-based position.
    pub fn resolve_project(&self, key_or_index: &str) -> Result<&Project, SessionError> {
        self.position_of(key_or_index)
            .map(|i| &self.projects[i])
    }

    /// Make `key_or_index` the active project. Nothing changes on failure.
    ///
    /// Cached ids belong to the previous project and are dropped.
    pub fn switch_project(&mut self, key_or_index: &str) -> Result<&Project, SessionError> {
        let idx = self.position_of(key_or_index)?;
        if idx != self.active {
            self.active = idx;
            self.id_cache.clear();
        }
        tracing::info!(project = %self.projects[idx].key, "switched project");
        Ok(&self.projects[idx])
    }

    fn position_of(&self, key_or_index: &str) -> Result<usize, SessionError> {
        if let Some(i) = self.projects.iter().position(|p| p.key == key_or_index) {
            return Ok(i);
        }
        match key_or_index.parse::<usize>() {
            Ok(n) if n >= 1 && n <= self.projects.len() => Ok(n - 1),
            _ => Err(SessionError::UnknownProject(key_or_index.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::Cell;

    fn session() -> SessionState {
        SessionState::new(
            vec![
                Project::new("default", "Default"),
                Project::new("prod", "Production"),
            ],
            "default",
            History::new(None),
            IdCache::new(Duration::from_secs(60)),
        )
        .expect("session")
    }

    #[test]
    fn initial_project_must_be_configured() {
        let err = SessionState::new(
            vec![Project::new("a", "a")],
            "b",
            History::new(None),
            IdCache::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::UnknownProject(ref k) if k == "b"));
        assert!(matches!(
            SessionState::new(vec![], "a", History::new(None), IdCache::default()),
            Err(SessionError::NoProjects)
        ));
    }

    #[test]
    fn switch_accepts_key_or_index() {
        let mut s = session();
        assert_eq!(s.switch_project("prod").expect("by key").name, "Production");
        assert_eq!(s.switch_project("1").expect("by index").key, "default");
    }

    #[test]
    fn failed_switch_keeps_active_project() {
        let mut s = session();
        s.switch_project("prod").expect("switch");
        assert!(s.switch_project("staging").is_err());
        assert!(s.switch_project("0").is_err());
        assert!(s.switch_project("3").is_err());
        assert_eq!(s.active_project().key, "prod");
    }

    #[test]
    fn switching_project_drops_cached_ids() {
        let mut s = session();
        s.id_cache.store(ResourceKind::Server, vec![IdEntry::new(1, "web")]);
        s.switch_project("prod").expect("switch");
        assert!(s.id_cache.get(ResourceKind::Server).is_none());
    }

    #[test]
    fn fresh_entries_skip_the_fetch() {
        let mut cache = IdCache::new(Duration::from_secs(60));
        let calls = Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Ok(vec![IdEntry::new(7, "db")])
        };
        cache.lookup_or_fetch(ResourceKind::Volume, fetch).expect("first");
        cache.lookup_or_fetch(ResourceKind::Volume, fetch).expect("second");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_ttl_refetches_every_time_and_last_write_wins() {
        let mut cache = IdCache::new(Duration::ZERO);
        cache
            .lookup_or_fetch(ResourceKind::Server, || Ok(vec![IdEntry::new(1, "a")]))
            .expect("first");
        let second = cache
            .lookup_or_fetch(ResourceKind::Server, || Ok(vec![IdEntry::new(2, "b")]))
            .expect("second");
        assert_eq!(second, vec![IdEntry::new(2, "b")]);
        assert_eq!(cache.get(ResourceKind::Server), Some(&[IdEntry::new(2, "b")][..]));
    }

    #[test]
    fn failed_fetch_keeps_previous_entry() {
        let mut cache = IdCache::new(Duration::ZERO);
        cache.store(ResourceKind::Network, vec![IdEntry::new(3, "lan")]);
        let err = cache
            .lookup_or_fetch(ResourceKind::Network, || {
                Err(LookupError::Unavailable("offline".into()))
            })
            .unwrap_err();
        assert!(matches!(err, LookupError::Unavailable(_)));
        assert_eq!(cache.get(ResourceKind::Network).map(<[IdEntry]>::len), Some(1));
    }

    #[test]
    fn history_file_round_trip_respects_bound() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/history");

        let mut h = History::load(&path, Some(3)).expect("missing file is empty");
        assert!(h.is_empty());
        for line in ["a", "b", "c", "d"] {
            h.push(line);
        }
        h.save().expect("save");

        let reloaded = History::load(&path, Some(2)).expect("reload");
        assert_eq!(reloaded.iter().collect::<Vec<_>>(), vec!["c", "d"]);
    }

    #[test]
    fn in_memory_history_save_is_a_no_op() {
        let mut h = History::new(None);
        h.push("vm list");
        h.save().expect("nothing to write");
        assert!(h.file().is_none());
    }

    proptest! {
        #[test]
        fn history_is_order_preserving_and_bounded(
            lines in proptest::collection::vec("[a-z ]{1,12}", 0..40),
            max in 1usize..20,
        ) {
            let mut h = History::new(Some(max));
            for l in &lines {
                h.push(l.clone());
            }
            let expected: Vec<&str> = lines
                .iter()
                .skip(lines.len().saturating_sub(max))
                .map(String::as_str)
                .collect();
            prop_assert_eq!(h.iter().collect::<Vec<_>>(), expected);
        }
    }
}
