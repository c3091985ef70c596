//! Scan report persistence.
//!
//! The store exclusively owns persisted reports; callers always receive
//! independent copies. A report is written exactly once and only ever
//! removed afterwards. Deleted ids are remembered so they are never reused.

use crate::error::{ScanError, StoreError};
use crate::models::ScanReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Persistence for scan reports.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Persist a new report. Fails if the id was ever stored before.
    async fn save(&self, report: ScanReport) -> Result<Uuid, StoreError>;

    async fn get(&self, id: Uuid) -> Result<ScanReport, ScanError>;

    /// All reports, most recent first.
    async fn list(&self) -> Vec<ScanReport>;

    async fn delete(&self, id: Uuid) -> Result<(), ScanError>;
}

/// On-disk history format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    /// Reports in insertion order.
    scans: Vec<ScanReport>,
    #[serde(default)]
    deleted: Vec<Uuid>,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    reports: HashMap<Uuid, (u64, ScanReport)>,
    deleted: HashSet<Uuid>,
}

impl Inner {
    fn snapshot(&self) -> Snapshot {
        let mut entries: Vec<&(u64, ScanReport)> = self.reports.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);

        let mut deleted: Vec<Uuid> = self.deleted.iter().copied().collect();
        deleted.sort();

        Snapshot {
            scans: entries.into_iter().map(|(_, report)| report.clone()).collect(),
            deleted,
        }
    }
}

/// In-memory store, optionally mirrored to a JSON history file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// A store that lives only as long as the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store backed by a history file. Existing history is loaded.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = Inner::default();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                for report in snapshot.scans {
                    inner.reports.insert(report.id, (inner.next_seq, report));
                    inner.next_seq += 1;
                }
                inner.deleted.extend(snapshot.deleted);
                info!(
                    "Loaded {} scan(s) from {}",
                    inner.reports.len(),
                    path.display()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history at {}, starting empty", path.display());
            }
            Err(e) => return Err(StoreError::Io(e)),
        }

        Ok(Self {
            inner: RwLock::new(inner),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the history file. Called with the write lock held and before the
    /// map is touched, so an interrupted write never leaves a mutation in
    /// memory that the file does not have.
    async fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        // unique per write so an abandoned write cannot clobber a later one
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!("Persisted {} scan(s) to {}", snapshot.scans.len(), path.display());
        Ok(())
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn save(&self, report: ScanReport) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.write().await;
        let id = report.id;

        if inner.reports.contains_key(&id) || inner.deleted.contains(&id) {
            return Err(StoreError::DuplicateId(id));
        }

        if self.path.is_some() {
            let mut snapshot = inner.snapshot();
            snapshot.scans.push(report.clone());
            self.persist(&snapshot).await?;
        }

        // Committed only once the file holds the report; a save dropped
        // mid-write leaves the map untouched.
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.reports.insert(id, (seq, report));

        debug!("Stored scan {}", id);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<ScanReport, ScanError> {
        let inner = self.inner.read().await;
        inner
            .reports
            .get(&id)
            .map(|(_, report)| report.clone())
            .ok_or(ScanError::NotFound(id))
    }

    async fn list(&self) -> Vec<ScanReport> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&(u64, ScanReport)> = inner.reports.values().collect();
        entries.sort_by_key(|(seq, _)| std::cmp::Reverse(*seq));
        entries.into_iter().map(|(_, report)| report.clone()).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<(), ScanError> {
        let mut inner = self.inner.write().await;
        if !inner.reports.contains_key(&id) {
            return Err(ScanError::NotFound(id));
        }

        if self.path.is_some() {
            let mut snapshot = inner.snapshot();
            snapshot.scans.retain(|report| report.id != id);
            snapshot.deleted.push(id);
            snapshot.deleted.sort();
            self.persist(&snapshot).await?;
        }

        inner.reports.remove(&id);
        inner.deleted.insert(id);

        debug!("Deleted scan {}", id);
        Ok(())
    }
}
