use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::job::{JobEntry, JobRequest};

/// Shared id -> job mapping, iterated in creation order.
pub(crate) struct Registry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    by_seq: BTreeMap<u64, Arc<JobEntry>>,
    seq_by_id: HashMap<String, u64>,
    next_seq: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    pub(crate) async fn register(
        &self,
        mut request: JobRequest,
        max_log_bytes: usize,
    ) -> Arc<JobEntry> {
        let mut guard = self.inner.write().await;
        let id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if !guard.seq_by_id.contains_key(&candidate) {
                break candidate;
            }
        };
        request.assign_label(&id);
        let seq = guard.next_seq;
        guard.next_seq += 1;
        let entry = Arc::new(JobEntry::new(id.clone(), request, max_log_bytes));
        guard.seq_by_id.insert(id, seq);
        guard.by_seq.insert(seq, Arc::clone(&entry));
        entry
    }

    pub(crate) async fn get(&self, id: &str) -> Option<Arc<JobEntry>> {
        let guard = self.inner.read().await;
        let seq = guard.seq_by_id.get(id)?;
        guard.by_seq.get(seq).cloned()
    }

    /// Removes `id` if `check` accepts the entry. The write lock is held while
    /// `check` runs, so no other caller can observe a half-removed job.
    pub(crate) async fn remove_if<F, Fut, E>(
        &self,
        id: &str,
        check: F,
    ) -> Option<Result<Arc<JobEntry>, E>>
    where
        F: FnOnce(Arc<JobEntry>) -> Fut,
        Fut: std::future::Future<Output = Result<(), E>>,
    {
        let mut guard = self.inner.write().await;
        let seq = *guard.seq_by_id.get(id)?;
        let entry = guard.by_seq.get(&seq).cloned()?;
        if let Err(err) = check(Arc::clone(&entry)).await {
            return Some(Err(err));
        }
        guard.seq_by_id.remove(id);
        guard.by_seq.remove(&seq);
        Some(Ok(entry))
    }

    pub(crate) async fn entries(&self) -> Vec<Arc<JobEntry>> {
        let guard = self.inner.read().await;
        guard.by_seq.values().cloned().collect()
    }
}
