//! Per-project mutual exclusion for catalog mutations.

use std::{collections::HashMap, future::Future, sync::Arc};

use formsync_core::api::ProjectId;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    Forms,
    Instances,
}

/// A non-blocking gate. Whoever gets in first proceeds; everyone else,
/// including a holder that re-enters, is told it did not acquire the lock.
#[derive(Debug, Default, Clone)]
pub struct ChangeLock {
    inner: Arc<tokio::sync::Mutex<()>>,
}

impl ChangeLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` with `true` if the lock was acquired. With `false` the
    /// action must not mutate anything.
    pub async fn with_lock<F, Fut, R>(&self, action: F) -> R
    where
        F: FnOnce(bool) -> Fut,
        Fut: Future<Output = R>,
    {
        let guard = self.inner.clone().try_lock_owned().ok();
        let result = action(guard.is_some()).await;
        drop(guard);
        result
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Lazily creates one lock per (project, kind) and keeps it for the life of
/// the registry.
#[derive(Debug, Default)]
pub struct ChangeLocks {
    locks: Mutex<HashMap<(ProjectId, LockKind), ChangeLock>>,
}

impl ChangeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: &ProjectId, kind: LockKind) -> ChangeLock {
        self.locks
            .lock()
            .entry((project_id.clone(), kind))
            .or_default()
            .clone()
    }

    pub fn forms_lock(&self, project_id: &ProjectId) -> ChangeLock {
        self.get(project_id, LockKind::Forms)
    }

    pub fn instances_lock(&self, project_id: &ProjectId) -> ChangeLock {
        self.get(project_id, LockKind::Instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reentering_does_not_acquire() {
        let lock = ChangeLock::new();
        let same = &lock;
        let (outer, inner) = lock
            .with_lock(|outer| async move {
                let inner = same.with_lock(|inner| async move { inner }).await;
                (outer, inner)
            })
            .await;
        assert!(outer);
        assert!(!inner);
        assert!(!lock.is_locked());
    }

    #[test]
    fn same_project_and_kind_share_a_lock() {
        let locks = ChangeLocks::new();
        let project = ProjectId::from("p1");
        let forms = locks.forms_lock(&project);
        let _guard = forms.inner.try_lock().unwrap();
        assert!(locks.forms_lock(&project).is_locked());
        assert!(!locks.instances_lock(&project).is_locked());
        assert!(!locks.forms_lock(&ProjectId::from("p2")).is_locked());
    }
}
