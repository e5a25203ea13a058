use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per clone-target directory.
///
/// Two descriptors resolving to the same target serialize here; the one
/// that goes second finds a populated directory and reuses it. Targets are
/// keyed by absolute path, so `sources/foo` and `./sources/foo` share a
/// lock. Entries nobody holds or waits on are dropped on the next `lock`.
#[derive(Debug, Default)]
pub struct TargetLocks {
    targets: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, target: &Path) -> OwnedMutexGuard<()> {
        let key = normalize(target);
        let slot = {
            let mut targets = self
                .targets
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // keep only targets someone holds or waits on
            targets.retain(|_, slot| Arc::strong_count(slot) > 1);
            targets
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }
}

fn normalize(target: &Path) -> PathBuf {
    let absolute = std::path::absolute(target).unwrap_or_else(|_| target.to_path_buf());
    // `.` components dropped, `..` kept (symlinks are not resolved)
    absolute.components().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_target_is_exclusive() {
        let locks = Arc::new(TargetLocks::new());
        let guard = locks.lock(Path::new("/srv/sources/foo")).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(Path::new("/srv/sources/foo")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_relative_spellings_share_a_lock() {
        let locks = Arc::new(TargetLocks::new());
        let guard = locks.lock(Path::new("sources/foo")).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(Path::new("./sources/./foo")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(5), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_released_targets_are_pruned() {
        let locks = TargetLocks::new();
        for name in ["a", "b", "c"] {
            let _guard = locks.lock(&Path::new("/srv/sources").join(name)).await;
        }
        let _held = locks.lock(Path::new("/srv/sources/d")).await;

        let targets = locks.targets.lock().unwrap();
        assert_eq!(targets.len(), 1);
        assert!(targets.contains_key(Path::new("/srv/sources/d")));
    }

    #[tokio::test]
    async fn test_distinct_targets_do_not_block() {
        let locks = TargetLocks::new();
        let _a = locks.lock(Path::new("/srv/sources/a")).await;
        let b = tokio::time::timeout(Duration::from_secs(1), locks.lock(Path::new("/srv/sources/b"))).await;
        assert!(b.is_ok());
    }
}
