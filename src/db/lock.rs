use chrono::{Duration, Utc};
use rusqlite::params;

use crate::error::Result;

use super::store::Store;

pub const SYNC_LOCK_NAME: &str = "full_sync";

/// Cross-process single-flight via a lease row. Acquisition atomically
/// sweeps expired leases and claims the name with INSERT OR IGNORE; only
/// one caller can win the insert. The TTL bounds how long a crashed
/// holder can block the next run.
impl Store {
    pub async fn try_acquire_lock(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let name = name.to_string();
        let holder = holder.to_string();
        let now = Utc::now();
        let expires = now + ttl;
        let acquired = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM sync_locks WHERE name = ?1 AND expires_at <= ?2",
                    params![name, now.to_rfc3339()],
                )?;
                let inserted = tx.execute(
                    r#"INSERT OR IGNORE INTO sync_locks (name, holder, acquired_at, expires_at)
                       VALUES (?1, ?2, ?3, ?4)"#,
                    params![name, holder, now.to_rfc3339(), expires.to_rfc3339()],
                )?;
                tx.commit()?;
                Ok(inserted > 0)
            })
            .await?;
        Ok(acquired)
    }

    /// Releases only our own lease; a lease taken over by another holder
    /// after expiry is left alone.
    pub async fn release_lock(&self, name: &str, holder: &str) -> Result<()> {
        let name = name.to_string();
        let holder = holder.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM sync_locks WHERE name = ?1 AND holder = ?2",
                    params![name, holder],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::store::testutil::open_store;
    use super::*;

    #[tokio::test]
    async fn second_acquirer_loses_while_lease_is_held() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store
            .try_acquire_lock(SYNC_LOCK_NAME, "run-a", Duration::minutes(30))
            .await
            .unwrap());
        assert!(!store
            .try_acquire_lock(SYNC_LOCK_NAME, "run-b", Duration::minutes(30))
            .await
            .unwrap());

        store.release_lock(SYNC_LOCK_NAME, "run-a").await.unwrap();
        assert!(store
            .try_acquire_lock(SYNC_LOCK_NAME, "run-b", Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_swept_on_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        // Negative TTL: the lease is already expired when written.
        assert!(store
            .try_acquire_lock(SYNC_LOCK_NAME, "crashed-run", Duration::minutes(-1))
            .await
            .unwrap());
        assert!(store
            .try_acquire_lock(SYNC_LOCK_NAME, "next-run", Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn release_is_scoped_to_the_holder() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store
            .try_acquire_lock(SYNC_LOCK_NAME, "run-a", Duration::minutes(30))
            .await
            .unwrap());
        // A stale holder releasing must not free someone else's lease.
        store.release_lock(SYNC_LOCK_NAME, "run-b").await.unwrap();
        assert!(!store
            .try_acquire_lock(SYNC_LOCK_NAME, "run-c", Duration::minutes(30))
            .await
            .unwrap());
    }
}
