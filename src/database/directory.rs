use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::document::Document;
use super::store::{StoreError, StoreTransaction};
use crate::filter::FilterData;

/// Cached user → Employee lookups. Hits are served for `ttl` before being
/// re-read; misses are never cached so a newly linked Employee shows up at once.
pub struct EmployeeDirectory {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, Document)>>,
}

impl EmployeeDirectory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The Employee linked to `user` through `user_id`, if any.
    pub async fn employee_for_user(
        &self,
        tx: &mut dyn StoreTransaction,
        user: &str,
    ) -> Result<Option<Document>, StoreError> {
        if !self.ttl.is_zero() {
            let entries = self.entries.read().await;
            if let Some((fetched, doc)) = entries.get(user) {
                if fetched.elapsed() < self.ttl {
                    return Ok(Some(doc.clone()));
                }
            }
        }

        let mut found = tx
            .find("Employee", &FilterData::new().where_eq("user_id", user).limit(1))
            .await?;
        let doc = found.pop();

        match &doc {
            Some(found) if !self.ttl.is_zero() => {
                let mut entries = self.entries.write().await;
                entries.insert(user.to_string(), (Instant::now(), found.clone()));
            }
            _ => {}
        }
        Ok(doc)
    }

    pub async fn invalidate(&self, user: &str) {
        self.entries.write().await.remove(user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{DocumentStore, MemoryStore};

    #[tokio::test]
    async fn caches_until_invalidated() {
        let store = MemoryStore::new();
        store
            .seed(vec![Document::named("Employee", "EMP-1").with("user_id", "a@example.com")])
            .await;
        let directory = EmployeeDirectory::new(Duration::from_secs(60));

        let mut tx = store.begin().await.unwrap();
        let first = directory.employee_for_user(tx.as_mut(), "a@example.com").await.unwrap();
        assert_eq!(first.map(|d| d.name), Some("EMP-1".to_string()));

        tx.delete("Employee", "EMP-1").await.unwrap();
        let cached = directory.employee_for_user(tx.as_mut(), "a@example.com").await.unwrap();
        assert!(cached.is_some());

        directory.invalidate("a@example.com").await;
        let fresh = directory.employee_for_user(tx.as_mut(), "a@example.com").await.unwrap();
        assert!(fresh.is_none());
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let store = MemoryStore::new();
        let directory = EmployeeDirectory::new(Duration::from_secs(60));
        let mut tx = store.begin().await.unwrap();

        let missing = directory.employee_for_user(tx.as_mut(), "b@example.com").await.unwrap();
        assert!(missing.is_none());

        tx.insert(Document::named("Employee", "EMP-2").with("user_id", "b@example.com"))
            .await
            .unwrap();
        let linked = directory.employee_for_user(tx.as_mut(), "b@example.com").await.unwrap();
        assert_eq!(linked.map(|d| d.name), Some("EMP-2".to_string()));
    }
}
