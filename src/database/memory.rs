use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::document::{autoname, Document};
use super::store::{timestamp, DocumentStore, StoreError, StoreTransaction};
use crate::filter::filter_where::FilterWhere;
use crate::filter::FilterData;

type Key = (String, String);

/// Process-local document store. Transactions buffer their writes and apply them
/// atomically on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    documents: RwLock<BTreeMap<Key, Document>>,
    commits: AtomicUsize,
    open: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write documents directly, outside any transaction.
    pub async fn seed(&self, docs: impl IntoIterator<Item = Document>) {
        let mut documents = self.inner.documents.write().await;
        for mut doc in docs {
            if doc.name.is_empty() {
                doc.name = autoname(&doc.doctype);
            }
            documents.insert((doc.doctype.clone(), doc.name.clone()), doc);
        }
    }

    /// Committed copy of a document.
    pub async fn fetch(&self, doctype: &str, name: &str) -> Option<Document> {
        let documents = self.inner.documents.read().await;
        documents.get(&(doctype.to_string(), name.to_string())).cloned()
    }

    /// Committed documents of one doctype.
    pub async fn all(&self, doctype: &str) -> Vec<Document> {
        let documents = self.inner.documents.read().await;
        documents
            .iter()
            .filter(|((dt, _), _)| dt == doctype)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn open_transactions(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.inner.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            pending: BTreeMap::new(),
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction {
    inner: Arc<MemoryInner>,
    // None marks a delete
    pending: BTreeMap<Key, Option<Document>>,
}

impl MemoryTransaction {
    async fn current(&self, key: &Key) -> Option<Document> {
        if let Some(pending) = self.pending.get(key) {
            return pending.clone();
        }
        self.inner.documents.read().await.get(key).cloned()
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.inner.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, doctype: &str, name: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.current(&(doctype.to_string(), name.to_string())).await)
    }

    async fn find(&mut self, doctype: &str, filter: &FilterData) -> Result<Vec<Document>, StoreError> {
        filter.validate()?;

        let mut docs: Vec<Document> = {
            let committed = self.inner.documents.read().await;
            committed
                .iter()
                .filter(|(key, _)| key.0 == doctype && !self.pending.contains_key(*key))
                .map(|(_, doc)| doc.clone())
                .collect()
        };
        docs.extend(
            self.pending
                .iter()
                .filter(|(key, _)| key.0 == doctype)
                .filter_map(|(_, doc)| doc.clone()),
        );

        let mut rows: Vec<_> = docs
            .into_iter()
            .map(|doc| doc.to_map())
            .filter(|row| FilterWhere::matches(filter, row))
            .collect();
        FilterWhere::sort(filter, &mut rows);
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }

        Ok(rows.into_iter().map(Document::from_map).collect())
    }

    async fn insert(&mut self, mut doc: Document) -> Result<Document, StoreError> {
        if doc.name.is_empty() {
            doc.name = autoname(&doc.doctype);
        }
        let key = (doc.doctype.clone(), doc.name.clone());
        if self.current(&key).await.is_some() {
            return Err(StoreError::Duplicate {
                doctype: doc.doctype,
                name: doc.name,
            });
        }

        let now = timestamp();
        doc.set("creation", now.clone());
        doc.set("modified", now);
        self.pending.insert(key, Some(doc.clone()));
        Ok(doc)
    }

    async fn update(&mut self, mut doc: Document) -> Result<Document, StoreError> {
        let key = (doc.doctype.clone(), doc.name.clone());
        let existing = self
            .current(&key)
            .await
            .ok_or_else(|| StoreError::not_found(&doc.doctype, &doc.name))?;

        if let Some(creation) = existing.get("creation") {
            doc.fields.entry("creation").or_insert_with(|| creation.clone());
        }
        doc.set("modified", timestamp());
        self.pending.insert(key, Some(doc.clone()));
        Ok(doc)
    }

    async fn delete(&mut self, doctype: &str, name: &str) -> Result<(), StoreError> {
        let key = (doctype.to_string(), name.to_string());
        if self.current(&key).await.is_none() {
            return Err(StoreError::not_found(doctype, name));
        }
        self.pending.insert(key, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        let pending = std::mem::take(&mut this.pending);
        let mut documents = this.inner.documents.write().await;
        for (key, doc) in pending {
            match doc {
                Some(doc) => {
                    documents.insert(key, doc);
                }
                None => {
                    documents.remove(&key);
                }
            }
        }
        this.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
