//! In-memory [`Store`].

use std::cell::RefCell;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{from_documents, query, to_documents, Collection, Filter, Query, Stage, Store};
use crate::Result;

/// [`Store`] backed by JSON documents held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemStore {
    collections: RefCell<HashMap<Collection, Vec<Value>>>,
}

impl MemStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection's documents.
    pub fn documents(&self, collection: Collection) -> Vec<Value> {
        self.collections
            .borrow()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .borrow()
            .get(&collection)
            .map_or(0, Vec::len)
    }

    /// If a collection is empty.
    pub fn is_empty(&self, collection: Collection) -> bool {
        0 == self.len(collection)
    }
}

impl Store for MemStore {
    async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<T>> {
        from_documents(query.apply(self.documents(collection)))
    }

    async fn get_aggregate<T: DeserializeOwned>(
        &self,
        collection: Collection,
        pipeline: &[Stage],
    ) -> Result<Vec<T>> {
        from_documents(query::aggregate(self.documents(collection), pipeline))
    }

    async fn insert<T: Serialize>(&self, collection: Collection, docs: &[T]) -> Result<usize> {
        let docs = to_documents(docs)?;
        let keys = docs
            .iter()
            .map(|doc| collection.key_of(doc))
            .collect::<Result<Vec<_>>>()?;

        let written = docs.len();

        let mut collections = self.collections.borrow_mut();
        let stored = collections.entry(collection).or_default();
        for (doc, key) in docs.into_iter().zip(keys) {
            let existing = key.as_ref().and_then(|key| {
                stored.iter().position(|old| {
                    collection.key_of(old).ok().flatten().as_ref() == Some(key)
                })
            });
            match existing {
                Some(idx) => stored[idx] = doc,
                None => stored.push(doc),
            }
        }
        Ok(written)
    }

    async fn replace_all<T: Serialize>(&self, collection: Collection, docs: &[T]) -> Result<()> {
        let docs = to_documents(docs)?;
        for doc in docs.iter() {
            collection.key_of(doc)?;
        }
        self.collections.borrow_mut().insert(collection, docs);
        Ok(())
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let mut collections = self.collections.borrow_mut();
        let Some(stored) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|doc| !filter.matches(doc));
        Ok((before - stored.len()) as u64)
    }
}
