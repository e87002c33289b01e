//! [`Store`] over Cloudflare D1. Must be kept in sync with migrations.
//!
//! Each [`Collection`] is a table of `(key TEXT UNIQUE, doc TEXT)`, `doc` holding the document
//! as JSON. `key` is `NULL` in unkeyed collections.

use apexdata::store::query::{aggregate, Query, Stage};
use apexdata::store::{from_documents, to_documents, Collection, Filter, Store};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use serde_with::json::JsonString;
use serde_with::serde_as;
use worker::{query, D1Database, D1PreparedStatement, Result};

/// One stored document.
#[serde_as]
#[derive(Debug, serde::Deserialize)]
struct DocRow {
    /// SQLite row ID.
    rowid: i64,
    /// TEXT field containing a JSON document.
    #[serde_as(as = "JsonString")]
    doc: Value,
}

fn persistence(error: worker::Error) -> apexdata::Error {
    apexdata::Error::Persistence(error.to_string())
}

/// D1-backed [`Store`].
pub struct D1Store {
    db: D1Database,
}

impl D1Store {
    /// Wrap a D1 binding.
    pub fn new(db: D1Database) -> Self {
        Self { db }
    }

    // TODO(apexdata): push simple `Filter` conditions down as `json_extract` WHERE clauses
    // instead of filtering every row in the worker.
    async fn rows(&self, collection: Collection) -> Result<Vec<DocRow>> {
        let query = query!(
            &self.db,
            format!("SELECT rowid, doc FROM {} ORDER BY rowid", collection.name())
        );
        query.all().await?.results()
    }

    async fn documents(&self, collection: Collection) -> Result<Vec<Value>> {
        let rows = self.rows(collection).await?;
        Ok(rows.into_iter().map(|row| row.doc).collect())
    }

    fn insert_statements(
        &self,
        collection: Collection,
        docs: Vec<Value>,
    ) -> apexdata::Result<Vec<D1PreparedStatement>> {
        let table = collection.name();
        docs.into_iter()
            .map(|doc| {
                let key = collection.key_of(&doc)?;
                let doc = doc.to_string();
                let statement = match key {
                    Some(key) => query!(
                        &self.db,
                        format!(
                            "INSERT INTO {}(key, doc) VALUES (?1, ?2)
                            ON CONFLICT(key) DO UPDATE SET doc = excluded.doc",
                            table
                        ),
                        key,
                        doc,
                    ),
                    None => query!(
                        &self.db,
                        format!("INSERT INTO {}(doc) VALUES (?1)", table),
                        doc,
                    ),
                };
                statement.map_err(persistence)
            })
            .collect()
    }
}

impl Store for D1Store {
    async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        query: &Query,
    ) -> apexdata::Result<Vec<T>> {
        let docs = self.documents(collection).await.map_err(persistence)?;
        from_documents(query.apply(docs))
    }

    async fn get_aggregate<T: DeserializeOwned>(
        &self,
        collection: Collection,
        pipeline: &[Stage],
    ) -> apexdata::Result<Vec<T>> {
        let docs = self.documents(collection).await.map_err(persistence)?;
        from_documents(aggregate(docs, pipeline))
    }

    async fn insert<T: Serialize>(
        &self,
        collection: Collection,
        docs: &[T],
    ) -> apexdata::Result<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        let statements = self.insert_statements(collection, to_documents(docs)?)?;
        let written = statements.len();
        self.db.batch(statements).await.map_err(persistence)?;
        log::debug!("Upserted {} rows into `{}`.", written, collection.name());
        Ok(written)
    }

    async fn replace_all<T: Serialize>(
        &self,
        collection: Collection,
        docs: &[T],
    ) -> apexdata::Result<()> {
        let clear = query!(&self.db, format!("DELETE FROM {}", collection.name()));
        let inserts = self.insert_statements(collection, to_documents(docs)?)?;
        // D1 runs a batch as one transaction.
        let statements = std::iter::once(clear).chain(inserts).collect::<Vec<_>>();
        self.db.batch(statements).await.map_err(persistence)?;
        log::debug!("Replaced `{}` with {} rows.", collection.name(), docs.len());
        Ok(())
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> apexdata::Result<u64> {
        let rows = self.rows(collection).await.map_err(persistence)?;
        let statements = rows
            .into_iter()
            .filter(|row| filter.matches(&row.doc))
            .map(|row| {
                query!(
                    &self.db,
                    format!("DELETE FROM {} WHERE rowid = ?1", collection.name()),
                    row.rowid,
                )
                .map_err(persistence)
            })
            .collect::<apexdata::Result<Vec<_>>>()?;
        let deleted = statements.len() as u64;
        if 0 < deleted {
            self.db.batch(statements).await.map_err(persistence)?;
        }
        log::debug!("Deleted {} rows from `{}`.", deleted, collection.name());
        Ok(deleted)
    }
}
