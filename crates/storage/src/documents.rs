use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error;
use tracing::debug;

use storefront_core::{
    Collection, DocumentId, IdGenerator, Page, PageRequest, SortOrder, Stored,
};

use crate::to_rfc3339;

const SELECT_COLUMNS: &str = "SELECT id, body_json, created_at, updated_at FROM documents";

/// Predicate evaluated against the JSON body of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListFilter {
    /// The array at `path` holds `value`.
    ArrayContains { path: &'static str, value: String },
    /// The scalar at `path` equals `value`.
    Equals {
        path: &'static str,
        value: FilterValue,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    Text(String),
    Bool(bool),
}

/// Repository over the documents of one collection.
pub struct DocumentRepository<T> {
    pool: SqlitePool,
    ids: Arc<IdGenerator>,
    _collection: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            ids: Arc::clone(&self.ids),
            _collection: PhantomData,
        }
    }
}

impl<T: Collection> DocumentRepository<T> {
    pub(crate) fn new(pool: SqlitePool, ids: Arc<IdGenerator>) -> Self {
        Self {
            pool,
            ids,
            _collection: PhantomData,
        }
    }

    /// Stores a new document under a freshly generated id.
    pub async fn insert(&self, body: T, now: DateTime<Utc>) -> Result<Stored<T>, DocumentError> {
        let now = now.trunc_subsecs(3);
        let id = self.ids.next_id(now);
        let body_json = encode(&body)?;

        sqlx::query(
            "INSERT INTO documents (collection, id, body_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(T::NAME)
        .bind(id.as_str())
        .bind(&body_json)
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .execute(&self.pool)
        .await?;

        debug!(stage = "storage", collection = T::NAME, %id, "document inserted");
        Ok(Stored {
            id,
            created_at: now,
            updated_at: now,
            body,
        })
    }

    pub async fn get(&self, id: &DocumentId) -> Result<Option<Stored<T>>, DocumentError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "{SELECT_COLUMNS} WHERE collection = ? AND id = ?"
        ))
        .bind(T::NAME)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DocumentRow::decode).transpose()
    }

    /// Loads several documents, returned in the order of `ids`. Unknown ids are skipped.
    pub async fn get_many(&self, ids: &[DocumentId]) -> Result<Vec<Stored<T>>, DocumentError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" WHERE collection = ").push_bind(T::NAME);
        push_id_list(&mut builder, ids);
        let rows = builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let stored = row.decode()?;
            by_id.insert(stored.id.clone(), stored);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Returns the ids from `ids` that have no document in this collection.
    pub async fn missing(&self, ids: &[DocumentId]) -> Result<Vec<DocumentId>, DocumentError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM documents");
        builder.push(" WHERE collection = ").push_bind(T::NAME);
        push_id_list(&mut builder, ids);
        let found: Vec<String> = builder
            .build()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.get::<String, _>("id"))
            .collect();

        Ok(ids
            .iter()
            .filter(|id| !found.iter().any(|value| value == id.as_str()))
            .cloned()
            .collect())
    }

    /// Replaces the body of an existing document. Returns `None` when it does not exist.
    pub async fn update(
        &self,
        id: &DocumentId,
        body: T,
        now: DateTime<Utc>,
    ) -> Result<Option<Stored<T>>, DocumentError> {
        let now = now.trunc_subsecs(3);
        let body_json = encode(&body)?;

        let row = sqlx::query(
            "UPDATE documents SET body_json = ?, updated_at = ? \
             WHERE collection = ? AND id = ? \
             RETURNING created_at",
        )
        .bind(&body_json)
        .bind(to_rfc3339(now))
        .bind(T::NAME)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(Some(Stored {
            id: id.clone(),
            created_at,
            updated_at: now,
            body,
        }))
    }

    /// Creates or replaces the document stored under a fixed id.
    pub async fn upsert(
        &self,
        id: &DocumentId,
        body: T,
        now: DateTime<Utc>,
    ) -> Result<Stored<T>, DocumentError> {
        let now = now.trunc_subsecs(3);
        let body_json = encode(&body)?;

        let row = sqlx::query(
            "INSERT INTO documents (collection, id, body_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(collection, id) DO UPDATE \
             SET body_json = excluded.body_json, updated_at = excluded.updated_at \
             RETURNING created_at",
        )
        .bind(T::NAME)
        .bind(id.as_str())
        .bind(&body_json)
        .bind(to_rfc3339(now))
        .bind(to_rfc3339(now))
        .fetch_one(&self.pool)
        .await?;

        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        Ok(Stored {
            id: id.clone(),
            created_at,
            updated_at: now,
            body,
        })
    }

    /// Deletes a document, returning whether it existed.
    pub async fn delete(&self, id: &DocumentId) -> Result<bool, DocumentError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(T::NAME)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lists one page of documents strictly after the request cursor.
    pub async fn list(
        &self,
        request: &PageRequest,
        filters: &[ListFilter],
    ) -> Result<Page<Stored<T>>, DocumentError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" WHERE collection = ").push_bind(T::NAME);
        if let Some(cursor) = &request.cursor {
            let op = match request.sort {
                SortOrder::Desc => " AND id < ",
                SortOrder::Asc => " AND id > ",
            };
            builder.push(op).push_bind(cursor.as_str().to_string());
        }
        push_filters(&mut builder, filters);
        let direction = match request.sort {
            SortOrder::Desc => " ORDER BY id DESC",
            SortOrder::Asc => " ORDER BY id ASC",
        };
        builder
            .push(direction)
            .push(" LIMIT ")
            .push_bind(i64::from(request.fetch_limit()));

        let rows = builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        let documents = rows
            .into_iter()
            .map(DocumentRow::decode)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::from_overfetch(documents, request.limit, |doc| &doc.id))
    }

    /// Lists every matching document in creation order. Meant for small collections.
    pub async fn list_all(&self, filters: &[ListFilter]) -> Result<Vec<Stored<T>>, DocumentError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" WHERE collection = ").push_bind(T::NAME);
        push_filters(&mut builder, filters);
        builder.push(" ORDER BY id ASC");

        builder
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DocumentRow::decode)
            .collect()
    }

    pub async fn count(&self) -> Result<u64, DocumentError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(T::NAME)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[DocumentId]) {
    builder.push(" AND id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str().to_string());
    }
    separated.push_unseparated(")");
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &[ListFilter]) {
    for filter in filters {
        match filter {
            ListFilter::ArrayContains { path, value } => {
                builder
                    .push(" AND EXISTS (SELECT 1 FROM json_each(documents.body_json, ")
                    .push_bind(*path)
                    .push(") AS item WHERE item.value = ")
                    .push_bind(value.clone())
                    .push(")");
            }
            ListFilter::Equals { path, value } => {
                builder
                    .push(" AND json_extract(documents.body_json, ")
                    .push_bind(*path)
                    .push(") = ");
                match value {
                    FilterValue::Text(text) => builder.push_bind(text.clone()),
                    FilterValue::Bool(flag) => builder.push_bind(i64::from(*flag)),
                };
            }
        }
    }
}

fn encode<T: Collection>(body: &T) -> Result<String, DocumentError> {
    serde_json::to_string(body).map_err(DocumentError::Encode)
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    body_json: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn decode<T: Collection>(self) -> Result<Stored<T>, DocumentError> {
        let body = serde_json::from_str(&self.body_json).map_err(|source| DocumentError::Decode {
            collection: T::NAME,
            id: self.id.clone(),
            source,
        })?;
        Ok(Stored {
            id: DocumentId::from_storage(self.id),
            created_at: self.created_at,
            updated_at: self.updated_at,
            body,
        })
    }
}

/// Errors raised by [`DocumentRepository`] operations.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to encode document body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode {collection} document {id}: {source}")]
    Decode {
        collection: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
