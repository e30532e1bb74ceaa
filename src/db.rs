use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::error::{LibError, Result};
use crate::models::{Record, RecordId};
use crate::query::{Query, push_value};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub(crate) fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    match err {
        sqlx::Error::RowNotFound => LibError::not_found("Record not found", anyhow!(err)),
        other => LibError::database(public, anyhow!(other)),
    }
}

/// Shared persistence handle. Cloning is cheap; every clone uses the same pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool on `url`, creating the database file if needed.
    ///
    /// An in-memory database lives only as long as its connection, so it is
    /// pinned to a single connection that is never recycled.
    pub async fn open(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|err| LibError::config("Invalid database url", anyhow!(err)))?
            .create_if_missing(true);

        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await
        }
        .map_err(|err| db_err("Failed to open database", err))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    /// First row matching `query`, lowest id first.
    pub async fn find_one<T: Record>(&self, query: &Query) -> Result<T> {
        let mut builder = select_statement::<T>(query);
        builder.push(" ORDER BY id LIMIT 1");
        builder
            .build_query_as::<T>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| db_err("Failed to query record", err))?
            .ok_or_else(|| {
                LibError::not_found(
                    "Record not found",
                    anyhow!("no {} matched {:?}", T::NAME, query),
                )
            })
    }

    pub async fn find_all<T: Record>(&self, query: &Query) -> Result<Vec<T>> {
        let mut builder = select_statement::<T>(query);
        builder.push(" ORDER BY id");
        builder
            .build_query_as::<T>()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| db_err("Failed to query records", err))
    }

    pub async fn insert<T: Record>(&self, record: &T) -> Result<T> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|err| db_err("Failed to acquire connection", err))?;
        insert_record(&mut conn, record).await
    }

    /// Full replace keyed by the record's own id; inserts when the row is absent
    /// or the id is unset.
    pub async fn save<T: Record>(&self, record: &T) -> Result<T> {
        if record.id() == 0 {
            return self.insert(record).await;
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {} (id", T::TABLE));
        for column in T::COLUMNS {
            builder.push(", ").push(*column);
        }
        builder.push(") VALUES (");
        builder.push_bind(record.id());
        for value in record.values() {
            builder.push(", ");
            push_value(&mut builder, value);
        }
        builder.push(") ON CONFLICT(id) DO UPDATE SET ");
        for (idx, column) in T::COLUMNS.iter().enumerate() {
            if idx > 0 {
                builder.push(", ");
            }
            builder.push(format!("{column} = excluded.{column}"));
        }
        builder.push(" RETURNING *");

        builder
            .build_query_as::<T>()
            .fetch_one(&self.pool)
            .await
            .map_err(|err| db_err("Failed to save record", err))
    }

    /// Removes the row and returns what it held.
    pub async fn delete<T: Record>(&self, id: RecordId) -> Result<T> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!("DELETE FROM {}", T::TABLE));
        Query::by_id(id).push_where(&mut builder);
        builder.push(" RETURNING *");

        builder
            .build_query_as::<T>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| db_err("Failed to delete record", err))?
            .ok_or_else(|| {
                LibError::not_found(
                    "Record not found",
                    anyhow!("{} {} does not exist", T::NAME, id),
                )
            })
    }
}

/// Same as [`Store::find_all`] on an open connection or transaction.
pub(crate) async fn fetch_all<T: Record>(
    conn: &mut SqliteConnection,
    query: &Query,
) -> Result<Vec<T>> {
    let mut builder = select_statement::<T>(query);
    builder.push(" ORDER BY id");
    builder
        .build_query_as::<T>()
        .fetch_all(&mut *conn)
        .await
        .map_err(|err| db_err("Failed to query records", err))
}

fn select_statement<T: Record>(query: &Query) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::new(format!("SELECT * FROM {}", T::TABLE));
    query.push_where(&mut builder);
    builder
}

/// Inserts on an open connection or transaction. An unset id is assigned by
/// the table's autoincrement sequence, which is the only id allocator.
pub(crate) async fn insert_record<T: Record>(
    conn: &mut SqliteConnection,
    record: &T,
) -> Result<T> {
    let with_id = record.id() != 0;
    let mut builder = QueryBuilder::<Sqlite>::new(format!("INSERT INTO {} (", T::TABLE));
    if with_id {
        builder.push("id, ");
    }
    builder.push(T::COLUMNS.join(", "));
    builder.push(") VALUES (");
    if with_id {
        builder.push_bind(record.id()).push(", ");
    }
    for (idx, value) in record.values().into_iter().enumerate() {
        if idx > 0 {
            builder.push(", ");
        }
        push_value(&mut builder, value);
    }
    builder.push(") RETURNING *");

    builder
        .build_query_as::<T>()
        .fetch_one(&mut *conn)
        .await
        .map_err(|err| db_err("Failed to insert record", err))
}

#[cfg(test)]
pub(crate) async fn memory_store() -> Store {
    let store = Store::open("sqlite::memory:", 1)
        .await
        .expect("open in-memory store");
    store.migrate().await.expect("run migrations");
    store
}

#[cfg(test)]
mod tests {
    use super::memory_store;
    use crate::error::ErrorKind;
    use crate::models::{Graph, GraphLink, Node};
    use crate::query::Query;

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = memory_store().await;
        let first = store
            .insert(&Graph {
                name: "first".to_string(),
                ..Default::default()
            })
            .await
            .expect("insert first");
        let second = store
            .insert(&Graph {
                name: "second".to_string(),
                is_directory: true,
                parent_id: Some(first.id),
                ..Default::default()
            })
            .await
            .expect("insert second");

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(second.parent_id, Some(1));
        assert!(second.is_directory);
    }

    #[tokio::test]
    async fn find_one_reports_missing_rows_as_not_found() {
        let store = memory_store().await;
        let err = store
            .find_one::<Node>(&Query::by_id(42))
            .await
            .expect_err("row should be missing");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn save_replaces_existing_row() {
        let store = memory_store().await;
        let node = store
            .insert(&Node {
                graph_id: 1,
                name: "before".to_string(),
                kind: "concept".to_string(),
                src: "{}".to_string(),
                ..Default::default()
            })
            .await
            .expect("insert");

        let replaced = store
            .save(&Node {
                id: node.id,
                graph_id: 1,
                name: "after".to_string(),
                ..Default::default()
            })
            .await
            .expect("save");

        assert_eq!(replaced.id, node.id);
        assert_eq!(replaced.name, "after");
        assert!(replaced.kind.is_empty());
        let all = store.find_all::<Node>(&Query::all()).await.expect("all");
        assert_eq!(all, vec![replaced]);
    }

    #[tokio::test]
    async fn save_with_unknown_id_inserts_under_that_id() {
        let store = memory_store().await;
        let saved = store
            .save(&GraphLink {
                id: 10,
                graph_id_1: 1,
                graph_id_2: 2,
                kind: "see_also".to_string(),
            })
            .await
            .expect("save");
        assert_eq!(saved.id, 10);
        let fetched: GraphLink = store.find_one(&Query::by_id(10)).await.expect("fetch");
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn delete_returns_removed_row() {
        let store = memory_store().await;
        let graph = store
            .insert(&Graph {
                name: "doomed".to_string(),
                ..Default::default()
            })
            .await
            .expect("insert");

        let removed: Graph = store.delete(graph.id).await.expect("delete");
        assert_eq!(removed, graph);

        let again = store
            .delete::<Graph>(graph.id)
            .await
            .expect_err("second delete");
        assert_eq!(again.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn find_all_applies_filters() {
        let store = memory_store().await;
        for (graph_id, name) in [(1, "a"), (2, "b"), (1, "c")] {
            store
                .insert(&Node {
                    graph_id,
                    name: name.to_string(),
                    ..Default::default()
                })
                .await
                .expect("insert");
        }

        let scoped: Vec<Node> = store
            .find_all(&Query::all().eq("graph_id", 1_i64))
            .await
            .expect("scoped");
        let names: Vec<&str> = scoped.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
