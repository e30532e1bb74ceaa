//! Generic request handlers shared by every record type.
//!
//! [`Crud`] hands out the five handlers (create, get, get-all, update, delete)
//! for one record type over one [`Store`]. Reads take an optional [`Narrow`]
//! hook that refines the base query from the request (for example "rows of
//! this graph"); create takes a [`Write`] that either inserts directly or
//! defers to a custom write.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::anyhow;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::api::{AppError, RequestContext};
use crate::db::Store;
use crate::error::{LibError, Result};
use crate::models::Record;
use crate::query::Query;
use crate::routes::RouteGroup;

pub type Reply<T> = BoxFuture<'static, std::result::Result<Json<T>, AppError>>;

pub type Body<T> = std::result::Result<Json<T>, JsonRejection>;

pub type NarrowFn = Arc<dyn Fn(Query, &RequestContext) -> Result<Query> + Send + Sync>;

pub type WriteFn<T> = Arc<dyn Fn(Store, T) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Query narrowing for reads.
#[derive(Clone, Default)]
pub enum Narrow {
    /// Get-one looks up the `id` path parameter; get-all returns every row.
    #[default]
    Unscoped,
    /// The hook receives the unfiltered query and returns the one to run.
    Scoped(NarrowFn),
}

impl Narrow {
    pub fn scoped<F>(hook: F) -> Self
    where
        F: Fn(Query, &RequestContext) -> Result<Query> + Send + Sync + 'static,
    {
        Self::Scoped(Arc::new(hook))
    }
}

/// How the create handler persists a decoded record.
#[derive(Clone, Default)]
pub enum Write<T> {
    #[default]
    Insert,
    Custom(WriteFn<T>),
}

impl<T: Record> Write<T> {
    /// The hook performs the write itself and returns the stored record.
    pub fn custom<F, Fut>(hook: F) -> Self
    where
        F: Fn(Store, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self::Custom(Arc::new(move |store: Store, record: T| {
            hook(store, record).boxed()
        }))
    }
}

pub struct Crud<T> {
    store: Store,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Crud<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Crud<T> {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    pub fn create(
        &self,
        write: Write<T>,
    ) -> impl Fn(Body<T>) -> Reply<T> + Clone + Send + Sync + 'static + use<T> {
        let store = self.store.clone();
        move |body: Body<T>| create_record::<T>(store.clone(), write.clone(), body).boxed()
    }

    pub fn get(
        &self,
        narrow: Narrow,
    ) -> impl Fn(RequestContext) -> Reply<T> + Clone + Send + Sync + 'static + use<T> {
        let store = self.store.clone();
        move |ctx: RequestContext| get_record::<T>(store.clone(), narrow.clone(), ctx).boxed()
    }

    pub fn get_all(
        &self,
        narrow: Narrow,
    ) -> impl Fn(RequestContext) -> Reply<Vec<T>> + Clone + Send + Sync + 'static + use<T> {
        let store = self.store.clone();
        move |ctx: RequestContext| list_records::<T>(store.clone(), narrow.clone(), ctx).boxed()
    }

    pub fn update(
        &self,
    ) -> impl Fn(RequestContext, Body<T>) -> Reply<T> + Clone + Send + Sync + 'static + use<T> {
        let store = self.store.clone();
        move |ctx: RequestContext, body: Body<T>| update_record::<T>(store.clone(), ctx, body).boxed()
    }

    pub fn delete(
        &self,
    ) -> impl Fn(RequestContext) -> Reply<T> + Clone + Send + Sync + 'static + use<T> {
        let store = self.store.clone();
        move |ctx: RequestContext| delete_record::<T>(store.clone(), ctx).boxed()
    }
}

/// Group mutator registering the five generated routes for `T`.
pub fn crud<T, S>(store: Store) -> impl FnOnce(RouteGroup<S>) -> RouteGroup<S>
where
    T: Record,
    S: Clone + Send + Sync + 'static,
{
    crud_with::<T, S>(store, Write::Insert)
}

/// Same as [`crud`] with a custom write behind the create route.
pub fn crud_with<T, S>(store: Store, write: Write<T>) -> impl FnOnce(RouteGroup<S>) -> RouteGroup<S>
where
    T: Record,
    S: Clone + Send + Sync + 'static,
{
    move |group: RouteGroup<S>| {
        let handlers = Crud::<T>::new(store);
        group
            .get("", handlers.get_all(Narrow::Unscoped))
            .get("/{id}", handlers.get(Narrow::Unscoped))
            .post("", handlers.create(write))
            .put("/{id}", handlers.update())
            .delete("/{id}", handlers.delete())
    }
}

fn decode_error<T: Record>(rejection: JsonRejection) -> LibError {
    LibError::invalid(
        "Request body could not be decoded",
        anyhow!("invalid {} body: {}", T::NAME, rejection.body_text()),
    )
}

async fn create_record<T: Record>(
    store: Store,
    write: Write<T>,
    body: Body<T>,
) -> std::result::Result<Json<T>, AppError> {
    let Json(record) = body.map_err(decode_error::<T>)?;
    let stored = match write {
        Write::Insert => store.insert(&record).await?,
        Write::Custom(hook) => hook(store, record).await?,
    };
    Ok(Json(stored))
}

async fn get_record<T: Record>(
    store: Store,
    narrow: Narrow,
    ctx: RequestContext,
) -> std::result::Result<Json<T>, AppError> {
    let query = match narrow {
        Narrow::Unscoped => Query::by_id(ctx.id_param("id")?),
        Narrow::Scoped(hook) => hook(Query::all(), &ctx)?,
    };
    Ok(Json(store.find_one(&query).await?))
}

async fn list_records<T: Record>(
    store: Store,
    narrow: Narrow,
    ctx: RequestContext,
) -> std::result::Result<Json<Vec<T>>, AppError> {
    let query = match narrow {
        Narrow::Unscoped => Query::all(),
        Narrow::Scoped(hook) => hook(Query::all(), &ctx)?,
    };
    Ok(Json(store.find_all(&query).await?))
}

async fn update_record<T: Record>(
    store: Store,
    ctx: RequestContext,
    body: Body<T>,
) -> std::result::Result<Json<T>, AppError> {
    let Json(record) = body.map_err(decode_error::<T>)?;
    // The payload's own id decides which row is replaced.
    if ctx.param("id") != Some(record.id().to_string().as_str()) {
        tracing::warn!(
            record = T::NAME,
            path_id = ?ctx.param("id"),
            payload_id = record.id(),
            "update path id does not match payload id"
        );
    }
    Ok(Json(store.save(&record).await?))
}

async fn delete_record<T: Record>(
    store: Store,
    ctx: RequestContext,
) -> std::result::Result<Json<T>, AppError> {
    let id = ctx.id_param("id")?;
    let removed = store.delete::<T>(id).await?;
    tracing::debug!(record = T::NAME, id, "deleted record");
    Ok(Json(removed))
}

#[cfg(test)]
mod tests {
    use axum::Json;

    use super::{Crud, Narrow, Write};
    use crate::api::RequestContext;
    use crate::db::memory_store;
    use crate::error::{ErrorKind, LibError};
    use crate::models::{Graph, Node};

    fn ctx(params: &[(&str, &str)]) -> RequestContext {
        RequestContext::from_params(
            params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
    }

    #[tokio::test]
    async fn created_record_is_readable_until_deleted() {
        let store = memory_store().await;
        let graphs = Crud::<Graph>::new(store);

        let Json(created) = graphs.create(Write::Insert)(Ok(Json(Graph {
            name: "G".to_string(),
            ..Default::default()
        })))
        .await
        .expect("create");
        assert_eq!(created.id, 1);

        let Json(fetched) = graphs.get(Narrow::Unscoped)(ctx(&[("id", "1")]))
            .await
            .expect("get");
        assert_eq!(fetched, created);

        let Json(removed) = graphs.delete()(ctx(&[("id", "1")]))
            .await
            .expect("delete");
        assert_eq!(removed, created);

        let err = graphs.get(Narrow::Unscoped)(ctx(&[("id", "1")]))
            .await
            .expect_err("gone");
        assert_eq!(err.0.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn scoped_get_all_returns_only_matching_rows() {
        let store = memory_store().await;
        for (graph_id, name) in [(1, "a"), (2, "b"), (1, "c"), (3, "d")] {
            store
                .insert(&Node {
                    graph_id,
                    name: name.to_string(),
                    ..Default::default()
                })
                .await
                .expect("insert");
        }
        let nodes = Crud::<Node>::new(store);
        let by_graph = Narrow::scoped(|query, ctx| Ok(query.eq("graph_id", ctx.id_param("gid")?)));

        let Json(scoped) = nodes.get_all(by_graph)(ctx(&[("gid", "1")]))
            .await
            .expect("scoped");
        assert!(scoped.iter().all(|node| node.graph_id == 1));
        assert_eq!(scoped.len(), 2);

        let Json(all) = nodes.get_all(Narrow::Unscoped)(ctx(&[]))
            .await
            .expect("all");
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn custom_write_replaces_direct_insert() {
        let store = memory_store().await;
        let nodes = Crud::<Node>::new(store.clone());
        let upper = Write::custom(|store: crate::db::Store, mut node: Node| async move {
            node.name = node.name.to_uppercase();
            store.insert(&node).await
        });

        let Json(created) = nodes.create(upper)(Ok(Json(Node {
            name: "shout".to_string(),
            ..Default::default()
        })))
        .await
        .expect("create");
        assert_eq!(created.name, "SHOUT");

        let refusing = Write::custom(|_store, _node: Node| async move {
            Err(LibError::message("write refused"))
        });
        let err = nodes.create(refusing)(Ok(Json(Node::default())))
            .await
            .expect_err("refused");
        assert_eq!(err.0.kind, ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn update_uses_payload_id() {
        let store = memory_store().await;
        let graphs = Crud::<Graph>::new(store.clone());
        let first = store
            .insert(&Graph {
                name: "first".to_string(),
                ..Default::default()
            })
            .await
            .expect("insert");

        let Json(updated) = graphs.update()(
            ctx(&[("id", "999")]),
            Ok(Json(Graph {
                id: first.id,
                name: "renamed".to_string(),
                ..Default::default()
            })),
        )
        .await
        .expect("update");

        assert_eq!(updated.id, first.id);
        assert_eq!(updated.name, "renamed");
    }

    #[tokio::test]
    async fn bad_path_id_is_invalid_input() {
        let store = memory_store().await;
        let graphs = Crud::<Graph>::new(store);
        let err = graphs.get(Narrow::Unscoped)(ctx(&[("id", "abc")]))
            .await
            .expect_err("not a number");
        assert_eq!(err.0.kind, ErrorKind::InvalidInput);
    }
}
