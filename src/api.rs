use std::collections::HashMap;

use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, rejection::JsonRejection},
    http::{HeaderName, Method, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::crud::{Crud, Narrow, Write, crud, crud_with};
use crate::db::Store;
use crate::error::{ErrorKind, LibError};
use crate::import::{import_graph, insert_link};
use crate::models::{DuplicateNode, Graph, GraphLink, ImportGraphPayload, Link, Node, RecordId};
use crate::routes::ApiBuilder;

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Config | ErrorKind::Database | ErrorKind::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "kg api request failed");
        } else {
            tracing::warn!(kind = ?self.0.kind, code = self.0.code, error = %self.0.source, "kg api request rejected");
        }
        (status, self.0.public).into_response()
    }
}

/// Path parameters of the matched route, by name.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    params: HashMap<String, String>,
}

impl RequestContext {
    pub fn from_params(params: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            params: params.into_iter().collect(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn id_param(&self, name: &str) -> Result<RecordId, LibError> {
        let raw = self.param(name).ok_or_else(|| {
            LibError::invalid(
                "Missing path parameter",
                anyhow!("route has no `{}` parameter", name),
            )
        })?;
        raw.parse().map_err(|err| {
            LibError::invalid(
                "Path parameter must be an integer id",
                anyhow!("`{}` = {:?}: {}", name, raw, err),
            )
        })
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = Option::<Path<HashMap<String, String>>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                LibError::invalid(
                    "Invalid path parameters",
                    anyhow!(rejection.body_text()),
                )
            })?;
        Ok(Self {
            params: params.map(|Path(params)| params).unwrap_or_default(),
        })
    }
}

fn by_column(column: &'static str, param: &'static str) -> Narrow {
    Narrow::scoped(move |query, ctx| Ok(query.eq(column, ctx.id_param(param)?)))
}

fn checked_link_write() -> Write<Link> {
    Write::custom(|store: Store, link: Link| async move { insert_link(&store, &link).await })
}

async fn new_kg_handler(
    store: Store,
    body: Result<Json<ImportGraphPayload>, JsonRejection>,
) -> Result<Json<ImportGraphPayload>, AppError> {
    let Json(payload) = body.map_err(|rejection| {
        LibError::invalid(
            "Import body could not be decoded",
            anyhow!(rejection.body_text()),
        )
    })?;
    Ok(Json(import_graph(&store, payload).await?))
}

/// Every route group of the service, unlayered.
pub fn routes<S>(store: Store) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = Router::new();

    let graphs = Crud::<Graph>::new(store.clone());
    let import_store = store.clone();
    let router = ApiBuilder::new()
        .with(crud::<Graph, S>(store.clone()))
        .with(move |group| {
            group
                .get("/by_parent/{pid}", graphs.get_all(by_column("parent_id", "pid")))
                .post(
                    "/new_kg",
                    move |body: Result<Json<ImportGraphPayload>, JsonRejection>| {
                        new_kg_handler(import_store.clone(), body)
                    },
                )
        })
        .attach(router, "/graph");

    let graph_links = Crud::<GraphLink>::new(store.clone());
    let router = ApiBuilder::new()
        .with(crud::<GraphLink, S>(store.clone()))
        .with(move |group| {
            group.get(
                "/by_graph/{gid}",
                graph_links.get_all(Narrow::scoped(|query, ctx| {
                    Ok(query.any_eq(&["graph_id_1", "graph_id_2"], ctx.id_param("gid")?))
                })),
            )
        })
        .attach(router, "/graph_link");

    let nodes = Crud::<Node>::new(store.clone());
    let router = ApiBuilder::new()
        .with(crud::<Node, S>(store.clone()))
        .with(move |group| group.get("/by_graph/{gid}", nodes.get_all(by_column("graph_id", "gid"))))
        .attach(router, "/node");

    let links = Crud::<Link>::new(store.clone());
    let router = ApiBuilder::new()
        .with(crud_with::<Link, S>(store.clone(), checked_link_write()))
        .with(move |group| group.get("/by_graph/{gid}", links.get_all(by_column("graph_id", "gid"))))
        .attach(router, "/link");

    // The first segment shares the generated `{id}` name; it selects `node_1`.
    let duplicates = Crud::<DuplicateNode>::new(store.clone());
    ApiBuilder::new()
        .with(crud::<DuplicateNode, S>(store))
        .with(move |group| {
            group.get(
                "/{id}/{node_2}",
                duplicates.get(Narrow::scoped(|query, ctx| {
                    Ok(query
                        .eq("node_1", ctx.id_param("id")?)
                        .eq("node_2", ctx.id_param("node_2")?))
                })),
            )
        })
        .attach(router, "/duplicated")
}

/// The full application: routes plus CORS and request tracing.
pub fn app(store: Store) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            HeaderName::from_static("x-csrf-token"),
            header::AUTHORIZATION,
            header::ORIGIN,
        ]);

    routes(store)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::{AppError, RequestContext};
    use crate::error::{ErrorKind, LibError};

    #[test]
    fn error_kinds_map_to_status_classes() {
        let cases = [
            (LibError::invalid("bad", anyhow::anyhow!("bad")), StatusCode::BAD_REQUEST),
            (LibError::not_found("gone", anyhow::anyhow!("gone")), StatusCode::NOT_FOUND),
            (
                LibError::database("db", anyhow::anyhow!("db")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (LibError::message("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError(err).into_response().status(), status);
        }
    }

    #[test]
    fn id_param_requires_an_integer() {
        let ctx = RequestContext::from_params([("id".to_string(), "12".to_string())]);
        assert_eq!(ctx.id_param("id").expect("parsed"), 12);

        let missing = ctx.id_param("gid").expect_err("missing");
        assert_eq!(missing.kind, ErrorKind::InvalidInput);

        let junk = RequestContext::from_params([("id".to_string(), "x".to_string())]);
        assert_eq!(
            junk.id_param("id").expect_err("junk").kind,
            ErrorKind::InvalidInput
        );
    }
}
