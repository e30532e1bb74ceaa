#[cfg(feature = "api")]
pub mod api;
pub mod config;
#[cfg(feature = "api")]
pub mod crud;
pub mod db;
pub mod discovery;
pub mod error;
pub mod import;
pub mod models;
pub mod query;
#[cfg(feature = "api")]
pub mod routes;

pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, RequestContext, app, routes};
    pub use crate::config::{Config, DatabaseConfig};
    #[cfg(feature = "api")]
    pub use crate::crud::{Crud, Narrow, Write, crud, crud_with};
    pub use crate::db::{MIGRATOR, Store};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::import::{NodeIdMap, check_link_references, import_graph, insert_link};
    pub use crate::models::{
        DuplicateNode, Graph, GraphLink, ImportGraphPayload, Link, Node, Record, RecordId,
    };
    pub use crate::query::{Query, Value};
    #[cfg(feature = "api")]
    pub use crate::routes::{ApiBuilder, RouteGroup, Verb};
}
