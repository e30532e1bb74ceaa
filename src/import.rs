//! Bulk graph import.
//!
//! A client builds a self-contained graph with positional placeholders: link
//! `source`/`target` values are 1-based indices into the node list. The import
//! persists the root graph, then every node, then every link with its endpoints
//! rewritten to the ids the nodes received. All of it happens in one
//! transaction, and ids come from each table's autoincrement sequence, so
//! concurrent imports never hand out the same id twice.

use std::collections::HashSet;

use anyhow::anyhow;
use sqlx::SqliteConnection;

use crate::db::{Store, db_err, fetch_all, insert_record};
use crate::error::{LibError, Result};
use crate::models::{ImportGraphPayload, Link, Node, RecordId};
use crate::query::Query;

/// Checks every link placeholder against the node list before anything is written.
pub fn check_link_references(payload: &ImportGraphPayload) -> Result<()> {
    let node_count = payload.nodes.len() as RecordId;
    for (idx, link) in payload.links.iter().enumerate() {
        for placeholder in [link.source, link.target] {
            if !(1..=node_count).contains(&placeholder) {
                return Err(LibError::invalid_with_code(
                    "import_unknown_node_reference",
                    "Link references a node position outside the import",
                    anyhow!(
                        "link {} references node position {} but the import has {} nodes",
                        idx + 1,
                        placeholder,
                        node_count
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Placeholder position to allocated id, filled in node order.
#[derive(Debug, Clone, Default)]
pub struct NodeIdMap {
    allocated: Vec<RecordId>,
}

impl NodeIdMap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocated: Vec::with_capacity(capacity),
        }
    }

    /// Records the id given to the next node in input order.
    pub fn push(&mut self, id: RecordId) {
        self.allocated.push(id);
    }

    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }

    pub fn resolve(&self, placeholder: RecordId) -> Result<RecordId> {
        usize::try_from(placeholder)
            .ok()
            .and_then(|position| position.checked_sub(1))
            .and_then(|idx| self.allocated.get(idx).copied())
            .ok_or_else(|| {
                LibError::invalid_with_code(
                    "import_unknown_node_reference",
                    "Link references a node position outside the import",
                    anyhow!("node position {} has no allocated id", placeholder),
                )
            })
    }

    /// Rewrites a link's placeholder endpoints to allocated node ids.
    pub fn rewrite(&self, mut link: Link) -> Result<Link> {
        link.source = self.resolve(link.source)?;
        link.target = self.resolve(link.target)?;
        Ok(link)
    }
}

pub async fn import_graph(store: &Store, payload: ImportGraphPayload) -> Result<ImportGraphPayload> {
    check_link_references(&payload)?;
    let ImportGraphPayload {
        mut graph,
        nodes,
        links,
    } = payload;

    let mut tx = store
        .pool()
        .begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))?;

    graph.id = 0;
    let graph = insert_record(&mut tx, &graph).await?;

    let mut node_ids = NodeIdMap::with_capacity(nodes.len());
    let mut stored_nodes = Vec::with_capacity(nodes.len());
    for node in nodes {
        let node = Node {
            id: 0,
            graph_id: graph.id,
            ..node
        };
        let stored = insert_record(&mut tx, &node).await?;
        node_ids.push(stored.id);
        stored_nodes.push(stored);
    }

    let mut stored_links = Vec::with_capacity(links.len());
    for link in links {
        let link = node_ids.rewrite(Link {
            id: 0,
            graph_id: graph.id,
            ..link
        })?;
        stored_links.push(insert_record(&mut tx, &link).await?);
    }

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;

    tracing::info!(
        graph_id = graph.id,
        nodes = stored_nodes.len(),
        links = stored_links.len(),
        "imported graph"
    );

    Ok(ImportGraphPayload {
        graph,
        nodes: stored_nodes,
        links: stored_links,
    })
}

/// Inserts a single link whose endpoints must be nodes of the link's own graph.
///
/// The insert comes first so the transaction holds the write lock while the
/// endpoints are checked; a node deleted concurrently cannot slip in between.
/// A rejected link is rolled back, sequence included.
pub async fn insert_link(store: &Store, link: &Link) -> Result<Link> {
    let mut tx = store
        .pool()
        .begin()
        .await
        .map_err(|err| db_err("Failed to start transaction", err))?;

    let stored = insert_record(&mut tx, link).await?;
    ensure_link_endpoints(&mut tx, &stored).await?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit transaction", err))?;
    Ok(stored)
}

/// Both endpoints must be existing nodes of the link's own graph.
pub(crate) async fn ensure_link_endpoints(conn: &mut SqliteConnection, link: &Link) -> Result<()> {
    let endpoints: Vec<Node> = fetch_all(
        conn,
        &Query::all()
            .eq("graph_id", link.graph_id)
            .is_in("id", [link.source, link.target]),
    )
    .await?;

    let found: HashSet<RecordId> = endpoints.iter().map(|node| node.id).collect();
    for endpoint in [link.source, link.target] {
        if !found.contains(&endpoint) {
            return Err(LibError::invalid_with_code(
                "link_endpoint_mismatch",
                "Link endpoints must be nodes of the same graph",
                anyhow!(
                    "node {} is not part of graph {}",
                    endpoint,
                    link.graph_id
                ),
            ));
        }
    }
    Ok(())
}
