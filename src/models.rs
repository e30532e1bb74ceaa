use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::sqlite::SqliteRow;

use crate::query::Value;

pub type RecordId = i64;

/// A row type the generic store and the CRUD handlers can operate on.
///
/// `id` is the primary key of every table. `COLUMNS` lists the remaining
/// columns in the order `values` yields them. An id of `0` means "not yet
/// persisted": inserts leave it to the database sequence.
pub trait Record:
    Serialize
    + DeserializeOwned
    + for<'r> FromRow<'r, SqliteRow>
    + Default
    + Clone
    + fmt::Debug
    + Send
    + Sync
    + Unpin
    + 'static
{
    const NAME: &'static str;
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> RecordId;

    fn values(&self) -> Vec<Value>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Graph {
    pub id: RecordId,
    pub name: String,
    pub is_directory: bool,
    pub parent_id: Option<RecordId>,
}

/// Undirected relation between two graphs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct GraphLink {
    pub id: RecordId,
    pub graph_id_1: RecordId,
    pub graph_id_2: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Node {
    pub id: RecordId,
    pub graph_id: RecordId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub src: String,
}

/// Edge between two nodes of the same graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Link {
    pub id: RecordId,
    pub graph_id: RecordId,
    pub source: RecordId,
    pub target: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct DuplicateNode {
    pub id: RecordId,
    pub node_1: RecordId,
    pub node_2: RecordId,
}

/// Body of the bulk import route, and of its response once ids are assigned.
///
/// On the way in, node ids are ignored and each link's `source`/`target` is a
/// 1-based position in `nodes`. On the way out every id is server-assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportGraphPayload {
    #[serde(alias = "Graph")]
    pub graph: Graph,
    #[serde(alias = "Nodes")]
    pub nodes: Vec<Node>,
    #[serde(alias = "Links")]
    pub links: Vec<Link>,
}

impl Record for Graph {
    const NAME: &'static str = "graph";
    const TABLE: &'static str = "graphs";
    const COLUMNS: &'static [&'static str] = &["name", "is_directory", "parent_id"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.name.clone().into(),
            self.is_directory.into(),
            self.parent_id.into(),
        ]
    }
}

impl Record for GraphLink {
    const NAME: &'static str = "graph_link";
    const TABLE: &'static str = "graph_links";
    const COLUMNS: &'static [&'static str] = &["graph_id_1", "graph_id_2", "kind"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.graph_id_1.into(),
            self.graph_id_2.into(),
            self.kind.clone().into(),
        ]
    }
}

impl Record for Node {
    const NAME: &'static str = "node";
    const TABLE: &'static str = "nodes";
    const COLUMNS: &'static [&'static str] = &["graph_id", "name", "kind", "src"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.graph_id.into(),
            self.name.clone().into(),
            self.kind.clone().into(),
            self.src.clone().into(),
        ]
    }
}

impl Record for Link {
    const NAME: &'static str = "link";
    const TABLE: &'static str = "links";
    const COLUMNS: &'static [&'static str] = &["graph_id", "source", "target", "kind"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.graph_id.into(),
            self.source.into(),
            self.target.into(),
            self.kind.clone().into(),
        ]
    }
}

impl Record for DuplicateNode {
    const NAME: &'static str = "duplicate_node";
    const TABLE: &'static str = "duplicate_nodes";
    const COLUMNS: &'static [&'static str] = &["node_1", "node_2"];

    fn id(&self) -> RecordId {
        self.id
    }

    fn values(&self) -> Vec<Value> {
        vec![self.node_1.into(), self.node_2.into()]
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DuplicateNode, GraphLink, ImportGraphPayload, Link, Node, Record};

    #[test]
    fn type_tag_uses_wire_name() {
        let link = Link {
            id: 4,
            graph_id: 1,
            source: 2,
            target: 3,
            kind: "edge".to_string(),
        };
        let value = serde_json::to_value(&link).expect("serialize link");
        assert_eq!(
            value,
            json!({"id": 4, "graph_id": 1, "source": 2, "target": 3, "type": "edge"})
        );
        let back: Link = serde_json::from_value(value).expect("deserialize link");
        assert_eq!(back, link);
    }

    #[test]
    fn missing_fields_decode_to_defaults() {
        let node: Node = serde_json::from_value(json!({"name": "A"})).expect("node");
        assert_eq!(node.id, 0);
        assert_eq!(node.graph_id, 0);
        assert_eq!(node.name, "A");
        assert!(node.src.is_empty());
    }

    #[test]
    fn graph_link_and_duplicate_keep_numbered_fields() {
        let link: GraphLink =
            serde_json::from_value(json!({"graph_id_1": 1, "graph_id_2": 2, "type": "ref"}))
                .expect("graph link");
        assert_eq!((link.graph_id_1, link.graph_id_2), (1, 2));
        assert_eq!(link.kind, "ref");

        let dup: DuplicateNode =
            serde_json::from_value(json!({"node_1": 5, "node_2": 6})).expect("duplicate");
        assert_eq!((dup.node_1, dup.node_2), (5, 6));
    }

    #[test]
    fn import_payload_accepts_capitalized_keys() {
        let payload: ImportGraphPayload = serde_json::from_value(json!({
            "Graph": {"name": "G"},
            "Nodes": [{"name": "A"}, {"name": "B"}],
            "Links": [{"source": 1, "target": 2, "type": "edge"}]
        }))
        .expect("payload");
        assert_eq!(payload.graph.name, "G");
        assert_eq!(payload.nodes.len(), 2);
        assert_eq!(payload.links[0].target, 2);
    }

    #[test]
    fn column_lists_match_bound_values() {
        let node = Node::default();
        assert_eq!(node.values().len(), Node::COLUMNS.len());
        let link = Link::default();
        assert_eq!(link.values().len(), Link::COLUMNS.len());
        let dup = DuplicateNode::default();
        assert_eq!(dup.values().len(), DuplicateNode::COLUMNS.len());
    }
}
