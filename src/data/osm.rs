use std::{collections::HashMap, fmt, str::FromStr};

use rust_decimal::Decimal;

use crate::errors::{Error, Result};
use crate::graph::ResultGraph;

pub type OsmId = i64;

/// Tag key -> value. Keys are unique, order carries no meaning.
pub type Tags = HashMap<String, String>;

/// Wire attributes that are not modelled explicitly (version, timestamp, user, ...),
/// kept as the text the server sent.
pub type Attributes = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub const ALL: [ElementKind; 3] = [ElementKind::Node, ElementKind::Way, ElementKind::Relation];

    /// Name used on the wire and in query text.
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }

    /// Case-insensitive lookup of a wire type name.
    pub fn from_wire(value: &str) -> Option<ElementKind> {
        ElementKind::ALL
            .into_iter()
            .find(|kind| value.eq_ignore_ascii_case(kind.as_str()))
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: OsmId,
    pub lat: Decimal,
    pub lon: Decimal,
    pub tags: Tags,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: OsmId,
    pub node_ids: Vec<OsmId>,
    pub tags: Tags,
    pub attributes: Attributes,
}

impl Way {
    /// Nodes of this way as far as `graph` already holds them. Never touches the network;
    /// use [`ResultGraph::way_nodes`] to fill gaps.
    pub fn nodes<'g>(&self, graph: &'g ResultGraph) -> Result<Vec<&'g Node>> {
        self.node_ids
            .iter()
            .map(|id| {
                graph
                    .node(*id)
                    .ok_or_else(|| Error::incomplete(format!("node {id} of way {} is not in the result", self.id)))
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.node_ids.len() > 1 && self.node_ids.first() == self.node_ids.last()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: OsmId,
    pub members: Vec<RelationMember>,
    pub tags: Tags,
    pub attributes: Attributes,
}

/// Target of a relation member. The set of kinds is fixed by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRef {
    Node(OsmId),
    Way(OsmId),
    Relation(OsmId),
}

impl MemberRef {
    pub fn new(kind: ElementKind, id: OsmId) -> MemberRef {
        match kind {
            ElementKind::Node => MemberRef::Node(id),
            ElementKind::Way => MemberRef::Way(id),
            ElementKind::Relation => MemberRef::Relation(id),
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            MemberRef::Node(_) => ElementKind::Node,
            MemberRef::Way(_) => ElementKind::Way,
            MemberRef::Relation(_) => ElementKind::Relation,
        }
    }

    pub fn id(&self) -> OsmId {
        match *self {
            MemberRef::Node(id) | MemberRef::Way(id) | MemberRef::Relation(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationMember {
    pub target: MemberRef,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Element {
    pub fn id(&self) -> OsmId {
        match self {
            Element::Node(node) => node.id,
            Element::Way(way) => way.id,
            Element::Relation(relation) => relation.id,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Node(_) => ElementKind::Node,
            Element::Way(_) => ElementKind::Way,
            Element::Relation(_) => ElementKind::Relation,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Element::Node(node) => &node.tags,
            Element::Way(way) => &way.tags,
            Element::Relation(relation) => &relation.tags,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Element::Node(node) => &node.attributes,
            Element::Way(way) => &way.attributes,
            Element::Relation(relation) => &relation.attributes,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags().get(key).map(String::as_str)
    }
}

impl From<Node> for Element {
    fn from(value: Node) -> Self {
        Element::Node(value)
    }
}

impl From<Way> for Element {
    fn from(value: Way) -> Self {
        Element::Way(value)
    }
}

impl From<Relation> for Element {
    fn from(value: Relation) -> Self {
        Element::Relation(value)
    }
}

pub(crate) fn parse_id(field: &str, text: &str) -> Result<OsmId> {
    text.trim()
        .parse()
        .map_err(|_| Error::invalid_number(field, text))
}

/// Coordinates keep the exact digits the server sent, including trailing zeros.
pub(crate) fn parse_coordinate(field: &str, text: &str) -> Result<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|_| Error::invalid_number(field, text))
}
