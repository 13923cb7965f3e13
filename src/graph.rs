//! Result graph: decoded elements indexed by kind and id, completed on demand.

use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{info, warn};

use crate::client::backoff::CancelToken;
use crate::codec::{self, ResponseFormat, XmlStrategy};
use crate::data::osm::{Element, ElementKind, MemberRef, Node, OsmId, Relation, RelationMember, Way};
use crate::data::{Bounds, DecodedBatch};
use crate::errors::{Error, Result};

/// Something that can answer a follow-up query. [`crate::Overpass`] is the real one.
pub trait QueryRunner: Send + Sync {
    fn run_query(&self, query: &str, cancel: &CancelToken) -> Result<ResultGraph>;
}

/// `[out:json]` query fetching one element by id.
pub fn single_object_query(kind: ElementKind, id: OsmId) -> String {
    format!("[out:json];\n{kind}({id});\nout body;\n")
}

/// `[out:json]` query fetching every node of one way.
pub fn way_nodes_query(way_id: OsmId) -> String {
    format!("[out:json];\nway({way_id});\nnode(w);\nout body;\n")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResolvedElement<'g> {
    Node(&'g Node),
    Way(&'g Way),
    Relation(&'g Relation),
}

impl ResolvedElement<'_> {
    pub fn id(&self) -> OsmId {
        match self {
            ResolvedElement::Node(node) => node.id,
            ResolvedElement::Way(way) => way.id,
            ResolvedElement::Relation(relation) => relation.id,
        }
    }
}

/// Elements are owned here and refer to each other by id only. Inserting an id that is
/// already present does nothing, so repeated resolution of the same reference is harmless.
#[derive(Clone, Default)]
pub struct ResultGraph {
    nodes: IndexMap<OsmId, Node>,
    ways: IndexMap<OsmId, Way>,
    relations: IndexMap<OsmId, Relation>,
    declared_bounds: Option<Bounds>,
    remarks: Vec<String>,
    bounds: OnceCell<Bounds>,
    resolver: Option<Arc<dyn QueryRunner>>,
    cancel: CancelToken,
}

impl fmt::Debug for ResultGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultGraph")
            .field("nodes", &self.nodes.len())
            .field("ways", &self.ways.len())
            .field("relations", &self.relations.len())
            .field("declared_bounds", &self.declared_bounds)
            .field("remarks", &self.remarks)
            .field("resolver", &self.resolver.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ResultGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let mut graph = Self::new();
        for element in elements {
            graph.append(element);
        }
        graph
    }

    pub fn from_batch(batch: DecodedBatch) -> Self {
        for remark in &batch.remarks {
            warn!(remark = remark.as_str(); "Server remark in response");
        }
        let mut graph = Self::from_elements(batch.elements);
        graph.declared_bounds = batch.bounds;
        graph.remarks = batch.remarks;
        graph
    }

    /// Decodes a response body without any client attached.
    pub fn decode(body: &[u8], format: ResponseFormat, strategy: XmlStrategy) -> Result<Self> {
        Ok(Self::from_batch(codec::decode(body, format, strategy)?))
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn QueryRunner>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Token observed by follow-up queries of this graph. Each graph starts with its own,
    /// so swap in a fresh one to resolve again after cancelling.
    pub fn set_cancel_token(&mut self, cancel: CancelToken) {
        self.cancel = cancel;
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Adds `element` unless one of the same kind and id is already present.
    /// Returns whether it was inserted.
    pub fn append(&mut self, element: impl Into<Element>) -> bool {
        match element.into() {
            Element::Node(node) => {
                let outside_cached = self.bounds.get().is_some_and(|bounds| !bounds.contains(&node));
                let inserted = insert_new(&mut self.nodes, node.id, node);
                if inserted && outside_cached {
                    self.bounds.take();
                }
                inserted
            }
            Element::Way(way) => insert_new(&mut self.ways, way.id, way),
            Element::Relation(relation) => insert_new(&mut self.relations, relation.id, relation),
        }
    }

    /// Merges every element of `other` whose id is not present yet. Present ids are left
    /// as they are.
    pub fn expand(&mut self, other: ResultGraph) {
        let ResultGraph {
            nodes,
            ways,
            relations,
            remarks,
            ..
        } = other;
        for node in nodes.into_values() {
            self.append(node);
        }
        for way in ways.into_values() {
            self.append(way);
        }
        for relation in relations.into_values() {
            self.append(relation);
        }
        self.remarks.extend(remarks);
    }

    pub fn node(&self, id: OsmId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn way(&self, id: OsmId) -> Option<&Way> {
        self.ways.get(&id)
    }

    pub fn relation(&self, id: OsmId) -> Option<&Relation> {
        self.relations.get(&id)
    }

    pub fn contains(&self, kind: ElementKind, id: OsmId) -> bool {
        match kind {
            ElementKind::Node => self.nodes.contains_key(&id),
            ElementKind::Way => self.ways.contains_key(&id),
            ElementKind::Relation => self.relations.contains_key(&id),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn ways(&self) -> impl Iterator<Item = &Way> {
        self.ways.values()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    /// Ids of one kind in insertion order.
    pub fn ids(&self, kind: ElementKind) -> Vec<OsmId> {
        match kind {
            ElementKind::Node => self.nodes.keys().copied().collect(),
            ElementKind::Way => self.ways.keys().copied().collect(),
            ElementKind::Relation => self.relations.keys().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `<bounds>` as delivered by an XML response, if there was one.
    pub fn declared_bounds(&self) -> Option<&Bounds> {
        self.declared_bounds.as_ref()
    }

    pub fn remarks(&self) -> &[String] {
        &self.remarks
    }

    /// Envelope of all nodes currently in the graph. Cached until new nodes arrive.
    pub fn bounds(&self) -> Result<Bounds> {
        if let Some(bounds) = self.bounds.get() {
            return Ok(*bounds);
        }
        let bounds = Bounds::enclosing(self.nodes.values()).ok_or(Error::EmptyBounds)?;
        let _ = self.bounds.set(bounds);
        Ok(bounds)
    }

    pub fn get_node(&mut self, id: OsmId, resolve_missing: bool) -> Result<&Node> {
        self.ensure(ElementKind::Node, id, resolve_missing)?;
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::incomplete(format!("unable to resolve node {id}")))
    }

    pub fn get_way(&mut self, id: OsmId, resolve_missing: bool) -> Result<&Way> {
        self.ensure(ElementKind::Way, id, resolve_missing)?;
        self.ways
            .get(&id)
            .ok_or_else(|| Error::incomplete(format!("unable to resolve way {id}")))
    }

    pub fn get_relation(&mut self, id: OsmId, resolve_missing: bool) -> Result<&Relation> {
        self.ensure(ElementKind::Relation, id, resolve_missing)?;
        self.relations
            .get(&id)
            .ok_or_else(|| Error::incomplete(format!("unable to resolve relation {id}")))
    }

    /// Nodes of a way in order. The first gap triggers one query for all nodes of the way;
    /// a node still missing after that is an error.
    pub fn way_nodes(&mut self, way_id: OsmId, resolve_missing: bool) -> Result<Vec<&Node>> {
        let node_ids = self.get_way(way_id, resolve_missing)?.node_ids.clone();

        if let Some(missing) = node_ids.iter().find(|id| !self.nodes.contains_key(*id)) {
            if !resolve_missing {
                return Err(Error::incomplete(format!(
                    "node {missing} of way {way_id} is missing and resolving missing nodes is disabled"
                )));
            }
            info!(way_id = way_id, first_missing = *missing; "Resolving nodes of way");
            self.resolve(&way_nodes_query(way_id))?;
        }

        node_ids
            .iter()
            .map(|id| {
                self.nodes.get(id).ok_or_else(|| {
                    Error::incomplete(format!("unable to resolve all nodes of way {way_id}, node {id} is missing"))
                })
            })
            .collect()
    }

    /// Resolves one relation member through the matching single-object accessor.
    pub fn resolve_member(&mut self, member: &RelationMember, resolve_missing: bool) -> Result<ResolvedElement<'_>> {
        Ok(match member.target {
            MemberRef::Node(id) => ResolvedElement::Node(self.get_node(id, resolve_missing)?),
            MemberRef::Way(id) => ResolvedElement::Way(self.get_way(id, resolve_missing)?),
            MemberRef::Relation(id) => ResolvedElement::Relation(self.get_relation(id, resolve_missing)?),
        })
    }

    /// Every member of a relation, resolved one by one. Members that are relations are
    /// fetched but not descended into, so cycles between relations are fine.
    pub fn relation_members(
        &mut self,
        relation_id: OsmId,
        resolve_missing: bool,
    ) -> Result<Vec<(&RelationMember, ResolvedElement<'_>)>> {
        let targets: Vec<MemberRef> = self
            .get_relation(relation_id, resolve_missing)?
            .members
            .iter()
            .map(|member| member.target)
            .collect();
        for target in &targets {
            self.ensure(target.kind(), target.id(), resolve_missing)?;
        }

        let relation = self
            .relations
            .get(&relation_id)
            .ok_or_else(|| Error::incomplete(format!("unable to resolve relation {relation_id}")))?;
        relation
            .members
            .iter()
            .map(|member| Ok((member, self.lookup(member.target)?)))
            .collect()
    }

    fn lookup(&self, target: MemberRef) -> Result<ResolvedElement<'_>> {
        let found = match target {
            MemberRef::Node(id) => self.nodes.get(&id).map(ResolvedElement::Node),
            MemberRef::Way(id) => self.ways.get(&id).map(ResolvedElement::Way),
            MemberRef::Relation(id) => self.relations.get(&id).map(ResolvedElement::Relation),
        };
        found.ok_or_else(|| Error::incomplete(format!("unable to resolve {} {}", target.kind(), target.id())))
    }

    fn ensure(&mut self, kind: ElementKind, id: OsmId, resolve_missing: bool) -> Result<()> {
        if self.contains(kind, id) {
            return Ok(());
        }
        if !resolve_missing {
            return Err(Error::incomplete(format!(
                "{kind} {id} is not in the result and resolving missing elements is disabled"
            )));
        }
        info!(kind = kind.as_str(), id = id; "Resolving missing element");
        self.resolve(&single_object_query(kind, id))?;
        if self.contains(kind, id) {
            Ok(())
        } else {
            Err(Error::incomplete(format!("unable to resolve {kind} {id}")))
        }
    }

    /// Runs a follow-up query and merges its result. Nothing is merged when it fails.
    fn resolve(&mut self, query: &str) -> Result<()> {
        let resolver = self
            .resolver
            .clone()
            .ok_or_else(|| Error::incomplete("no client attached to resolve missing data"))?;
        let fetched = resolver.run_query(query, &self.cancel)?;
        self.expand(fetched);
        Ok(())
    }
}

fn insert_new<T>(collection: &mut IndexMap<OsmId, T>, id: OsmId, element: T) -> bool {
    if collection.contains_key(&id) {
        false
    } else {
        collection.insert(id, element);
        true
    }
}
