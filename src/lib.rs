//! Client for Overpass-style OpenStreetMap query services.
//!
//! [`Overpass::query`] sends query text to a list of servers with retry and failover and
//! decodes the answer into a [`ResultGraph`]. References the answer left dangling (a way
//! whose nodes were not included, a relation member that was filtered out) can be filled
//! in later through the graph's resolving accessors, which issue small follow-up queries
//! through the same client.

pub mod client;
pub mod codec;
pub mod config;
pub mod data;
pub mod errors;
pub mod graph;

pub use crate::client::Overpass;
pub use crate::codec::{ResponseFormat, XmlStrategy};
pub use crate::config::{load_config, ClientConfig};
pub use crate::data::osm::{Element, ElementKind, MemberRef, Node, OsmId, Relation, RelationMember, Way};
pub use crate::data::Bounds;
pub use crate::errors::{Error, Result};
pub use crate::graph::{QueryRunner, ResolvedElement, ResultGraph};
