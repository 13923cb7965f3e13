use rust_decimal::Decimal;

use self::osm::{Element, Node};

pub mod osm;

/// Axis-aligned lon/lat envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min_lat: Decimal,
    pub min_lon: Decimal,
    pub max_lat: Decimal,
    pub max_lon: Decimal,
}

impl Bounds {
    /// Smallest envelope holding every node, `None` when there are no nodes.
    pub fn enclosing<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Option<Bounds> {
        nodes.into_iter().fold(None, |acc, node| {
            Some(match acc {
                None => Bounds {
                    min_lat: node.lat,
                    min_lon: node.lon,
                    max_lat: node.lat,
                    max_lon: node.lon,
                },
                Some(b) => Bounds {
                    min_lat: b.min_lat.min(node.lat),
                    min_lon: b.min_lon.min(node.lon),
                    max_lat: b.max_lat.max(node.lat),
                    max_lon: b.max_lon.max(node.lon),
                },
            })
        })
    }

    pub fn contains(&self, node: &Node) -> bool {
        (self.min_lat..=self.max_lat).contains(&node.lat)
            && (self.min_lon..=self.max_lon).contains(&node.lon)
    }
}

/// Everything a single response body decodes to. Elements keep document order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DecodedBatch {
    pub elements: Vec<Element>,
    pub bounds: Option<Bounds>,
    pub remarks: Vec<String>,
}
