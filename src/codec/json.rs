use log::debug;
use serde_json::{Map, Value};

use crate::data::osm::{
    parse_coordinate, parse_id, Attributes, Element, ElementKind, MemberRef, Node, OsmId, Relation,
    RelationMember, Tags, Way,
};
use crate::data::DecodedBatch;
use crate::errors::{Error, Result};

/// Decodes an `{"elements": [...]}` envelope.
pub fn decode(body: &[u8]) -> Result<DecodedBatch> {
    let document: Value = serde_json::from_slice(body)?;
    let mut batch = DecodedBatch::default();

    if let Some(remark) = document.get("remark").and_then(Value::as_str) {
        batch.remarks.push(remark.to_string());
    }

    let records = document
        .get("elements")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for record in records {
        let type_value = record.get("type").and_then(Value::as_str).unwrap_or_default();
        let Some(kind) = ElementKind::from_wire(type_value) else {
            debug!(type_value = type_value; "Skipping record of unsupported type");
            continue;
        };
        let element: Element = match kind {
            ElementKind::Node => Node::from_json(record)?.into(),
            ElementKind::Way => Way::from_json(record)?.into(),
            ElementKind::Relation => Relation::from_json(record)?.into(),
        };
        batch.elements.push(element);
    }

    Ok(batch)
}

impl Node {
    pub fn from_json(data: &Value) -> Result<Node> {
        let record = expect_kind(data, ElementKind::Node)?;
        Ok(Node {
            id: required_id(record, "node", "id")?,
            lat: coordinate(record, "node", "lat")?,
            lon: coordinate(record, "node", "lon")?,
            tags: tags(record),
            attributes: attributes(record, &["type", "id", "lat", "lon", "tags"]),
        })
    }
}

impl Way {
    pub fn from_json(data: &Value) -> Result<Way> {
        let record = expect_kind(data, ElementKind::Way)?;
        let node_ids = match record.get("nodes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(refs)) => refs
                .iter()
                .map(|node_ref| id_value("nodes", node_ref))
                .collect::<Result<_>>()?,
            Some(other) => return Err(Error::invalid_number("nodes", &other.to_string())),
        };
        Ok(Way {
            id: required_id(record, "way", "id")?,
            node_ids,
            tags: tags(record),
            attributes: attributes(record, &["id", "nodes", "tags", "type"]),
        })
    }
}

impl Relation {
    pub fn from_json(data: &Value) -> Result<Relation> {
        let record = expect_kind(data, ElementKind::Relation)?;
        let mut members = Vec::new();
        if let Some(entries) = record.get("members").and_then(Value::as_array) {
            for entry in entries {
                if let Some(member) = RelationMember::from_json(entry)? {
                    members.push(member);
                }
            }
        }
        Ok(Relation {
            id: required_id(record, "relation", "id")?,
            members,
            tags: tags(record),
            attributes: attributes(record, &["id", "members", "tags", "type"]),
        })
    }
}

impl RelationMember {
    /// `Ok(None)` for member kinds this client does not know about.
    pub fn from_json(data: &Value) -> Result<Option<RelationMember>> {
        let type_value = data.get("type").and_then(Value::as_str).unwrap_or_default();
        let Some(kind) = ElementKind::ALL.into_iter().find(|k| k.as_str() == type_value) else {
            debug!(type_value = type_value; "Dropping relation member of unknown type");
            return Ok(None);
        };
        let Some(record) = data.as_object() else {
            return Ok(None);
        };
        let role = match record.get("role") {
            Some(Value::String(role)) => role.clone(),
            _ => String::new(),
        };
        Ok(Some(RelationMember {
            target: MemberRef::new(kind, required_id(record, "member", "ref")?),
            role,
        }))
    }
}

fn expect_kind(data: &Value, expected: ElementKind) -> Result<&Map<String, Value>> {
    let provided = data.get("type").and_then(Value::as_str);
    match (provided, data.as_object()) {
        (Some(type_value), Some(record)) if type_value == expected.as_str() => Ok(record),
        _ => Err(Error::ElementKindMismatch {
            expected,
            provided: provided.unwrap_or("null").to_string(),
        }),
    }
}

fn required_id(record: &Map<String, Value>, element: &'static str, field: &'static str) -> Result<OsmId> {
    match record.get(field) {
        None | Some(Value::Null) => Err(Error::MissingAttribute {
            element,
            attribute: field,
        }),
        Some(value) => id_value(field, value),
    }
}

fn id_value(field: &str, value: &Value) -> Result<OsmId> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| Error::invalid_number(field, &number.to_string())),
        Value::String(text) => parse_id(field, text),
        other => Err(Error::invalid_number(field, &other.to_string())),
    }
}

fn coordinate(
    record: &Map<String, Value>,
    element: &'static str,
    field: &'static str,
) -> Result<rust_decimal::Decimal> {
    match record.get(field) {
        None | Some(Value::Null) => Err(Error::MissingAttribute {
            element,
            attribute: field,
        }),
        // With `arbitrary_precision` the number keeps its source text.
        Some(Value::Number(number)) => parse_coordinate(field, &number.to_string()),
        Some(Value::String(text)) => parse_coordinate(field, text),
        Some(other) => Err(Error::invalid_number(field, &other.to_string())),
    }
}

fn tags(record: &Map<String, Value>) -> Tags {
    record
        .get("tags")
        .and_then(Value::as_object)
        .map(|tags| {
            tags.iter()
                .map(|(key, value)| (key.clone(), text(value)))
                .collect()
        })
        .unwrap_or_default()
}

fn attributes(record: &Map<String, Value>, ignore: &[&str]) -> Attributes {
    record
        .iter()
        .filter(|(key, _)| !ignore.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), text(value)))
        .collect()
}

/// Strings as-is, everything else as JSON text. Matches what the XML side sees.
fn text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
