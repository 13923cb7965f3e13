use std::io::BufRead;
use std::str;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::data::osm::{
    parse_coordinate, parse_id, Attributes, Element, ElementKind, MemberRef, Node, Relation,
    RelationMember, Tags, Way,
};
use crate::data::{Bounds, DecodedBatch};
use crate::errors::{Error, Result};

/// One XML element: lowercased tag name, attributes in document order, child elements and text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    fn open(start: &BytesStart) -> Result<XmlElement> {
        let name = str::from_utf8(start.name().as_ref())?.to_ascii_lowercase();
        let mut attributes = Vec::new();
        for attribute_res in start.attributes() {
            let attribute = attribute_res?;
            let key = str::from_utf8(attribute.key.as_ref())?.to_string();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(XmlElement {
            name,
            attributes,
            ..XmlElement::default()
        })
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn expect_kind(&self, expected: ElementKind) -> Result<()> {
        if self.name == expected.as_str() {
            Ok(())
        } else {
            Err(Error::ElementKindMismatch {
                expected,
                provided: self.name.clone(),
            })
        }
    }

    fn tags(&self) -> Result<Tags> {
        let mut tags = Tags::new();
        for tag in self.children_named("tag") {
            let key = tag.attribute("k").ok_or(Error::MissingTagKey)?;
            let value = tag.attribute("v").unwrap_or_default();
            tags.insert(key.to_string(), value.to_string());
        }
        Ok(tags)
    }

    fn attributes_except(&self, ignore: &[&str]) -> Attributes {
        self.attributes
            .iter()
            .filter(|(key, _)| !ignore.contains(&key.as_str()))
            .cloned()
            .collect()
    }

    fn required(&self, element: &'static str, attribute: &'static str) -> Result<&str> {
        self.attribute(attribute)
            .ok_or(Error::MissingAttribute { element, attribute })
    }
}

impl Node {
    pub fn from_xml(child: &XmlElement) -> Result<Node> {
        child.expect_kind(ElementKind::Node)?;
        Ok(Node {
            id: parse_id("id", child.required("node", "id")?)?,
            lat: parse_coordinate("lat", child.required("node", "lat")?)?,
            lon: parse_coordinate("lon", child.required("node", "lon")?)?,
            tags: child.tags()?,
            attributes: child.attributes_except(&["id", "lat", "lon"]),
        })
    }
}

impl Way {
    pub fn from_xml(child: &XmlElement) -> Result<Way> {
        child.expect_kind(ElementKind::Way)?;
        let node_ids = child
            .children_named("nd")
            .map(|nd| parse_id("ref", nd.required("nd", "ref")?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Way {
            id: parse_id("id", child.required("way", "id")?)?,
            node_ids,
            tags: child.tags()?,
            attributes: child.attributes_except(&["id"]),
        })
    }
}

impl Relation {
    pub fn from_xml(child: &XmlElement) -> Result<Relation> {
        child.expect_kind(ElementKind::Relation)?;
        let mut members = Vec::new();
        for member in child.children_named("member") {
            let type_value = member.attribute("type").unwrap_or_default();
            // Unknown member kinds are skipped so newer servers don't break older clients.
            let Some(kind) = ElementKind::ALL.into_iter().find(|k| k.as_str() == type_value) else {
                debug!(type_value = type_value; "Dropping relation member of unknown type");
                continue;
            };
            members.push(RelationMember {
                target: MemberRef::new(kind, parse_id("ref", member.required("member", "ref")?)?),
                role: member.attribute("role").unwrap_or_default().to_string(),
            });
        }
        Ok(Relation {
            id: parse_id("id", child.required("relation", "id")?)?,
            members,
            tags: child.tags()?,
            attributes: child.attributes_except(&["id"]),
        })
    }
}

fn element_from_xml(kind: ElementKind, child: &XmlElement) -> Result<Element> {
    Ok(match kind {
        ElementKind::Node => Node::from_xml(child)?.into(),
        ElementKind::Way => Way::from_xml(child)?.into(),
        ElementKind::Relation => Relation::from_xml(child)?.into(),
    })
}

fn bounds_from_xml(child: &XmlElement) -> Result<Bounds> {
    let coordinate = |name: &'static str| parse_coordinate(name, child.required("bounds", name)?);
    Ok(Bounds {
        min_lat: coordinate("minlat")?,
        min_lon: coordinate("minlon")?,
        max_lat: coordinate("maxlat")?,
        max_lon: coordinate("maxlon")?,
    })
}

fn osm_reader<R: BufRead>(input: R) -> Reader<R> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    reader
}

/// Whole-document strategy: the full tree is built before any element is converted.
pub fn decode_document(body: &[u8]) -> Result<DecodedBatch> {
    let roots = parse_tree(body)?;
    let mut batch = DecodedBatch::default();
    for root in &roots {
        collect(root, &mut batch)?;
    }
    Ok(batch)
}

pub fn parse_tree(body: &[u8]) -> Result<Vec<XmlElement>> {
    fn attach(stack: &mut [XmlElement], roots: &mut Vec<XmlElement>, element: XmlElement) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => roots.push(element),
        }
    }

    let mut reader = osm_reader(body);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut roots = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => stack.push(XmlElement::open(&e)?),
            Event::Empty(e) => {
                let element = XmlElement::open(&e)?;
                attach(&mut stack, &mut roots, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Xml { message: "unbalanced closing tag".to_string() })?;
                attach(&mut stack, &mut roots, element);
            }
            Event::Text(e) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&e.unescape()?);
                }
            }
            // Declarations, comments, processing instructions carry no data.
            _ => (),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::Xml {
            message: format!("document ended inside <{}>", stack[stack.len() - 1].name),
        });
    }
    Ok(roots)
}

fn collect(element: &XmlElement, batch: &mut DecodedBatch) -> Result<()> {
    if let Some(kind) = ElementKind::from_wire(&element.name) {
        batch.elements.push(element_from_xml(kind, element)?);
        return Ok(());
    }
    match element.name.as_str() {
        "bounds" => batch.bounds = Some(bounds_from_xml(element)?),
        "remark" => batch.remarks.push(element.text.clone()),
        _ => {
            for child in &element.children {
                collect(child, batch)?;
            }
        }
    }
    Ok(())
}

/// Streaming strategy. Memory stays bounded by the largest single element: the read buffer
/// is cleared after every event and each record is dropped once converted.
pub fn decode_reader<R: BufRead>(input: R) -> Result<DecodedBatch> {
    let mut reader = osm_reader(input);
    let mut buf = Vec::new();
    let mut batch = DecodedBatch::default();

    // Element record being assembled, with the nesting depth below it.
    let mut current: Option<(ElementKind, XmlElement)> = None;
    let mut depth = 0usize;
    // Remark text being collected, with the nesting depth below it.
    let mut remark: Option<(String, usize)> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => {
                let opened = XmlElement::open(&e)?;
                if let Some((_, record)) = current.as_mut() {
                    depth += 1;
                    if depth == 1 {
                        record.children.push(opened);
                    }
                } else if let Some((_, remark_depth)) = remark.as_mut() {
                    *remark_depth += 1;
                } else if let Some(kind) = ElementKind::from_wire(&opened.name) {
                    current = Some((kind, opened));
                    depth = 0;
                } else if opened.name == "bounds" {
                    batch.bounds = Some(bounds_from_xml(&opened)?);
                } else if opened.name == "remark" {
                    remark = Some((String::new(), 0));
                }
            }
            Event::Empty(e) => {
                let opened = XmlElement::open(&e)?;
                if let Some((_, record)) = current.as_mut() {
                    if depth == 0 {
                        record.children.push(opened);
                    }
                } else if remark.is_some() {
                    // Markup inside a remark is not data.
                } else if let Some(kind) = ElementKind::from_wire(&opened.name) {
                    batch.elements.push(element_from_xml(kind, &opened)?);
                } else if opened.name == "bounds" {
                    batch.bounds = Some(bounds_from_xml(&opened)?);
                } else if opened.name == "remark" {
                    batch.remarks.push(String::new());
                }
            }
            Event::End(_) => {
                if current.is_some() {
                    if depth == 0 {
                        if let Some((kind, record)) = current.take() {
                            batch.elements.push(element_from_xml(kind, &record)?);
                        }
                    } else {
                        depth -= 1;
                    }
                } else if let Some((text, remark_depth)) = remark.as_mut() {
                    if *remark_depth == 0 {
                        batch.remarks.push(std::mem::take(text));
                        remark = None;
                    } else {
                        *remark_depth -= 1;
                    }
                }
            }
            Event::Text(e) => {
                if let Some((text, 0)) = remark.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            _ => (),
        }
        buf.clear();
    }

    if let Some((kind, _)) = current {
        return Err(Error::Xml {
            message: format!("document ended inside <{kind}>"),
        });
    }
    Ok(batch)
}
