use std::io::{BufReader, Cursor};

use indoc::indoc;

use overpass_graph::codec::xml;
use overpass_graph::{ElementKind, ResponseFormat, ResultGraph, XmlStrategy};

const JSON_BODY: &str = indoc! {r#"
    {
      "version": 0.6,
      "generator": "Overpass API",
      "elements": [
        {"type": "node", "id": 21, "lat": 50.1234567, "lon": 10.0000100, "version": 2,
         "timestamp": "2020-01-01T00:00:00Z", "tags": {"amenity": "cafe", "name": "Café Ü"}},
        {"type": "node", "id": 22, "lat": 52.0, "lon": 12.0},
        {"type": "node", "id": -5, "lat": -33.8688197, "lon": 151.2092955},
        {"type": "way", "id": 300, "nodes": [21, 22, 21], "version": 7, "tags": {"area": "yes"}},
        {"type": "relation", "id": 4000, "members": [
          {"type": "way", "ref": 300, "role": "outer"},
          {"type": "node", "ref": 22, "role": "label"},
          {"type": "relation", "ref": 4000, "role": ""}
        ], "tags": {"type": "multipolygon"}}
      ]
    }
"#};

const XML_BODY: &str = indoc! {r#"
    <?xml version="1.0" encoding="UTF-8"?>
    <osm version="0.6" generator="Overpass API">
      <meta osm_base="2020-01-01T00:00:00Z"/>
      <node id="21" lat="50.1234567" lon="10.0000100" version="2" timestamp="2020-01-01T00:00:00Z">
        <tag k="amenity" v="cafe"/>
        <tag k="name" v="Café Ü"/>
      </node>
      <node id="22" lat="52.0" lon="12.0"/>
      <node id="-5" lat="-33.8688197" lon="151.2092955"/>
      <way id="300" version="7">
        <nd ref="21"/>
        <nd ref="22"/>
        <nd ref="21"/>
        <tag k="area" v="yes"/>
      </way>
      <relation id="4000">
        <member type="way" ref="300" role="outer"/>
        <member type="node" ref="22" role="label"/>
        <member type="relation" ref="4000" role=""/>
        <tag k="type" v="multipolygon"/>
      </relation>
    </osm>
"#};

fn assert_same_elements(left: &ResultGraph, right: &ResultGraph) {
    for kind in ElementKind::ALL {
        assert_eq!(left.ids(kind), right.ids(kind), "{kind} ids differ");
    }
    assert!(left.nodes().eq(right.nodes()));
    assert!(left.ways().eq(right.ways()));
    assert!(left.relations().eq(right.relations()));
}

#[test]
fn json_and_xml_decode_to_the_same_graph() {
    let json = ResultGraph::decode(JSON_BODY.as_bytes(), ResponseFormat::Json, XmlStrategy::Document).unwrap();
    let document = ResultGraph::decode(XML_BODY.as_bytes(), ResponseFormat::Xml, XmlStrategy::Document).unwrap();
    let streamed = ResultGraph::decode(XML_BODY.as_bytes(), ResponseFormat::Xml, XmlStrategy::Streaming).unwrap();

    assert_eq!(json.len(), 5);
    assert_same_elements(&json, &document);
    assert_same_elements(&document, &streamed);

    let cafe = json.node(21).unwrap();
    assert_eq!(cafe.lon.to_string(), "10.0000100");
    assert_eq!(cafe.attributes["version"], "2");
    assert_eq!(cafe.tags["name"], "Café Ü");
}

#[test]
fn bounds_agree_across_formats() {
    let json = ResultGraph::decode(JSON_BODY.as_bytes(), ResponseFormat::Json, XmlStrategy::Document).unwrap();
    let xml = ResultGraph::decode(XML_BODY.as_bytes(), ResponseFormat::Xml, XmlStrategy::Streaming).unwrap();

    let bounds = json.bounds().unwrap();
    assert_eq!(bounds, xml.bounds().unwrap());
    assert_eq!(bounds.min_lat.to_string(), "-33.8688197");
    assert_eq!(bounds.max_lon.to_string(), "151.2092955");
}

#[test]
fn streaming_a_large_document_matches_whole_document_parsing() {
    let mut body = String::from("<osm version=\"0.6\">\n");
    for id in 1..=2000 {
        body.push_str(&format!(
            "  <node id=\"{id}\" lat=\"{}.{:07}\" lon=\"{}.5\"><tag k=\"ref\" v=\"{id}\"/></node>\n",
            id % 90,
            id,
            id % 180
        ));
    }
    body.push_str("  <way id=\"1\">");
    for id in 1..=2000 {
        body.push_str(&format!("<nd ref=\"{id}\"/>"));
    }
    body.push_str("</way>\n</osm>\n");

    let document = xml::decode_document(body.as_bytes()).unwrap();
    let streamed = xml::decode_reader(BufReader::with_capacity(64, Cursor::new(body.as_bytes()))).unwrap();

    assert_eq!(document, streamed);
    assert_eq!(streamed.elements.len(), 2001);
}
