//! Response body decoding. Two wire formats, and two interchangeable strategies for XML.

pub mod json;
pub mod xml;

use serde::Deserialize;

use crate::data::DecodedBatch;
use crate::errors::Result;

/// Content types the service answers with, parameters already stripped.
const JSON_CONTENT_TYPES: &[&str] = &["application/json"];
const XML_CONTENT_TYPES: &[&str] = &["application/osm3s+xml", "application/xml", "text/xml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Xml,
}

impl ResponseFormat {
    /// Maps a `Content-Type` header value (`application/json; charset=utf-8` and the like).
    pub fn from_content_type(content_type: &str) -> Option<ResponseFormat> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if JSON_CONTENT_TYPES.contains(&media_type.as_str()) {
            Some(ResponseFormat::Json)
        } else if XML_CONTENT_TYPES.contains(&media_type.as_str()) {
            Some(ResponseFormat::Xml)
        } else {
            None
        }
    }

    /// Guesses from the first non-whitespace byte of the body.
    pub fn sniff(body: &[u8]) -> Option<ResponseFormat> {
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Some(ResponseFormat::Json),
            Some(b'<') => Some(ResponseFormat::Xml),
            _ => None,
        }
    }
}

/// How XML bodies are walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XmlStrategy {
    /// Build the full tree first, then walk it.
    #[default]
    Document,
    /// Event-driven; every record is released once converted.
    Streaming,
}

pub trait ElementDecoder {
    fn decode(&self, body: &[u8]) -> Result<DecodedBatch>;
}

pub struct JsonDecoder;

pub struct XmlDocumentDecoder;

pub struct XmlStreamingDecoder;

impl ElementDecoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<DecodedBatch> {
        json::decode(body)
    }
}

impl ElementDecoder for XmlDocumentDecoder {
    fn decode(&self, body: &[u8]) -> Result<DecodedBatch> {
        xml::decode_document(body)
    }
}

impl ElementDecoder for XmlStreamingDecoder {
    fn decode(&self, body: &[u8]) -> Result<DecodedBatch> {
        xml::decode_reader(body)
    }
}

pub fn decoder_for(format: ResponseFormat, strategy: XmlStrategy) -> &'static dyn ElementDecoder {
    match (format, strategy) {
        (ResponseFormat::Json, _) => &JsonDecoder,
        (ResponseFormat::Xml, XmlStrategy::Document) => &XmlDocumentDecoder,
        (ResponseFormat::Xml, XmlStrategy::Streaming) => &XmlStreamingDecoder,
    }
}

pub fn decode(body: &[u8], format: ResponseFormat, strategy: XmlStrategy) -> Result<DecodedBatch> {
    decoder_for(format, strategy).decode(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_parameters_are_ignored() {
        assert_eq!(
            ResponseFormat::from_content_type("application/json; charset=utf-8"),
            Some(ResponseFormat::Json)
        );
        assert_eq!(
            ResponseFormat::from_content_type("Application/OSM3S+XML"),
            Some(ResponseFormat::Xml)
        );
        assert_eq!(ResponseFormat::from_content_type("text/html"), None);
    }

    #[test]
    fn sniffing_skips_leading_whitespace() {
        assert_eq!(ResponseFormat::sniff(b"\n  {\"elements\": []}"), Some(ResponseFormat::Json));
        assert_eq!(ResponseFormat::sniff(b"\t<osm/>"), Some(ResponseFormat::Xml));
        assert_eq!(ResponseFormat::sniff(b"   "), None);
        assert_eq!(ResponseFormat::sniff(b"oops"), None);
    }
}
