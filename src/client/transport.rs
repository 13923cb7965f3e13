use std::io::Read;
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use log::warn;
use ureq::Agent;

use super::backoff::CancelToken;
use crate::errors::TransportError;

pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub body: &'a [u8],
    pub headers: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_gzipped(&self) -> bool {
        self.content_encoding
            .as_deref()
            .is_some_and(|encoding| encoding.to_ascii_lowercase().contains("gzip"))
    }

    /// Body with any gzip content encoding removed. Bodies that fail to inflate are
    /// returned as received.
    pub fn into_decoded_body(self) -> Vec<u8> {
        if self.is_gzipped() {
            gunzip_or_raw(self.body)
        } else {
            self.body
        }
    }
}

fn gunzip_or_raw(raw: Vec<u8>) -> Vec<u8> {
    let mut inflated = Vec::new();
    match MultiGzDecoder::new(raw.as_slice()).read_to_end(&mut inflated) {
        Ok(_) => inflated,
        Err(err) => {
            let msg = err.to_string();
            warn!(err = msg.as_str(), bytes = raw.len(); "Could not gunzip response, using raw body");
            raw
        }
    }
}

/// One blocking POST per call. Implementations own at most one connection at a time.
pub trait HttpTransport: Send + Sync {
    fn post(&self, request: &HttpRequest<'_>, cancel: &CancelToken) -> Result<HttpResponse, TransportError>;
}

pub struct UreqTransport {
    agent: Agent,
    read_chunk_size: usize,
}

impl UreqTransport {
    pub fn new(timeout: Duration, read_chunk_size: usize) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        let agent: Agent = config.into();
        UreqTransport {
            agent,
            read_chunk_size: read_chunk_size.max(1),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn post(&self, request: &HttpRequest<'_>, cancel: &CancelToken) -> Result<HttpResponse, TransportError> {
        let mut builder = self.agent.post(request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        let response = builder.send(request.body)?;

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let status = response.status().as_u16();
        let content_type = header("content-type");
        let content_encoding = header("content-encoding");

        let mut reader = response.into_body().into_reader();
        let mut chunk = vec![0u8; self.read_chunk_size];
        let mut body = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err("cancelled while reading response body".into());
            }
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Ok(HttpResponse {
            status,
            content_type,
            content_encoding,
            body,
        })
    }
}
