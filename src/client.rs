//! Blocking Overpass client: endpoint failover, retry with backoff, content negotiation.

pub mod backoff;
pub mod transport;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{debug, info, warn};
use regex::bytes::Regex;

use self::backoff::{CancelToken, RetryPolicy, Sleeper, ThreadSleeper};
use self::transport::{HttpRequest, HttpResponse, HttpTransport, UreqTransport};
use crate::codec::{self, ResponseFormat, XmlStrategy};
use crate::config::ClientConfig;
use crate::data::DecodedBatch;
use crate::errors::{Error, Result};
use crate::graph::{QueryRunner, ResultGraph};

static ERROR_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<p>(?P<msg><strong\s.*?)</p>").expect("valid regex"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*?>").expect("valid regex"));

/// Pulls the `<p><strong ...>...</p>` fragments out of the HTML page served with a 400.
pub fn extract_error_messages(page: &[u8]) -> Vec<String> {
    ERROR_MESSAGE
        .captures_iter(page)
        .filter_map(|captures| captures.name("msg"))
        .map(|msg| {
            let stripped = HTML_TAG.replace_all(msg.as_bytes(), &b""[..]);
            String::from_utf8_lossy(&stripped).into_owned()
        })
        .collect()
}

/// What one exchange told us to do next.
enum Step {
    Done(DecodedBatch),
    Retry(Duration),
    NextEndpoint(Duration),
}

struct Inner {
    endpoints: Vec<String>,
    retry: RetryPolicy,
    user_agent: String,
    referer: Option<String>,
    xml_strategy: XmlStrategy,
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
}

/// Cheap to clone; clones share configuration and transport.
#[derive(Clone)]
pub struct Overpass {
    inner: Arc<Inner>,
}

impl Overpass {
    pub fn new(config: &ClientConfig) -> Self {
        let transport = UreqTransport::new(config.timeout(), config.read_chunk_size());
        Self::with_transport(config, Arc::new(transport), Arc::new(ThreadSleeper))
    }

    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Overpass {
            inner: Arc::new(Inner {
                endpoints: config.endpoints(),
                retry: config.retry_policy(),
                user_agent: config.user_agent(),
                referer: config.referer.clone().filter(|referer| !referer.is_empty()),
                xml_strategy: config.xml_strategy,
                transport,
                sleeper,
            }),
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.inner.endpoints
    }

    /// Runs `query` and returns the decoded result, linked back to this client for lazy
    /// resolution of missing references.
    pub fn query(&self, query: impl AsRef<[u8]>) -> Result<ResultGraph> {
        self.query_with_cancel(query, &CancelToken::new())
    }

    /// Like [`Overpass::query`], but gives up with [`Error::Cancelled`] as soon as `cancel`
    /// fires, whether it is sleeping between attempts or reading a response.
    pub fn query_with_cancel(&self, query: impl AsRef<[u8]>, cancel: &CancelToken) -> Result<ResultGraph> {
        let batch = self.fetch(query.as_ref(), cancel)?;
        let resolver: Arc<dyn QueryRunner> = Arc::new(self.clone());
        Ok(ResultGraph::from_batch(batch).with_resolver(resolver))
    }

    /// Same as [`Overpass::query_with_cancel`] without building a graph.
    pub fn fetch(&self, query: &[u8], cancel: &CancelToken) -> Result<DecodedBatch> {
        let inner = &*self.inner;
        let mut last_code: Option<(u16, String)> = None;
        let mut last_network_error: Option<Error> = None;

        for endpoint in &inner.endpoints {
            for attempt in 0..inner.retry.max_tries {
                cancel.check()?;
                info!(endpoint = endpoint.as_str(), attempt = attempt + 1; "Sending query");

                let response = match inner.transport.post(&self.request(endpoint, query), cancel) {
                    Ok(response) => response,
                    Err(source) => {
                        cancel.check()?;
                        let msg = source.to_string();
                        warn!(endpoint = endpoint.as_str(), attempt = attempt + 1, err = msg.as_str(); "Request failed");
                        last_network_error = Some(Error::Network {
                            endpoint: endpoint.clone(),
                            source,
                        });
                        self.sleep(inner.retry.delay(attempt), cancel)?;
                        continue;
                    }
                };

                last_code = Some((response.status, endpoint.clone()));
                match self.handle_response(endpoint, attempt, query, response, cancel)? {
                    Step::Done(batch) => return Ok(batch),
                    Step::Retry(delay) => self.sleep(delay, cancel)?,
                    Step::NextEndpoint(delay) => {
                        self.sleep(delay, cancel)?;
                        break;
                    }
                }
            }
        }

        if let Some(err) = last_network_error {
            return Err(err);
        }
        let (code, endpoint) = match last_code {
            Some((code, endpoint)) => (code, Some(endpoint)),
            None => (0, None),
        };
        Err(Error::UnknownHttpStatus { code, endpoint })
    }

    fn request<'a>(&self, endpoint: &'a str, query: &'a [u8]) -> HttpRequest<'a> {
        let mut headers = vec![
            ("Accept", "*/*".to_string()),
            ("Accept-Encoding", "gzip".to_string()),
            ("Content-Type", "application/octet-stream".to_string()),
            ("User-Agent", self.inner.user_agent.clone()),
        ];
        if let Some(referer) = &self.inner.referer {
            headers.push(("Referer", referer.clone()));
        }
        HttpRequest {
            url: endpoint,
            body: query,
            headers,
        }
    }

    fn handle_response(
        &self,
        endpoint: &str,
        attempt: u32,
        query: &[u8],
        response: HttpResponse,
        cancel: &CancelToken,
    ) -> Result<Step> {
        let retry = &self.inner.retry;
        let status = response.status;
        let content_type = response.content_type.clone().unwrap_or_default();
        let body = response.into_decoded_body();

        match status {
            200 => {
                let format = ResponseFormat::from_content_type(&content_type)
                    .or_else(|| ResponseFormat::sniff(&body))
                    .ok_or_else(|| Error::UnknownContentType(content_type.clone()))?;
                debug!(endpoint = endpoint, bytes = body.len(), content_type = content_type.as_str(); "Decoding response");
                let batch = codec::decode(&body, format, self.inner.xml_strategy)?;
                info!(endpoint = endpoint, elements = batch.elements.len(); "Query succeeded");
                Ok(Step::Done(batch))
            }
            400 => {
                let messages = extract_error_messages(&body);
                warn!(endpoint = endpoint, messages = messages.len(); "Server rejected query");
                Err(Error::BadQuery {
                    query: String::from_utf8_lossy(query).into_owned(),
                    messages,
                })
            }
            429 => {
                if retry.is_last(attempt) {
                    self.sleep(retry.rate_limited_delay(attempt), cancel)?;
                    return Err(Error::TooManyRequests {
                        endpoint: endpoint.to_string(),
                    });
                }
                warn!(endpoint = endpoint, attempt = attempt + 1; "Rate limited, backing off");
                Ok(Step::Retry(retry.rate_limited_delay(attempt)))
            }
            504 => {
                if retry.is_last(attempt) {
                    self.sleep(retry.delay(attempt), cancel)?;
                    return Err(Error::GatewayTimeout {
                        endpoint: endpoint.to_string(),
                    });
                }
                warn!(endpoint = endpoint, attempt = attempt + 1; "Gateway timeout, backing off");
                Ok(Step::Retry(retry.delay(attempt)))
            }
            403 | 502 | 503 => {
                warn!(endpoint = endpoint, status = status; "Endpoint unavailable, trying next server");
                Ok(Step::NextEndpoint(retry.delay(attempt)))
            }
            code => Err(Error::UnknownHttpStatus {
                code,
                endpoint: Some(endpoint.to_string()),
            }),
        }
    }

    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> Result<()> {
        debug!(delay_ms = delay.as_millis() as u64; "Backing off");
        self.inner.sleeper.sleep(delay, cancel)
    }
}

impl QueryRunner for Overpass {
    fn run_query(&self, query: &str, cancel: &CancelToken) -> Result<ResultGraph> {
        self.query_with_cancel(query, cancel)
    }
}
