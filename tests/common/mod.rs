#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use overpass_graph::client::backoff::{CancelToken, Sleeper};
use overpass_graph::client::transport::{HttpRequest, HttpResponse, HttpTransport};
use overpass_graph::errors::TransportError;
use overpass_graph::{ClientConfig, Overpass, Result};

/// A request as the scripted server received it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Replays a fixed list of outcomes, one per request.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<std::result::Result<HttpResponse, String>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        self.script.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            content_type: content_type.map(str::to_string),
            content_encoding: None,
            body: body.into(),
        }));
        self
    }

    pub fn respond_with(self, response: HttpResponse) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.seen().into_iter().map(|request| request.url).collect()
    }
}

impl HttpTransport for ScriptedTransport {
    fn post(&self, request: &HttpRequest<'_>, _cancel: &CancelToken) -> std::result::Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(SeenRequest {
            url: request.url.to_string(),
            body: request.body.to_vec(),
            headers: request
                .headers
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        });
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(message.into()),
            None => Err("script exhausted".into()),
        }
    }
}

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
    trip: Mutex<Option<CancelToken>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    /// Fires `cancel` the next time a backoff starts, as a caller would mid-sleep.
    pub fn cancel_on_sleep(&self, cancel: CancelToken) {
        *self.trip.lock().unwrap() = Some(cancel);
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> Result<()> {
        if let Some(trip) = self.trip.lock().unwrap().take() {
            trip.cancel();
        }
        cancel.check()?;
        self.delays.lock().unwrap().push(delay);
        Ok(())
    }
}

pub const PRIMARY: &str = "https://primary.example/api/interpreter";
pub const SECONDARY: &str = "https://secondary.example/api/interpreter";

pub fn two_server_config() -> ClientConfig {
    ClientConfig {
        overpass_server: PRIMARY.to_string(),
        fallback_servers: Some(vec![SECONDARY.to_string()]),
        ..ClientConfig::default()
    }
}

pub fn client(
    config: &ClientConfig,
    transport: ScriptedTransport,
) -> (Overpass, Arc<ScriptedTransport>, Arc<RecordingSleeper>) {
    let transport = Arc::new(transport);
    let sleeper = Arc::new(RecordingSleeper::default());
    let overpass = Overpass::with_transport(config, transport.clone(), sleeper.clone());
    (overpass, transport, sleeper)
}

pub const EMPTY_JSON: &str = r#"{"version": 0.6, "elements": []}"#;
