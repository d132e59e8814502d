use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::gate::GateTarget;
use crate::gate_values::GateValues;

mod config;
pub mod wire;

pub use config::{BasicAuth, HttpAdapterConfig};
use wire::{AddFeatureRequest, FeatureListResponse, FeatureMapResponse, FeatureResponse};

/// [Adapter] that forwards every operation to a remote Feature API, one request per call.
///
/// Nothing is cached: every read is a live round-trip. Any non-2xx response becomes
/// [Error::RemoteStatus] carrying the status and the raw body, a 2xx body that does not parse is
/// [Error::MalformedResponse], and failures to reach the server at all are [Error::Transport].
/// None of these are retried.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: Client,
    config: HttpAdapterConfig,
}

impl HttpAdapter {
    /// Builds the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [Error::InvalidValue] for an unusable base URI or header, and
    /// [Error::Transport] when the client cannot be constructed.
    pub fn new(config: HttpAdapterConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::invalid(format!("invalid header name {:?}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| Error::invalid(format!("invalid value for header {}: {}", name, e)))?;
            headers.insert(header_name, header_value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.read_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.open_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().map_err(|e| Error::Transport {
            message: format!("could not build http client: {}", e),
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpAdapterConfig {
        &self.config
    }

    /// `{base}/features/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.config.uri.clone();
        url.path_segments_mut()
            .map_err(|_| Error::invalid(format!("base uri {} cannot be a base", self.config.uri)))?
            .pop_if_empty()
            .push("features")
            .extend(segments);
        Ok(url)
    }

    fn send(&self, method: Method, url: Url, body: Option<Value>) -> Result<String> {
        debug!("{} {}", method, url);
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(auth) = &self.config.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().map_err(transport_error)?;
        let status = response.status();
        let text = response.text().map_err(transport_error)?;
        if !status.is_success() {
            warn!("{} {} responded with {}", method, url, status);
            return Err(Error::RemoteStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = self.send(Method::GET, url.clone(), None)?;
        serde_json::from_str(&body).map_err(|e| {
            warn!("GET {} returned an unexpected body: {}", url, e);
            Error::malformed(format!("GET {}: {}", url, e))
        })
    }

    fn fetch_all(&self) -> Result<FeatureListResponse> {
        self.fetch(self.url(&[])?)
    }
}

/// Decodes the response for `key`, rejecting a body that describes a different feature.
fn decode_feature(key: &str, response: &FeatureResponse) -> Result<GateValues> {
    if response.key != key {
        warn!("requested feature {} but the response describes {}", key, response.key);
        return Err(Error::malformed(format!(
            "expected feature {}, got {}",
            key, response.key
        )));
    }
    response.to_gate_values()
}

fn transport_error(error: reqwest::Error) -> Error {
    let message = if error.is_timeout() {
        format!("request timed out: {}", error)
    } else if error.is_connect() {
        format!("could not connect: {}", error)
    } else {
        error.to_string()
    };
    Error::Transport { message }
}

impl Adapter for HttpAdapter {
    fn name(&self) -> &str {
        "http"
    }

    fn get(&self, key: &str) -> Result<GateValues> {
        let response: FeatureResponse = self.fetch(self.url(&[key])?)?;
        decode_feature(key, &response)
    }

    fn get_multi(&self, keys: &[&str]) -> Result<HashMap<String, GateValues>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut url = self.url(&[])?;
        url.query_pairs_mut()
            .append_pair("keys", &keys.iter().unique().join(","));
        let response: FeatureMapResponse = self.fetch(url)?;

        let mut result = HashMap::with_capacity(keys.len());
        for key in keys {
            let values = match response.features.get(*key) {
                Some(feature) => decode_feature(key, feature)?,
                None => GateValues::empty(),
            };
            result.insert(key.to_string(), values);
        }
        Ok(result)
    }

    fn features(&self) -> Result<BTreeSet<String>> {
        Ok(self.get_all()?.into_keys().collect())
    }

    fn get_all(&self) -> Result<HashMap<String, GateValues>> {
        self.fetch_all()?
            .features
            .iter()
            .map(|feature| Ok((feature.key.clone(), feature.to_gate_values()?)))
            .collect()
    }

    fn add(&self, key: &str) -> Result<()> {
        let body = serde_json::to_value(AddFeatureRequest {
            name: key.to_owned(),
        })
        .map_err(|e| Error::invalid(e.to_string()))?;
        self.send(Method::POST, self.url(&[])?, Some(body))
            .map(|_| ())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.send(Method::DELETE, self.url(&[key])?, None).map(|_| ())
    }

    fn clear(&self, key: &str) -> Result<()> {
        self.send(Method::DELETE, self.url(&[key, "clear"])?, None)
            .map(|_| ())
    }

    fn enable(&self, key: &str, target: &GateTarget) -> Result<()> {
        let url = self.url(&[key, target.kind().key()])?;
        self.send(Method::POST, url, wire::gate_request_body(target))
            .map(|_| ())
    }

    fn disable(&self, key: &str, target: &GateTarget) -> Result<()> {
        let url = self.url(&[key, target.kind().key()])?;
        self.send(Method::DELETE, url, wire::gate_request_body(target))
            .map(|_| ())
    }
}
