use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

use crate::error::{Error, Result};

#[derive(Clone, Deserialize, PartialEq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

// Keep the password out of logs.
impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection settings for an [crate::HttpAdapter].
///
/// Only the base URI is required. The URI may carry a mount path (`http://app.com/flipper`);
/// feature routes are appended below it.
///
/// The config can be built in code:
///
/// ```
/// # use flagpole::HttpAdapterConfig;
/// # use std::time::Duration;
/// let config = HttpAdapterConfig::from_uri("http://localhost:9001/flipper")
///     .unwrap()
///     .with_header("X-Custom-Header", "foo")
///     .with_basic_auth("username", "password")
///     .with_read_timeout(Duration::from_secs(5));
/// assert_eq!(config.uri.path(), "/flipper");
/// ```
///
/// or deserialized, with timeouts given in whole seconds:
///
/// ```
/// # use flagpole::HttpAdapterConfig;
/// let config: HttpAdapterConfig = serde_json::from_str(r#"{
///     "uri": "http://localhost:9001",
///     "headers": {"X-Custom-Header": "foo"},
///     "basic_auth": {"username": "u", "password": "p"},
///     "read_timeout": 100,
///     "open_timeout": 40
/// }"#).unwrap();
/// assert_eq!(config.open_timeout.map(|t| t.as_secs()), Some(40));
/// ```
#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HttpAdapterConfig {
    pub uri: Url,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,
    /// Upper bound on each request, from sending it to reading the full response.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub read_timeout: Option<Duration>,
    /// Upper bound on establishing the connection.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub open_timeout: Option<Duration>,
}

impl HttpAdapterConfig {
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            headers: BTreeMap::new(),
            basic_auth: None,
            read_timeout: None,
            open_timeout: None,
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        let uri = Url::parse(uri)
            .map_err(|e| Error::invalid(format!("invalid base uri {:?}: {}", uri, e)))?;
        Ok(Self::new(uri))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.basic_auth = Some(BasicAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    /// Checks the base URI can have feature routes appended to it.
    pub(crate) fn validate(&self) -> Result<()> {
        match self.uri.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::invalid(format!(
                    "base uri must be http or https, got {}",
                    other
                )))
            }
        }
        if self.uri.cannot_be_a_base() {
            return Err(Error::invalid(format!(
                "base uri {} cannot have paths appended",
                self.uri
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use spectral::prelude::*;

    #[test]
    fn deserializes_full_config() {
        let config: HttpAdapterConfig = serde_json::from_value(serde_json::json!({
            "uri": "http://app.com/mount-point",
            "headers": {"X-Custom-Header": "foo"},
            "basic_auth": {"username": "username", "password": "password"},
            "read_timeout": 100,
            "open_timeout": 40
        }))
        .unwrap();

        let expected = HttpAdapterConfig::from_uri("http://app.com/mount-point")
            .unwrap()
            .with_header("X-Custom-Header", "foo")
            .with_basic_auth("username", "password")
            .with_read_timeout(Duration::from_secs(100))
            .with_open_timeout(Duration::from_secs(40));
        assert_that!(config).is_equal_to(expected);
    }

    #[test]
    fn only_uri_is_required() {
        let config: HttpAdapterConfig =
            serde_json::from_str(r#"{"uri": "http://app.com"}"#).unwrap();
        assert_that!(config.headers).is_equal_to(btreemap! {});
        assert_that!(config.basic_auth).is_none();
        assert_that!(config.read_timeout).is_none();
        assert_that!(config.open_timeout).is_none();
    }

    #[test]
    fn rejects_bad_uris() {
        assert!(matches!(
            HttpAdapterConfig::from_uri("not a uri"),
            Err(Error::InvalidValue { .. })
        ));
        let config = HttpAdapterConfig::from_uri("mailto:ops@example.com").unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidValue { .. })));
        let config = HttpAdapterConfig::from_uri("ftp://example.com").unwrap();
        assert!(matches!(config.validate(), Err(Error::InvalidValue { .. })));
    }

    #[test]
    fn debug_output_hides_the_password() {
        let config = HttpAdapterConfig::from_uri("http://app.com")
            .unwrap()
            .with_basic_auth("user", "hunter2");
        let output = format!("{:?}", config);
        assert!(output.contains("user"));
        assert!(!output.contains("hunter2"));
    }
}
