use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::TransportError;

/// Blocking HTTP used by the cloud evidence backend and the remote verifier.
pub trait HttpTransport: Send + Sync {
    /// POST a JSON body and return the response text. Non-2xx is an error.
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String, TransportError>;

    fn get(&self, url: &str) -> Result<String, TransportError>;
}

/// `reqwest` blocking client with a hard request timeout, TLS 1.2 minimum.
#[derive(Debug, Clone)]
pub struct BlockingHttpTransport {
    client: Client,
}

impl BlockingHttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()
            .map_err(|e| TransportError::Http(format!("building http client: {e}")))?;
        Ok(Self { client })
    }

    fn finish(response: reqwest::Result<reqwest::blocking::Response>) -> Result<String, TransportError> {
        let response = response.map_err(map_reqwest_error)?;
        let status = response.status();
        let text = response.text().map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(TransportError::Http(format!("status {status}: {text}")));
        }
        Ok(text)
    }
}

impl HttpTransport for BlockingHttpTransport {
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String, TransportError> {
        debug!(url, "POST");
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        Self::finish(request.send())
    }

    fn get(&self, url: &str) -> Result<String, TransportError> {
        debug!(url, "GET");
        Self::finish(self.client.get(url).send())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(err.to_string())
    }
}
