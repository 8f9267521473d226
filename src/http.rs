use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::BiographError;

/// Transfers a datasource needs; kept behind a trait so fetch logic can be tested offline.
pub trait Fetcher: Send + Sync {
    fn get_text(&self, url: &str) -> Result<String, BiographError>;
    /// Streams `url` into `destination` and returns the number of bytes written.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, BiographError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, BiographError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("biodatagraph/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BiographError::Http(err.to_string()))?,
        );
        // Release files run to several gigabytes; only the connect phase is bounded.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(60))
            .timeout(None)
            .build()
            .map_err(|err| BiographError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn send(&self, url: &str) -> Result<Response, BiographError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| BiographError::Http(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "request failed".to_string());
            return Err(BiographError::HttpStatus {
                url: url.to_string(),
                status,
                message,
            });
        }
        Ok(response)
    }
}

impl Fetcher for HttpFetcher {
    fn get_text(&self, url: &str) -> Result<String, BiographError> {
        self.send(url)?
            .text()
            .map_err(|err| BiographError::Http(err.to_string()))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, BiographError> {
        let mut response = self.send(url)?;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| BiographError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| BiographError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| BiographError::Http(format!("{url}: {err}")))
    }
}

impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
    fn get_text(&self, url: &str) -> Result<String, BiographError> {
        (**self).get_text(url)
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, BiographError> {
        (**self).download(url, destination)
    }
}
