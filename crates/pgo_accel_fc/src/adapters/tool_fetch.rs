use async_trait::async_trait;

/// Downloads auxiliary binaries shipped inside the temporary function.
#[async_trait]
pub trait ToolFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

pub struct HttpToolFetcher {
    http: reqwest::Client,
}

impl HttpToolFetcher {
    pub fn new() -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ToolFetcher for HttpToolFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| format!("GET {url} failed: {error}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("GET {url} returned {status}"));
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|error| format!("GET {url} body unreadable: {error}"))
    }
}
