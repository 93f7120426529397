use async_trait::async_trait;
use graphcore::{AdapterError, DataSource, ExecutionContext, Validation, Value};

const ADAPTER: &str = "http";

/// Fetches JSON over HTTP. Config: `url`, optional `method` (GET or POST),
/// `headers` and `body`.
pub struct HttpDataSource {
    client: reqwest::Client,
}

impl HttpDataSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn failure(message: impl Into<String>) -> AdapterError {
        AdapterError::Fetch {
            adapter: ADAPTER.to_string(),
            message: message.into(),
        }
    }
}

impl Default for HttpDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn fetch(&self, config: &Value, _ctx: &ExecutionContext) -> Result<Value, AdapterError> {
        let url = config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::InvalidConfig(vec!["'url' is required".into()]))?;
        let method = config.get("method").and_then(Value::as_str).unwrap_or("GET");

        tracing::debug!("{} {}", method, url);

        let request = match method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => {
                let request = self.client.post(url);
                match config.get("body") {
                    Some(body) => request.json(&body.to_json()),
                    None => request,
                }
            }
            other => {
                return Err(AdapterError::InvalidConfig(vec![format!(
                    "Unsupported method: {}",
                    other
                )]))
            }
        };

        let request = match config.get("headers").and_then(Value::as_object) {
            Some(headers) => headers.iter().fold(request, |request, (key, value)| {
                match value.as_str() {
                    Some(value) => request.header(key.as_str(), value),
                    None => request,
                }
            }),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| Self::failure(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::failure(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Self::failure(format!("{} returned {}", url, status)));
        }

        Ok(match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => Value::from(json),
            Err(_) => Value::String(body),
        })
    }

    fn validate(&self, config: &Value) -> Validation {
        let mut errors = Vec::new();
        match config.get("url").and_then(Value::as_str) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
            Some(url) => errors.push(format!("'{}' is not an http(s) url", url)),
            None => errors.push("'url' is required".to_string()),
        }
        Validation::from_errors(errors)
    }

    fn describe_type(&self) -> &str {
        ADAPTER
    }
}
