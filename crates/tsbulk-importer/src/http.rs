//! HTTP client for InfluxDB-compatible stores

use crate::client::{ColumnWriteClient, QueryClient, QueryResponse, RowWriteClient};
use crate::column::{WriteRequest, WriteResponse, CODE_FAILURE};
use crate::config::ConnectionConfig;
use crate::error::{ImportError, Result};
use crate::protocol::render_line;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use tracing::debug;
use tsbulk_core::Precision;

const USER_AGENT: &str = concat!("tsbulk-import/", env!("CARGO_PKG_VERSION"));

/// HTTP client speaking the `/ping`, `/query` and `/write` endpoints
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpClient {
    /// Create a new client for the configured server
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        let base_url = config.url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_auth(&self, builder: RequestBuilder, username: &str, password: &str) -> RequestBuilder {
        if username.is_empty() {
            builder
        } else {
            builder.basic_auth(username, Some(password))
        }
    }

    /// Check that the server is reachable
    pub async fn ping(&self) -> Result<()> {
        let url = format!("{}/ping", self.base_url);
        let request = self.with_auth(self.client.get(&url), &self.username, &self.password);
        let response = request.send().await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => Err(server_error(status, response).await),
        }
    }

    async fn post_write(
        &self,
        database: &str,
        retention_policy: &str,
        body: String,
        precision: Precision,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let url = format!("{}/write", self.base_url);
        let mut params = vec![("db", database), ("precision", precision.as_str())];
        if !retention_policy.is_empty() {
            params.push(("rp", retention_policy));
        }

        let bytes = body.len();
        let request = self
            .client
            .post(&url)
            .query(&params)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        let response = self.with_auth(request, username, password).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                debug!(database = %database, bytes, "Write accepted");
                Ok(())
            }
            status => Err(server_error(status, response).await),
        }
    }
}

async fn server_error(status: StatusCode, response: reqwest::Response) -> ImportError {
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    ImportError::Server {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl QueryClient for HttpClient {
    async fn query(&self, command: &str) -> Result<QueryResponse> {
        let url = format!("{}/query", self.base_url);
        let request = self
            .with_auth(self.client.post(&url), &self.username, &self.password)
            .form(&[("q", command)]);
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(server_error(status, response).await);
        }

        let body: QueryResponse = response.json().await?;
        if let Some(message) = body.error_message() {
            return Err(ImportError::Server {
                status: status.as_u16(),
                message: message.to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl RowWriteClient for HttpClient {
    async fn write(
        &self,
        database: &str,
        retention_policy: &str,
        raw: &str,
        precision: Precision,
    ) -> Result<()> {
        self.post_write(
            database,
            retention_policy,
            raw.to_string(),
            precision,
            &self.username,
            &self.password,
        )
        .await
    }
}

/// Column-write over the textual endpoint: the request is rendered back to
/// line protocol with nanosecond timestamps. A rejected write is reported
/// through the response code, transport failures as errors.
#[async_trait]
impl ColumnWriteClient for HttpClient {
    async fn write(&self, request: WriteRequest) -> Result<WriteResponse> {
        let body = request_to_line_protocol(&request);
        let username = request.username.as_deref().unwrap_or(&self.username);
        let password = request.password.as_deref().unwrap_or(&self.password);

        match self
            .post_write(
                &request.database,
                &request.retention_policy,
                body,
                Precision::Nanos,
                username,
                password,
            )
            .await
        {
            Ok(()) => Ok(WriteResponse::success()),
            Err(ImportError::Server { status, message }) => Ok(WriteResponse::with_code(
                CODE_FAILURE,
                format!("{}: {}", status, message),
            )),
            Err(e) => Err(e),
        }
    }
}

/// Render every record line of a request, measurement by measurement
pub fn request_to_line_protocol(request: &WriteRequest) -> String {
    request
        .records
        .iter()
        .flat_map(|record| {
            record.lines.iter().map(move |line| {
                render_line(
                    &record.measurement,
                    &line.tags,
                    &line.fields,
                    Some(line.timestamp),
                )
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}
