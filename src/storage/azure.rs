//! Azure Blob Storage over its REST API
//!
//! Uploads are single `Put Blob` requests (`x-ms-blob-type: BlockBlob`), which replace
//! any existing blob at the same path. A connection string carries either a SAS token,
//! appended to every request URL, or an account key used to sign each request with
//! Shared Key. When the container does not exist it is created once and the upload
//! is sent again.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{validate_blob_path, BlobStore, StorageError};

type HmacSha256 = Hmac<Sha256>;

/// Characters left unescaped inside one blob path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const API_VERSION: &str = "2021-08-06";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const BLOB_CONTENT_TYPE: &str = "application/octet-stream";
const CONTAINER_NOT_FOUND: &str = "ContainerNotFound";

/// How requests are authorized
#[derive(Clone, PartialEq, Eq)]
pub enum AzureCredential {
    /// SAS query string without leading `?`
    Sas(String),
    /// Storage account name and its decoded account key
    SharedKey {
        /// Storage account name
        account: String,
        /// Raw key bytes
        key: Vec<u8>,
    },
}

impl fmt::Debug for AzureCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sas(_) => f.write_str("Sas(<redacted>)"),
            Self::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// Parsed storage connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureConnection {
    /// Blob service endpoint without trailing `/`
    pub blob_endpoint: String,
    /// Request authorization
    pub credential: AzureCredential,
}

impl AzureConnection {
    /// Parse `Key=Value;Key=Value` connection string text.
    ///
    /// The endpoint comes from `BlobEndpoint`, or is derived from `AccountName`,
    /// `EndpointSuffix` and `DefaultEndpointsProtocol`. A `SharedAccessSignature`
    /// wins over an `AccountKey` when both are present.
    pub fn parse(connection_string: &str) -> Result<Self, StorageError> {
        let mut blob_endpoint = None;
        let mut sas_token = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(StorageError::Configuration(format!(
                    "malformed connection string segment '{part}'"
                )));
            };
            let value = value.trim();
            match key.trim() {
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                "SharedAccessSignature" => {
                    sas_token = Some(value.trim_start_matches('?').to_string())
                }
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => suffix = value.to_string(),
                _ => {}
            }
        }

        let account_name = account_name.filter(|a| !a.is_empty());

        let credential = match (
            sas_token.filter(|s| !s.is_empty()),
            account_key.filter(|k| !k.is_empty()),
        ) {
            (Some(token), _) => AzureCredential::Sas(token),
            (None, Some(key)) => {
                let account = account_name.clone().ok_or_else(|| {
                    StorageError::Configuration(
                        "account-key connection string has no AccountName".to_string(),
                    )
                })?;
                let key = BASE64.decode(key.as_bytes()).map_err(|e| {
                    StorageError::Configuration(format!("AccountKey is not valid base64: {e}"))
                })?;
                AzureCredential::SharedKey { account, key }
            }
            (None, None) => {
                return Err(StorageError::Configuration(
                    "connection string has neither SharedAccessSignature nor AccountKey"
                        .to_string(),
                ))
            }
        };

        let blob_endpoint = match (blob_endpoint, account_name) {
            (Some(endpoint), _) if !endpoint.is_empty() => endpoint,
            (_, Some(account)) => format!("{protocol}://{account}.blob.{suffix}"),
            _ => {
                return Err(StorageError::Configuration(
                    "connection string has neither BlobEndpoint nor AccountName".to_string(),
                ))
            }
        };

        Ok(Self {
            blob_endpoint,
            credential,
        })
    }
}

/// `x-ms-date` value for the current time
fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Shared Key string-to-sign for requests without conditional headers
fn string_to_sign(
    method: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(String, String)],
    resource: &str,
) -> String {
    // Zero length is signed as an empty field
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let mut text = format!("{method}\n\n\n{length}\n\n{content_type}\n\n\n\n\n\n\n");
    for (name, value) in ms_headers {
        text.push_str(name);
        text.push(':');
        text.push_str(value);
        text.push('\n');
    }
    text.push_str(resource);
    text
}

/// `/{account}{path}` followed by one `\nname:values` line per query parameter
fn canonical_resource(account: &str, url: &str) -> Result<String, StorageError> {
    let parsed = Url::parse(url)
        .map_err(|e| StorageError::Configuration(format!("invalid storage URL {url}: {e}")))?;

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in parsed.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    let mut resource = format!("/{account}{}", parsed.path());
    for (name, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{name}:{}", values.join(",")));
    }
    Ok(resource)
}

fn shared_key_signature(key: &[u8], string_to_sign: &str) -> Result<String, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StorageError::Configuration(format!("unusable account key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn with_query(url: &str, query: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

/// Status of one storage response plus its `x-ms-error-code`
#[derive(Debug, Clone, PartialEq, Eq)]
struct PutResponse {
    status: u16,
    error_code: Option<String>,
}

impl PutResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_container_not_found(&self) -> bool {
        self.status == 404 && self.error_code.as_deref() == Some(CONTAINER_NOT_FOUND)
    }
}

/// Sends PUT requests to the storage service
#[async_trait]
trait PutTransport: Send + Sync + fmt::Debug {
    /// `Err` only when no response was received
    async fn put(&self, url: &str, headers: HeaderMap, body: Bytes) -> Result<PutResponse, String>;
}

#[derive(Debug, Clone, Default)]
struct ReqwestPut {
    client: Client,
}

#[async_trait]
impl PutTransport for ReqwestPut {
    async fn put(&self, url: &str, headers: HeaderMap, body: Bytes) -> Result<PutResponse, String> {
        let response = self
            .client
            .put(url)
            .headers(headers)
            .timeout(UPLOAD_TIMEOUT)
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let mut error_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // The XML error body names the code too
        if error_code.is_none() && status == 404 {
            let body = response.text().await.unwrap_or_default();
            if body.contains(CONTAINER_NOT_FOUND) {
                error_code = Some(CONTAINER_NOT_FOUND.to_string());
            }
        }

        Ok(PutResponse { status, error_code })
    }
}

/// Blob store writing to one Azure container
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    connection: AzureConnection,
    container: String,
    transport: Arc<dyn PutTransport>,
}

impl AzureBlobStore {
    /// Create a store from a connection string and container name
    pub fn from_connection_string(
        connection_string: &str,
        container: &str,
    ) -> Result<Self, StorageError> {
        let container = container.trim().trim_matches('/');
        if container.is_empty() {
            return Err(StorageError::Configuration(
                "container name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            connection: AzureConnection::parse(connection_string)?,
            container: container.to_string(),
            transport: Arc::new(ReqwestPut::default()),
        })
    }

    #[cfg(test)]
    fn with_transport(mut self, transport: Arc<dyn PutTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Public URL of the blob at `path` (no SAS token)
    pub fn blob_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.container_url(), encoded.join("/"))
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.connection.blob_endpoint, self.container)
    }

    /// Final request URL and headers for a PUT to `url`
    fn authorize(
        &self,
        url: &str,
        date: &str,
        content_length: usize,
        content_type: Option<&str>,
        extra_ms_headers: &[(&str, &str)],
    ) -> Result<(String, HeaderMap), StorageError> {
        let mut ms_headers: Vec<(String, String)> = extra_ms_headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        ms_headers.push(("x-ms-date".to_string(), date.to_string()));
        ms_headers.push(("x-ms-version".to_string(), API_VERSION.to_string()));
        ms_headers.sort();

        let mut headers = HeaderMap::new();
        for (name, value) in &ms_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StorageError::Configuration(format!("invalid header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| StorageError::Configuration(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }
        if let Some(content_type) = content_type {
            let value = HeaderValue::from_str(content_type)
                .map_err(|e| StorageError::Configuration(format!("invalid content type: {e}")))?;
            headers.insert(CONTENT_TYPE, value);
        }

        match &self.connection.credential {
            AzureCredential::Sas(token) => Ok((with_query(url, token), headers)),
            AzureCredential::SharedKey { account, key } => {
                let resource = canonical_resource(account, url)?;
                let text = string_to_sign(
                    "PUT",
                    content_length,
                    content_type.unwrap_or_default(),
                    &ms_headers,
                    &resource,
                );
                let signature = shared_key_signature(key, &text)?;
                let value = HeaderValue::from_str(&format!("SharedKey {account}:{signature}"))
                    .map_err(|e| {
                        StorageError::Configuration(format!("invalid authorization header: {e}"))
                    })?;
                headers.insert(AUTHORIZATION, value);
                Ok((url.to_string(), headers))
            }
        }
    }

    async fn send(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
        path: &str,
    ) -> Result<PutResponse, StorageError> {
        self.transport
            .put(url, headers, body)
            .await
            .map_err(|reason| StorageError::RequestFailed {
                path: path.to_string(),
                reason,
            })
    }

    async fn put_blob(&self, url: &str, data: Bytes, path: &str) -> Result<PutResponse, StorageError> {
        let (request_url, headers) = self.authorize(
            url,
            &http_date(),
            data.len(),
            Some(BLOB_CONTENT_TYPE),
            &[("x-ms-blob-type", "BlockBlob")],
        )?;
        self.send(&request_url, headers, data, path).await
    }

    /// Create the container; an existing one counts as success
    async fn create_container(&self, path: &str) -> Result<(), StorageError> {
        let url = format!("{}?restype=container", self.container_url());
        let (request_url, headers) = self.authorize(&url, &http_date(), 0, None, &[])?;
        let response = self.send(&request_url, headers, Bytes::new(), path).await?;

        match response.status {
            201 => {
                info!(container = %self.container, "Created blob container");
                Ok(())
            }
            409 => Ok(()),
            status => {
                warn!(container = %self.container, status = status, "Container creation rejected");
                Err(StorageError::Rejected {
                    path: path.to_string(),
                    status,
                })
            }
        }
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    async fn store(&self, data: Bytes, path: &str) -> Result<String, StorageError> {
        validate_blob_path(path)?;

        let url = self.blob_url(path);
        let size = data.len();
        let mut response = self.put_blob(&url, data.clone(), path).await?;

        if response.is_container_not_found() {
            info!(container = %self.container, "Container does not exist, creating it");
            self.create_container(path).await?;
            response = self.put_blob(&url, data, path).await?;
        }

        if !response.is_success() {
            warn!(path = %path, status = response.status, "Blob upload rejected");
            return Err(StorageError::Rejected {
                path: path.to_string(),
                status: response.status,
            });
        }

        debug!(url = %url, bytes = size, "Uploaded blob");
        Ok(url)
    }

    fn describe(&self) -> String {
        format!("azure:{}", self.container_url())
    }
}
