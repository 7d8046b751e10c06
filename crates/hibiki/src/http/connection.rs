//! Transport connections.
//!
//! A connection is scoped to one origin and streams one response body at a
//! time. Redirects are surfaced to the caller rather than followed, so the
//! download loop can enforce its own hop limit and re-enter the pool with
//! the redirected origin.

use std::io::SeekFrom;
use std::ops::Deref;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use url::Url;

use crate::error::HibikiResult;
use crate::playlist::ByteRange;

pub const MAX_REDIRECTS: u32 = 3;

const LOCAL_READ_SIZE: usize = 64 * 1024;

/// Outcome of issuing one request on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Redirection,
    Unauthorized,
    NotFound,
    GenericError,
}

impl From<StatusCode> for RequestStatus {
    fn from(status: StatusCode) -> Self {
        if status.is_success() {
            RequestStatus::Success
        } else if status.is_redirection() {
            RequestStatus::Redirection
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            RequestStatus::Unauthorized
        } else if status == StatusCode::NOT_FOUND {
            RequestStatus::NotFound
        } else {
            RequestStatus::GenericError
        }
    }
}

/// Origin identity of a request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    url: Url,
}

impl ConnectionParams {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("")
    }

    pub fn port(&self) -> u16 {
        self.url
            .port_or_known_default()
            .unwrap_or(if self.scheme() == "https" { 443 } else { 80 })
    }

    pub fn is_local(&self) -> bool {
        self.scheme() != "http" && self.scheme() != "https"
    }

    /// Same origin: scheme, host and port all match.
    pub fn same_origin(&self, other: &ConnectionParams) -> bool {
        self.scheme() == other.scheme()
            && self.host() == other.host()
            && self.port() == other.port()
    }
}

/// Cookie-aware wrapper over a shared reqwest client. Redirects are never
/// followed automatically.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> HibikiResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder
            .cookie_provider(cookies_store)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

pub struct HttpConnection {
    client: HttpClient,
    params: ConnectionParams,
    response: Option<reqwest::Response>,
    content_length: Option<u64>,
    content_type: Option<String>,
    redirection: Option<Url>,
    bytes_read: u64,
    available: bool,
}

impl HttpConnection {
    fn new(client: HttpClient, params: ConnectionParams) -> Self {
        Self {
            client,
            params,
            response: None,
            content_length: None,
            content_type: None,
            redirection: None,
            bytes_read: 0,
            available: true,
        }
    }

    fn reset(&mut self) {
        self.response = None;
        self.content_length = None;
        self.content_type = None;
        self.redirection = None;
        self.bytes_read = 0;
    }

    async fn request(&mut self, url: &Url, range: Option<&ByteRange>) -> HibikiResult<RequestStatus> {
        self.reset();
        let mut request = self.client.get(url.clone());
        if let Some(range) = range {
            request = request.header(header::RANGE, range.to_http_range());
        }
        let response = request.send().await?;
        let status = RequestStatus::from(response.status());
        match status {
            RequestStatus::Success => {
                self.content_length = response.content_length();
                self.content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v: &HeaderValue| v.to_str().ok())
                    .map(str::to_string);
                self.response = Some(response);
            }
            RequestStatus::Redirection => {
                self.redirection = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| url.join(loc).ok());
            }
            _ => {}
        }
        Ok(status)
    }

    async fn read_chunk(&mut self) -> HibikiResult<Option<Bytes>> {
        let Some(response) = self.response.as_mut() else {
            return Ok(None);
        };
        match response.chunk().await? {
            Some(bytes) => {
                self.bytes_read += bytes.len() as u64;
                Ok(Some(bytes))
            }
            None => {
                self.response = None;
                Ok(None)
            }
        }
    }
}

/// Reads segments straight off the filesystem, for file:// manifests.
pub struct LocalConnection {
    params: ConnectionParams,
    file: Option<tokio::fs::File>,
    remaining: Option<u64>,
    bytes_read: u64,
    available: bool,
}

impl LocalConnection {
    fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            file: None,
            remaining: None,
            bytes_read: 0,
            available: true,
        }
    }

    async fn request(&mut self, url: &Url, range: Option<&ByteRange>) -> HibikiResult<RequestStatus> {
        let Ok(path) = url.to_file_path() else {
            return Ok(RequestStatus::GenericError);
        };
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RequestStatus::NotFound)
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Ok(RequestStatus::Unauthorized)
            }
            Err(_) => return Ok(RequestStatus::GenericError),
        };
        self.bytes_read = 0;
        self.remaining = None;
        if let Some(range) = range {
            file.seek(SeekFrom::Start(range.offset)).await?;
            self.remaining = range.length;
        }
        self.file = Some(file);
        Ok(RequestStatus::Success)
    }

    async fn read_chunk(&mut self) -> HibikiResult<Option<Bytes>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };
        let want = match self.remaining {
            Some(0) => {
                self.file = None;
                return Ok(None);
            }
            Some(remaining) => (remaining as usize).min(LOCAL_READ_SIZE),
            None => LOCAL_READ_SIZE,
        };
        let mut buf = BytesMut::zeroed(want);
        let n = file.read(&mut buf).await?;
        if n == 0 {
            self.file = None;
            return Ok(None);
        }
        buf.truncate(n);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= n as u64;
        }
        self.bytes_read += n as u64;
        Ok(Some(buf.freeze()))
    }
}

pub enum Connection {
    Http(HttpConnection),
    Local(LocalConnection),
}

impl Connection {
    pub fn can_reuse(&self, params: &ConnectionParams) -> bool {
        match self {
            Connection::Http(c) => c.available && c.params.same_origin(params),
            Connection::Local(c) => c.available && c.params.same_origin(params),
        }
    }

    pub async fn request(
        &mut self,
        url: &Url,
        range: Option<&ByteRange>,
    ) -> HibikiResult<RequestStatus> {
        match self {
            Connection::Http(c) => c.request(url, range).await,
            Connection::Local(c) => c.request(url, range).await,
        }
    }

    pub async fn read_chunk(&mut self) -> HibikiResult<Option<Bytes>> {
        match self {
            Connection::Http(c) => c.read_chunk().await,
            Connection::Local(c) => c.read_chunk().await,
        }
    }

    pub fn content_length(&self) -> Option<u64> {
        match self {
            Connection::Http(c) => c.content_length,
            Connection::Local(c) => c.remaining,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        match self {
            Connection::Http(c) => c.bytes_read,
            Connection::Local(c) => c.bytes_read,
        }
    }

    pub fn redirection(&self) -> Option<&Url> {
        match self {
            Connection::Http(c) => c.redirection.as_ref(),
            Connection::Local(_) => None,
        }
    }

    pub fn set_used(&mut self, used: bool) {
        match self {
            Connection::Http(c) => c.available = !used,
            Connection::Local(c) => c.available = !used,
        }
    }
}

/// Creates connections for the origins it handles.
pub enum ConnectionFactory {
    Http(HttpClient),
    Local,
}

impl ConnectionFactory {
    pub fn handles(&self, params: &ConnectionParams) -> bool {
        match self {
            ConnectionFactory::Http(_) => !params.is_local(),
            ConnectionFactory::Local => params.is_local(),
        }
    }

    pub fn create(&self, params: ConnectionParams) -> Connection {
        match self {
            ConnectionFactory::Http(client) => {
                Connection::Http(HttpConnection::new(client.clone(), params))
            }
            ConnectionFactory::Local => Connection::Local(LocalConnection::new(params)),
        }
    }
}
