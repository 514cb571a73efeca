//! Cloud disk REST API client
//!
//! Implements [`RemoteStore`] over HTTP with `reqwest`. Listing pages
//! through `_embedded.items` with `limit`/`offset`; downloads resolve a
//! one-time `href` and stream its body into a `.part` sibling that is
//! renamed over the destination only once the body is complete.

use super::{normalize_remote_path, DiskUsage, Entry, RemoteStore};
use crate::error::{IoResultExt, OrgDiskError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Default API endpoint
pub const DEFAULT_DISK_API_URL: &str = "https://cloud-api.yandex.net/v1/disk";

/// Default number of items requested per listing page
const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Configuration for [`DiskApiClient`]
#[derive(Debug, Clone)]
pub struct DiskApiConfig {
    /// Base URL of the disk API (no trailing slash)
    pub base_url: String,
    /// Items per listing page
    pub page_size: u32,
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Longest pause allowed between reads of a response
    pub read_timeout: Duration,
}

impl Default for DiskApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DISK_API_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(rename = "_embedded")]
    embedded: Option<ResourceList>,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    items: Vec<ResourceItem>,
}

#[derive(Debug, Deserialize)]
struct ResourceItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DiskInfoResponse {
    used_space: u64,
    total_space: Option<u64>,
    trash_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LinkResponse {
    href: String,
}

/// Build the HTTP client used for disk sessions
///
/// Only idle time is bounded, never the whole request, so large bodies
/// stream for as long as data keeps arriving.
pub fn http_client(config: &DiskApiConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .build()
        .map_err(|e| OrgDiskError::config(format!("Failed to build HTTP client: {}", e)))
}

/// HTTP client for a single user's disk
pub struct DiskApiClient {
    http: Client,
    config: DiskApiConfig,
    token: String,
}

impl DiskApiClient {
    /// Create a client authenticated with `token`
    pub fn new(token: impl Into<String>, config: DiskApiConfig) -> Result<Self> {
        let http = http_client(&config)?;
        Ok(Self::with_http(http, token, config))
    }

    /// Create a client sharing an existing connection pool
    pub fn with_http(http: Client, token: impl Into<String>, config: DiskApiConfig) -> Self {
        Self {
            http,
            config: DiskApiConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            token: token.into(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url, endpoint)
    }

    fn authorization(&self) -> String {
        format!("OAuth {}", self.token)
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Response> {
        let response = self
            .http
            .get(self.url(endpoint))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .query(params)
            .send()
            .await?;
        Ok(response)
    }
}

/// Turn a non-success response into an error body
async fn failure_message(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    (status, format!("{}: {}", status, body.trim()))
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Sibling the body is written to before it takes the final name
fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}

async fn write_body(response: Response, remote_path: &str, target: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(target).await.with_path(target)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| OrgDiskError::download(remote_path, e.to_string()))?;
        file.write_all(&chunk).await.with_path(target)?;
        written += chunk.len() as u64;
    }

    file.flush().await.with_path(target)?;
    Ok(written)
}

#[async_trait]
impl RemoteStore for DiskApiClient {
    async fn list(&self, path: &str) -> Result<Vec<Entry>> {
        let path = normalize_remote_path(path);
        let mut entries = Vec::new();
        let mut offset = 0u32;

        loop {
            let params = [
                ("path", path.clone()),
                ("limit", self.config.page_size.to_string()),
                ("offset", offset.to_string()),
                ("fields", "_embedded.items.path,_embedded.items.type,_embedded.items.size".to_string()),
            ];

            let response = self
                .get("/resources", &params)
                .await
                .map_err(|e| OrgDiskError::listing(&path, e.to_string()))?;

            if !response.status().is_success() {
                let (status, message) = failure_message(response).await;
                if is_auth_failure(status) {
                    return Err(OrgDiskError::auth("disk session", message));
                }
                return Err(OrgDiskError::listing(&path, message));
            }

            let page: ResourceResponse = response
                .json()
                .await
                .map_err(|e| OrgDiskError::listing(&path, format!("invalid listing body: {}", e)))?;

            let items = page.embedded.map(|e| e.items).unwrap_or_default();
            let page_len = items.len() as u32;

            for item in items {
                match item.kind.as_str() {
                    "dir" => entries.push(Entry::directory(&item.path)),
                    "file" => entries.push(Entry::file(&item.path, item.size)),
                    other => debug!("Ignoring '{}' of unknown type '{}'", item.path, other),
                }
            }

            if page_len < self.config.page_size {
                break;
            }
            offset += page_len;
        }

        Ok(entries)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let remote_path = normalize_remote_path(remote_path);
        let fail = |message: String| OrgDiskError::download(&remote_path, message);

        let response = self
            .get("/resources/download", &[("path", remote_path.clone())])
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            let (status, message) = failure_message(response).await;
            if is_auth_failure(status) {
                return Err(OrgDiskError::auth("disk session", message));
            }
            return Err(fail(message));
        }

        let link: LinkResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("invalid download link: {}", e)))?;

        // the href is pre-signed and may point at another host
        let response = self
            .http
            .get(&link.href)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !response.status().is_success() {
            let (_, message) = failure_message(response).await;
            return Err(fail(message));
        }

        let partial = partial_path(local_path);
        let written = match write_body(response, &remote_path, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        let renamed = tokio::fs::rename(&partial, local_path).await.with_path(local_path);
        if renamed.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        renamed?;
        Ok(written)
    }

    async fn disk_usage(&self) -> Result<DiskUsage> {
        let response = self.get("", &[]).await?;
        let status = response.status();

        if !status.is_success() {
            let (status, message) = failure_message(response).await;
            if is_auth_failure(status) {
                return Err(OrgDiskError::auth("disk session", message));
            }
            return Err(OrgDiskError::RemoteApi { status: status.as_u16(), message });
        }

        let info: DiskInfoResponse = response.json().await?;
        Ok(DiskUsage {
            used_bytes: info.used_space,
            total_bytes: info.total_space,
            trash_bytes: info.trash_size,
        })
    }

    async fn remove(&self, path: &str, permanently: bool) -> Result<()> {
        let path = normalize_remote_path(path);
        let response = self
            .http
            .delete(self.url("/resources"))
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .query(&[("path", path.clone()), ("permanently", permanently.to_string())])
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::ACCEPTED | StatusCode::OK => Ok(()),
            _ => {
                let (status, message) = failure_message(response).await;
                if is_auth_failure(status) {
                    return Err(OrgDiskError::auth("disk session", message));
                }
                Err(OrgDiskError::RemoteApi {
                    status: status.as_u16(),
                    message: format!("removing '{}': {}", path, message),
                })
            }
        }
    }

    async fn check_session(&self) -> Result<()> {
        self.disk_usage().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    /// Canned HTTP reply; each body chunk is written after its delay
    struct Reply {
        status: u16,
        chunks: Vec<(Duration, Vec<u8>)>,
    }

    impl Reply {
        fn json(status: u16, body: impl Into<String>) -> Self {
            Self {
                status,
                chunks: vec![(Duration::ZERO, body.into().into_bytes())],
            }
        }

        /// Body sent one byte at a time, `byte_delay` apart
        fn trickle(body: &[u8], byte_delay: Duration) -> Self {
            Self {
                status: 200,
                chunks: body.iter().map(|b| (byte_delay, vec![*b])).collect(),
            }
        }

        /// First `sent` bytes at once, the rest after `pause`
        fn stalled(body: &[u8], sent: usize, pause: Duration) -> Self {
            Self {
                status: 200,
                chunks: vec![
                    (Duration::ZERO, body[..sent].to_vec()),
                    (pause, body[sent..].to_vec()),
                ],
            }
        }
    }

    /// Local HTTP/1.1 server answering each request from a routing closure
    struct StubServer {
        base: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        async fn start<F>(route: F) -> Self
        where
            F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));

            let route = Arc::new(route);
            let log = Arc::clone(&requests);
            let server_base = base.clone();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let route = Arc::clone(&route);
                    let log = Arc::clone(&log);
                    let base = server_base.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let reply = route(&base, request_target(&head));
                        log.lock().unwrap().push(head);
                        let _ = write_reply(&mut socket, reply).await;
                    });
                }
            });

            Self { base, requests }
        }

        fn client(&self, page_size: u32) -> DiskApiClient {
            let config = DiskApiConfig {
                base_url: format!("{}/v1/disk", self.base),
                page_size,
                connect_timeout: Duration::from_secs(2),
                read_timeout: Duration::from_millis(500),
            };
            DiskApiClient::new("secret-token", config).unwrap()
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn read_head(socket: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }
        String::from_utf8_lossy(&head).into_owned()
    }

    async fn write_reply(socket: &mut TcpStream, reply: Reply) -> std::io::Result<()> {
        socket.set_nodelay(true)?;
        let length: usize = reply.chunks.iter().map(|(_, c)| c.len()).sum();
        let head = format!(
            "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            reply.status, length
        );
        socket.write_all(head.as_bytes()).await?;

        for (delay, chunk) in reply.chunks {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            socket.write_all(&chunk).await?;
        }
        socket.shutdown().await
    }

    fn request_target(head: &str) -> &str {
        head.split_whitespace().nth(1).unwrap_or("")
    }

    fn query_param<'a>(target: &'a str, key: &str) -> Option<&'a str> {
        let (_, query) = target.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    fn listing_page(offset: usize, names: &[&str]) -> String {
        let items: Vec<String> = names
            .iter()
            .map(|n| format!(r#"{{"path": "disk:/{}", "type": "file", "size": 1}}"#, n))
            .collect();
        format!(
            r#"{{"_embedded": {{"items": [{}], "limit": 2, "offset": {}}}}}"#,
            items.join(","),
            offset
        )
    }

    #[test]
    fn test_parse_listing_page() {
        let body = r#"{
            "_embedded": {
                "items": [
                    {"path": "disk:/Docs", "type": "dir", "name": "Docs"},
                    {"path": "disk:/a.txt", "type": "file", "name": "a.txt", "size": 12}
                ],
                "limit": 1000,
                "offset": 0
            },
            "path": "disk:/",
            "type": "dir"
        }"#;

        let page: ResourceResponse = serde_json::from_str(body).unwrap();
        let items = page.embedded.unwrap().items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, "dir");
        assert_eq!(items[1].size, Some(12));
    }

    #[test]
    fn test_parse_disk_info() {
        let body = r#"{"used_space": 1048576, "total_space": 10737418240, "trash_size": 0, "is_paid": false}"#;
        let info: DiskInfoResponse = serde_json::from_str(body).unwrap();
        assert_eq!(info.used_space, 1_048_576);
        assert_eq!(info.total_space, Some(10_737_418_240));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = DiskApiClient::with_http(
            Client::new(),
            "token",
            DiskApiConfig {
                base_url: "http://localhost:8080/v1/disk/".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(client.url("/resources"), "http://localhost:8080/v1/disk/resources");
        assert_eq!(client.authorization(), "OAuth token");
    }

    #[test]
    fn test_partial_path_is_a_sibling() {
        let partial = partial_path(Path::new("/out/user/report.pdf"));
        assert_eq!(partial, PathBuf::from("/out/user/report.pdf.part"));
    }

    #[tokio::test]
    async fn test_listing_follows_pages_until_short_page() {
        let server = StubServer::start(|_, target| {
            match query_param(target, "offset") {
                Some("0") => Reply::json(200, listing_page(0, &["a", "b"])),
                Some("2") => Reply::json(200, listing_page(2, &["c", "d"])),
                _ => Reply::json(200, listing_page(4, &[])),
            }
        })
        .await;

        let entries = server.client(2).list("/").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c", "/d"]);

        // the last full page forces one more, empty, request
        let offsets: Vec<String> = server
            .requests()
            .iter()
            .filter_map(|head| query_param(request_target(head), "offset").map(str::to_string))
            .collect();
        assert_eq!(offsets, vec!["0", "2", "4"]);
    }

    #[tokio::test]
    async fn test_listing_status_mapping() {
        let server = StubServer::start(|_, target| match query_param(target, "path") {
            Some("%2Fexpired") => Reply::json(401, r#"{"error": "UnauthorizedError"}"#),
            Some("%2Fforbidden") => Reply::json(403, r#"{"error": "ForbiddenError"}"#),
            _ => Reply::json(500, r#"{"error": "InternalError"}"#),
        })
        .await;
        let client = server.client(1000);

        let err = client.list("/expired").await.unwrap_err();
        assert!(matches!(err, OrgDiskError::Auth { .. }));
        let err = client.list("/forbidden").await.unwrap_err();
        assert!(matches!(err, OrgDiskError::Auth { .. }));

        let err = client.list("/broken").await.unwrap_err();
        assert!(matches!(err, OrgDiskError::Listing { .. }));
        assert_eq!(err.remote_path(), Some("/broken"));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_disk_usage_status_mapping() {
        let server = StubServer::start(|_, target| {
            if target.contains("expired") {
                Reply::json(401, "{}")
            } else {
                Reply::json(503, "{}")
            }
        })
        .await;

        let mut client = server.client(1000);
        let err = client.disk_usage().await.unwrap_err();
        assert!(matches!(err, OrgDiskError::RemoteApi { status: 503, .. }));
        assert!(err.is_recoverable());

        client.config.base_url = format!("{}/expired", server.base);
        let err = client.disk_usage().await.unwrap_err();
        assert!(matches!(err, OrgDiskError::Auth { .. }));
    }

    #[tokio::test]
    async fn test_slow_steady_download_completes() {
        let body = b"0123456789";
        let server = StubServer::start(move |base, target| {
            if target.starts_with("/v1/disk/resources/download") {
                Reply::json(200, format!(r#"{{"href": "{}/signed/big.bin"}}"#, base))
            } else {
                // 1s in total, each gap well under the read timeout
                Reply::trickle(body, Duration::from_millis(100))
            }
        })
        .await;
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("big.bin");

        let written = server.client(1000).download("/big.bin", &target).await.unwrap();

        assert_eq!(written, 10);
        assert_eq!(std::fs::read(&target).unwrap(), body);
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_signed_link_fetched_without_token() {
        let server = StubServer::start(|base, target| {
            if target.starts_with("/v1/disk/resources/download") {
                Reply::json(200, format!(r#"{{"href": "{}/signed/a.txt"}}"#, base))
            } else {
                Reply::json(200, "abc")
            }
        })
        .await;
        let tmp = TempDir::new().unwrap();

        server
            .client(1000)
            .download("/a.txt", &tmp.path().join("a.txt"))
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        for head in &requests {
            let has_token = head.to_lowercase().contains("authorization: oauth secret-token");
            assert_eq!(has_token, request_target(head).starts_with("/v1/disk/"), "{}", head);
        }
    }

    #[tokio::test]
    async fn test_stalled_download_leaves_no_file() {
        let server = StubServer::start(|base, target| {
            if target.starts_with("/v1/disk/resources/download") {
                Reply::json(200, format!(r#"{{"href": "{}/signed/stall.bin"}}"#, base))
            } else {
                Reply::stalled(b"abcdef", 3, Duration::from_secs(2))
            }
        })
        .await;
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("stall.bin");

        let err = server.client(1000).download("/stall.bin", &target).await.unwrap_err();

        assert!(matches!(err, OrgDiskError::Download { .. }));
        assert!(err.is_recoverable());
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_download_status_mapping() {
        let server = StubServer::start(|_, target| match query_param(target, "path") {
            Some("%2Fexpired.txt") => Reply::json(401, "{}"),
            _ => Reply::json(404, r#"{"error": "DiskNotFoundError"}"#),
        })
        .await;
        let tmp = TempDir::new().unwrap();
        let client = server.client(1000);

        let err = client
            .download("/expired.txt", &tmp.path().join("expired.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrgDiskError::Auth { .. }));

        let target = tmp.path().join("gone.txt");
        let err = client.download("/gone.txt", &target).await.unwrap_err();
        assert!(matches!(err, OrgDiskError::Download { .. }));
        assert!(err.to_string().contains("404"));
        assert!(!target.exists());
    }
}
