//! Fake GitOps controller and repository backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing,
};
use gitops_webhook::config::RepositoryConfig;
use gitops_webhook::repository::{
    Branch, RepositoryService, RepositoryServiceFactory, ScmProtocol,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;

/// Self-signed certificate for `controller.invalid` and its PKCS#8 key
const SELF_SIGNED_CERT: &[u8] = include_bytes!("../fixtures/self_signed_cert.der");
const SELF_SIGNED_KEY: &[u8] = include_bytes!("../fixtures/self_signed_key.der");

#[derive(Debug, Clone)]
pub struct ReceivedWebhook {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReceivedWebhook {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Clone)]
struct ControllerState {
    received: Arc<Mutex<Vec<ReceivedWebhook>>>,
    status: StatusCode,
}

/// An HTTP server recording every webhook POSTed to `/api/webhook`
pub struct FakeController {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedWebhook>>>,
}

impl FakeController {
    pub async fn start(status: StatusCode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = ControllerState {
            received: received.clone(),
            status,
        };
        let app = Router::new()
            .route("/api/webhook", routing::post(receive))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, received }
    }

    pub fn url(&self) -> String {
        format!("http://{}/api/webhook", self.addr)
    }

    pub fn received(&self) -> Vec<ReceivedWebhook> {
        self.received.lock().unwrap().clone()
    }
}

async fn receive(
    State(state): State<ControllerState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state
        .received
        .lock()
        .unwrap()
        .push(ReceivedWebhook { headers, body });
    state.status
}

/// An HTTPS controller whose certificate no client can verify: it is
/// self-signed and issued for `controller.invalid`, not the loopback address.
///
/// Answers every request with an empty 200 and records the request bodies.
pub struct TlsController {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl TlsController {
    pub async fn start() -> Self {
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![CertificateDer::from(SELF_SIGNED_CERT.to_vec())],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(SELF_SIGNED_KEY.to_vec())),
        )
        .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    // verifying clients abort the handshake
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    if let Some(body) = read_request_body(&mut tls).await {
                        sink.lock().unwrap().push(body);
                    }
                    let _ = tls
                        .write_all(
                            b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        )
                        .await;
                    let _ = tls.shutdown().await;
                });
            }
        });

        Self { addr, received }
    }

    pub fn url(&self) -> String {
        format!("https://{}/api/webhook", self.addr)
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

/// Reads one HTTP/1.1 request and returns its `Content-Length` body
async fn read_request_body<S: AsyncRead + Unpin>(stream: &mut S) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break end;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let body_start = header_end + 4;
    while buffer.len() < body_start + length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    Some(buffer[body_start..body_start + length].to_vec())
}

/// A URL nothing listens on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api/webhook", addr)
}

#[derive(Debug, Clone)]
pub struct StaticRepository {
    pub protocols: Vec<ScmProtocol>,
    pub branches: Vec<Branch>,
}

impl StaticRepository {
    pub fn new(html_url: &str, default_branch: &str) -> Self {
        Self {
            protocols: vec![
                ScmProtocol::new("ssh", "ssh://scm.example.com/team/app"),
                ScmProtocol::new("http", html_url),
            ],
            branches: vec![
                Branch::default_branch(default_branch),
                Branch::normal("feature"),
            ],
        }
    }
}

#[async_trait]
impl RepositoryService for StaticRepository {
    async fn supported_protocols(&self) -> io::Result<Vec<ScmProtocol>> {
        Ok(self.protocols.clone())
    }

    async fn branches(&self) -> io::Result<Vec<Branch>> {
        Ok(self.branches.clone())
    }
}

/// Hands out the same [`StaticRepository`] for every configured repository
pub struct StaticRepositoryFactory(pub StaticRepository);

impl RepositoryServiceFactory for StaticRepositoryFactory {
    fn create(&self, _repository: &RepositoryConfig) -> Box<dyn RepositoryService> {
        Box::new(self.0.clone())
    }
}
