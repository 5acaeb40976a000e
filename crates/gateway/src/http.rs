//! reqwest implementation of the gateway.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use fzm_protocol::Endpoint;
use fzm_protocol::constants::{
    ARCHIVE_CONTENT_TYPE, MOD_UPLOAD_LIMIT, SAVE_UPLOAD_LIMIT, paths,
};

use crate::error::GatewayError;
use crate::gateway::{ActionGateway, GatewayFuture};
use crate::types::{LoginResponse, ProgressFn, StartResponse, TransferProgress, UploadSource};

/// Gateway talking to the service's HTTP API.
pub struct HttpGateway {
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl HttpGateway {
    /// Creates a gateway for `endpoint`.
    pub fn new(endpoint: Endpoint) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fzm/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Posts a form and checks the status.
    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<reqwest::Response, GatewayError> {
        let url = self.endpoint.api_url(path);
        debug!(%url, "POST");
        let resp = self.http.post(&url).form(form).send().await?;
        check_status(resp).await
    }

    async fn login_impl(
        &self,
        user_token: Option<&str>,
        visit_secret: &str,
    ) -> Result<LoginResponse, GatewayError> {
        let mut form = Vec::with_capacity(3);
        if let Some(token) = user_token.filter(|t| !t.is_empty()) {
            form.push(("userToken", token.to_string()));
        }
        form.push(("visitSecret", visit_secret.to_string()));
        form.push(("reconnected", "false".to_string()));

        let resp = match self.post_form(paths::USER_LOGIN, &form).await {
            Ok(resp) => resp,
            Err(GatewayError::Remote { body, .. }) => return Err(GatewayError::Auth(body)),
            Err(e) => return Err(e),
        };
        let body = resp.bytes().await?;
        let login: LoginResponse = serde_json::from_slice(&body)?;
        info!("logged in");
        Ok(login)
    }

    /// Streams `source` as a multipart upload after the size guard.
    async fn upload_impl(
        &self,
        path: &str,
        limit: u64,
        visit_secret: &str,
        source: &UploadSource,
        slot: Option<&str>,
        progress: Option<ProgressFn>,
    ) -> Result<(), GatewayError> {
        if source.size_bytes > limit {
            return Err(GatewayError::SizeLimit {
                size: source.size_bytes,
                limit,
            });
        }

        let file = tokio::fs::File::open(&source.path).await?;
        let length = file.metadata().await?.len();

        let mut sent = 0u64;
        let body = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                if let Some(cb) = &progress {
                    cb(TransferProgress {
                        transferred: sent,
                        total: Some(length),
                    });
                }
            }
            chunk
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body), length)
            .file_name(source.name.clone())
            .mime_str(ARCHIVE_CONTENT_TYPE)?;
        let mut form = Form::new()
            .text("visitSecret", visit_secret.to_string())
            .part("file", part)
            .text("size", source.size_bytes.to_string());
        if let Some(slot) = slot {
            form = form.text("save", slot.to_string());
        }

        let url = self.endpoint.api_url(path);
        info!(%url, name = %source.name, bytes = length, "uploading");
        let resp = self.http.post(&url).multipart(form).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn download_impl(
        &self,
        visit_secret: &str,
        slot: &str,
        dest: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<u64, GatewayError> {
        let form = [
            ("visitSecret", visit_secret.to_string()),
            ("save", slot.to_string()),
        ];
        let resp = self.post_form(paths::SAVE_DOWNLOAD, &form).await?;
        let total = resp.content_length();

        let partial = partial_path(dest);
        let written = match write_body(resp, &partial, total, progress.as_ref()).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, dest).await?;

        info!(slot, dest = %dest.display(), bytes = written, "save downloaded");
        Ok(written)
    }

    async fn start_impl(
        &self,
        visit_secret: &str,
        region: &str,
        version: &str,
        slot: &str,
    ) -> Result<String, GatewayError> {
        let form = [
            ("visitSecret", visit_secret.to_string()),
            ("region", region.to_string()),
            ("version", version.to_string()),
            ("save", slot.to_string()),
        ];
        let resp = self.post_form(paths::INSTANCE_START, &form).await?;
        let body = resp.bytes().await?;
        let start: StartResponse = serde_json::from_slice(&body)?;
        let launch_id = start.launch_id().unwrap_or_default();
        info!(region, version, slot, %launch_id, "instance start requested");
        Ok(launch_id)
    }
}

/// Download target while bytes are still arriving: `slot2.zip` → `slot2.zip.part`.
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Streams the response body into `path`, returning the byte count.
async fn write_body(
    resp: reqwest::Response,
    path: &Path,
    total: Option<u64>,
    progress: Option<&ProgressFn>,
) -> Result<u64, GatewayError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    let mut body = resp.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if let Some(cb) = progress {
            cb(TransferProgress {
                transferred: written,
                total,
            });
        }
    }
    file.flush().await?;
    Ok(written)
}

/// Maps a non-success status to [`GatewayError::Remote`] with the body text.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), %body, "service rejected request");
    Err(GatewayError::Remote {
        status: status.as_u16(),
        body,
    })
}

fn secret_form(visit_secret: &str) -> Vec<(&'static str, String)> {
    vec![("visitSecret", visit_secret.to_string())]
}

impl ActionGateway for HttpGateway {
    fn login<'a>(
        &'a self,
        user_token: Option<&'a str>,
        visit_secret: &'a str,
    ) -> GatewayFuture<'a, LoginResponse> {
        Box::pin(self.login_impl(user_token, visit_secret))
    }

    fn toggle_mod<'a>(
        &'a self,
        visit_secret: &'a str,
        mod_id: i64,
        enabled: bool,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut form = secret_form(visit_secret);
            form.push(("modId", mod_id.to_string()));
            form.push(("enabled", enabled.to_string()));
            self.post_form(paths::MOD_TOGGLE, &form).await?;
            Ok(())
        })
    }

    fn delete_mod<'a>(&'a self, visit_secret: &'a str, mod_id: i64) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut form = secret_form(visit_secret);
            form.push(("modId", mod_id.to_string()));
            self.post_form(paths::MOD_DELETE, &form).await?;
            Ok(())
        })
    }

    fn upload_mod<'a>(
        &'a self,
        visit_secret: &'a str,
        source: &'a UploadSource,
        progress: Option<ProgressFn>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(self.upload_impl(
            paths::MOD_UPLOAD,
            MOD_UPLOAD_LIMIT,
            visit_secret,
            source,
            None,
            progress,
        ))
    }

    fn upload_save<'a>(
        &'a self,
        visit_secret: &'a str,
        source: &'a UploadSource,
        slot: &'a str,
        progress: Option<ProgressFn>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(self.upload_impl(
            paths::SAVE_UPLOAD,
            SAVE_UPLOAD_LIMIT,
            visit_secret,
            source,
            Some(slot),
            progress,
        ))
    }

    fn delete_save<'a>(&'a self, visit_secret: &'a str, slot: &'a str) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut form = secret_form(visit_secret);
            form.push(("save", slot.to_string()));
            self.post_form(paths::SAVE_DELETE, &form).await?;
            Ok(())
        })
    }

    fn download_save<'a>(
        &'a self,
        visit_secret: &'a str,
        slot: &'a str,
        dest: &'a Path,
        progress: Option<ProgressFn>,
    ) -> GatewayFuture<'a, u64> {
        Box::pin(self.download_impl(visit_secret, slot, dest, progress))
    }

    fn send_command<'a>(
        &'a self,
        visit_secret: &'a str,
        launch_id: Option<&'a str>,
        input: &'a str,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut form = secret_form(visit_secret);
            if let Some(id) = launch_id {
                form.push(("launchId", id.to_string()));
            }
            form.push(("input", input.to_string()));
            self.post_form(paths::INSTANCE_CONSOLE, &form).await?;
            Ok(())
        })
    }

    fn start_instance<'a>(
        &'a self,
        visit_secret: &'a str,
        region: &'a str,
        version: &'a str,
        slot: &'a str,
    ) -> GatewayFuture<'a, String> {
        Box::pin(self.start_impl(visit_secret, region, version, slot))
    }

    fn stop_instance<'a>(
        &'a self,
        visit_secret: &'a str,
        launch_id: Option<&'a str>,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move {
            let mut form = secret_form(visit_secret);
            if let Some(id) = launch_id {
                form.push(("launchId", id.to_string()));
            }
            self.post_form(paths::INSTANCE_STOP, &form).await?;
            info!("instance stop requested");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    /// Captured request: head and body as text.
    struct Captured {
        head: String,
        body: String,
    }

    /// Reads one HTTP/1.1 request with a `Content-Length` body.
    async fn read_request(stream: &mut TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
        let length = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[head_end..]).to_string();
        Captured { head, body }
    }

    /// Starts a one-shot server answering with `status` and `body`.
    async fn mock_server(
        status: u16,
        body: &'static [u8],
    ) -> (Endpoint, oneshot::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let captured = read_request(&mut stream).await;
                let head = format!(
                    "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(body).await;
                let _ = stream.shutdown().await;
                let _ = tx.send(captured);
            }
        });

        (Endpoint::new(addr.to_string()), rx)
    }

    fn gateway(endpoint: Endpoint) -> HttpGateway {
        HttpGateway::new(endpoint).unwrap()
    }

    #[tokio::test]
    async fn login_sends_secret_and_parses_tokens() {
        let (ep, rx) = mock_server(200, br#"{"userToken":"tok-1","referralCode":"ref-1"}"#).await;

        let resp = gateway(ep).login(None, "s1").await.unwrap();
        assert_eq!(resp.user_token, "tok-1");
        assert_eq!(resp.referral_code, "ref-1");

        let req = rx.await.unwrap();
        assert!(req.head.starts_with("POST /api/user/login "));
        assert_eq!(req.body, "visitSecret=s1&reconnected=false");
    }

    #[tokio::test]
    async fn login_presents_stored_token() {
        let (ep, rx) = mock_server(200, br#"{"userToken":"tok-1","referralCode":""}"#).await;

        gateway(ep).login(Some("tok-1"), "s1").await.unwrap();

        let req = rx.await.unwrap();
        assert_eq!(req.body, "userToken=tok-1&visitSecret=s1&reconnected=false");
    }

    #[tokio::test]
    async fn login_rejection_is_auth_error() {
        let (ep, _rx) = mock_server(403, b"bad secret").await;

        let err = gateway(ep).login(None, "s1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(ref body) if body == "bad secret"));
    }

    #[tokio::test]
    async fn toggle_mod_posts_form() {
        let (ep, rx) = mock_server(200, b"").await;

        gateway(ep).toggle_mod("s1", 5, true).await.unwrap();

        let req = rx.await.unwrap();
        assert!(req.head.starts_with("POST /api/mod/toggle "));
        assert_eq!(req.body, "visitSecret=s1&modId=5&enabled=true");
    }

    #[tokio::test]
    async fn remote_error_carries_status_and_text() {
        let (ep, _rx) = mock_server(500, b"mod not found").await;

        let err = gateway(ep).delete_mod("s1", 9).await.unwrap_err();
        match err {
            GatewayError::Remote { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "mod not found");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_command_includes_launch_id_and_input() {
        let (ep, rx) = mock_server(200, b"").await;

        gateway(ep)
            .send_command("s1", Some("L7"), "/players")
            .await
            .unwrap();

        let req = rx.await.unwrap();
        assert!(req.head.starts_with("POST /api/instance/console "));
        assert_eq!(req.body, "visitSecret=s1&launchId=L7&input=%2Fplayers");
    }

    #[tokio::test]
    async fn start_instance_returns_launch_id() {
        let (ep, rx) = mock_server(200, br#"{"launchId":4242}"#).await;

        let id = gateway(ep)
            .start_instance("s1", "eu-central-1", "1.1.100", "slot2")
            .await
            .unwrap();
        assert_eq!(id, "4242");

        let req = rx.await.unwrap();
        assert_eq!(
            req.body,
            "visitSecret=s1&region=eu-central-1&version=1.1.100&save=slot2"
        );
    }

    /// Counts accepted connections and drops them immediately.
    async fn counting_server() -> (Endpoint, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                c.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });
        (Endpoint::new(addr.to_string()), count)
    }

    #[tokio::test]
    async fn upload_mod_over_limit_never_touches_network() {
        let (ep, count) = counting_server().await;
        let source = UploadSource {
            name: "huge.zip".into(),
            path: "/nonexistent/huge.zip".into(),
            size_bytes: MOD_UPLOAD_LIMIT + 1,
        };

        let err = gateway(ep).upload_mod("s1", &source, None).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::SizeLimit {
                size: 268_435_457,
                limit: 268_435_456
            }
        ));

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_mod_at_limit_reaches_network() {
        let (ep, count) = counting_server().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge.zip");
        std::fs::write(&path, b"PK").unwrap();
        let source = UploadSource {
            name: "edge.zip".into(),
            path,
            size_bytes: MOD_UPLOAD_LIMIT,
        };

        let err = gateway(ep).upload_mod("s1", &source, None).await.unwrap_err();
        assert!(!matches!(err, GatewayError::SizeLimit { .. }));
        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn upload_save_streams_multipart_with_progress() {
        let (ep, rx) = mock_server(200, b"").await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.zip");
        std::fs::write(&path, vec![b'z'; 20_000]).unwrap();
        let source = UploadSource::from_path(&path).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let progress: ProgressFn = Arc::new(move |p: TransferProgress| {
            s.lock().unwrap().push(p.transferred);
        });

        gateway(ep)
            .upload_save("s1", &source, "slot3", Some(progress))
            .await
            .unwrap();

        let req = rx.await.unwrap();
        assert!(req.head.starts_with("POST /api/save/upload "));
        assert!(req.head.to_ascii_lowercase().contains("multipart/form-data"));
        assert!(req.body.contains(r#"name="visitSecret""#));
        assert!(req.body.contains(r#"filename="base.zip""#));
        assert!(req.body.contains("application/x-zip-compressed"));
        assert!(req.body.contains(r#"name="save""#));
        assert!(req.body.contains("slot3"));
        assert!(req.body.contains("20000"));

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 20_000);
    }

    #[tokio::test]
    async fn download_save_writes_file_with_progress() {
        static PAYLOAD: [u8; 30_000] = [7u8; 30_000];
        let (ep, rx) = mock_server(200, &PAYLOAD).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("slot2.zip");

        let last = Arc::new(Mutex::new(None));
        let l = last.clone();
        let progress: ProgressFn = Arc::new(move |p: TransferProgress| {
            *l.lock().unwrap() = Some(p);
        });

        let written = gateway(ep)
            .download_save("s1", "slot2", &dest, Some(progress))
            .await
            .unwrap();

        assert_eq!(written, 30_000);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 30_000);
        assert_eq!(
            *last.lock().unwrap(),
            Some(TransferProgress {
                transferred: 30_000,
                total: Some(30_000)
            })
        );
        assert_eq!(rx.await.unwrap().body, "visitSecret=s1&save=slot2");
    }

    #[tokio::test]
    async fn download_failure_creates_no_file() {
        let (ep, _rx) = mock_server(404, b"slot is empty").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("slot1.zip");

        let err = gateway(ep)
            .download_save("s1", "slot1", &dest, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Remote { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn truncated_download_leaves_no_file() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;
            let head = "HTTP/1.1 200 OK\r\nContent-Length: 30000\r\nConnection: close\r\n\r\n";
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&[7u8; 1000]).await;
            let _ = stream.shutdown().await;
        });
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("slot2.zip");

        let result = gateway(Endpoint::new(addr.to_string()))
            .download_save("s1", "slot2", &dest, None)
            .await;

        assert!(matches!(result, Err(GatewayError::Http(_))));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/tmp/saves/slot2.zip")),
            PathBuf::from("/tmp/saves/slot2.zip.part")
        );
    }
}
