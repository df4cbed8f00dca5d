use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use futures::stream::BoxStream;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::rest_types::{
    Category, ChunkDatum, CreateReminderRequest, DataEnvelope, Estate, EstateFilter,
    EstateRequest, InitUploadData, PasswordLoginRequest, RefreshRequest, Reminder,
    SendOtpRequest, TokenResponse, VerifyOtpRequest,
};
use crate::token::{SessionTokens, TokenStore};
use crate::upload::{self, AssetKind, UploadEvent, UploadSession, UploadedAsset};

const SEND_OTP_ROUTE: &str = "v1/auth/otp/send";
const VERIFY_OTP_ROUTE: &str = "v1/auth/otp/verify";
const PASSWORD_LOGIN_ROUTE: &str = "v1/auth/login";
const REFRESH_ROUTE: &str = "v1/auth/refresh";
const ESTATE_ROUTE: &str = "v1/estate";
const CATEGORY_ROUTE: &str = "v1/category";
const REMINDER_ROUTE: &str = "v1/reminder";
const ESTATE_REQUEST_ROUTE: &str = "v1/estate-request";
const BUCKET_FILE_ROUTE: &str = "v1/bucket/file";

/// Where one authorized request stands in the refresh flow. A request is
/// replayed at most once, after a single refresh.
enum AuthState {
    Authorized,
    Refreshed,
}

pub struct AmlakClient {
    client: Client,
    base_url: Url,
    tokens: TokenStore,
}

impl AmlakClient {
    pub fn new(base_url: Url, tokens: TokenStore) -> Self {
        Self {
            client: Client::new(),
            base_url,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn route(&self, route: &str) -> Result<Url> {
        self.base_url
            .join(route)
            .with_context(|| format!("Failed to construct URL for {}", route))
    }

    async fn post_unauthenticated<B: Serialize>(&self, route: &str, body: &B) -> Result<Response> {
        let url = self.route(route)?;
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            bail!(
                "Request to {} failed: {} - {}",
                route,
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }
        Ok(response)
    }

    async fn session_from(response: Response) -> Result<SessionTokens> {
        let envelope: DataEnvelope<TokenResponse> = response.json().await?;
        let tokens = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Login response carried no tokens"))?;
        Ok(SessionTokens {
            access: tokens.access_token,
            refresh: tokens.refresh_token,
        })
    }

    pub async fn send_otp(&self, phone: &str) -> Result<()> {
        let request = SendOtpRequest {
            phone: phone.to_string(),
        };
        self.post_unauthenticated(SEND_OTP_ROUTE, &request).await?;
        Ok(())
    }

    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<SessionTokens> {
        let request = VerifyOtpRequest {
            phone: phone.to_string(),
            code: code.to_string(),
        };
        let response = self.post_unauthenticated(VERIFY_OTP_ROUTE, &request).await?;
        let session = Self::session_from(response).await?;
        self.tokens.replace(session.clone());
        Ok(session)
    }

    pub async fn login_with_password(&self, phone: &str, password: &str) -> Result<SessionTokens> {
        let request = PasswordLoginRequest {
            phone: phone.to_string(),
            password: password.to_string(),
        };
        let response = self
            .post_unauthenticated(PASSWORD_LOGIN_ROUTE, &request)
            .await?;
        let session = Self::session_from(response).await?;
        self.tokens.replace(session.clone());
        Ok(session)
    }

    async fn refresh_session(&self) -> Result<()> {
        let refresh_token = self
            .tokens
            .refresh_token()
            .ok_or_else(|| anyhow!("Not logged in"))?;
        let request = RefreshRequest { refresh_token };
        let response = self.post_unauthenticated(REFRESH_ROUTE, &request).await?;
        let session = Self::session_from(response).await?;
        self.tokens.replace(session);
        Ok(())
    }

    /// Sends an authorized request. A 401 on the first attempt triggers one
    /// token refresh and one replay; a second 401 surfaces as an error. A
    /// 403 clears the token store, logging the session out client-side.
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> Result<RequestBuilder>,
    {
        let mut state = AuthState::Authorized;
        loop {
            let access_token = self
                .tokens
                .access_token()
                .ok_or_else(|| anyhow!("Not logged in, run `amlak login` first"))?;

            let response = build(&self.client)?
                .bearer_auth(&access_token)
                .send()
                .await?;

            match (response.status(), &state) {
                (StatusCode::UNAUTHORIZED, AuthState::Authorized) => {
                    self.refresh_session().await?;
                    state = AuthState::Refreshed;
                }
                (StatusCode::FORBIDDEN, _) => {
                    self.tokens.clear();
                    bail!("Session revoked by the backend, please log in again");
                }
                _ => return Ok(response),
            }
        }
    }

    async fn parse_envelope<T: DeserializeOwned>(response: Response) -> Result<Vec<T>> {
        if !response.status().is_success() {
            bail!(
                "Request failed: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }
        let envelope: DataEnvelope<T> = response.json().await?;
        Ok(envelope.data)
    }

    async fn get_data<T, Q>(&self, route: &str, query: Option<&Q>) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        Q: Serialize,
    {
        let url = self.route(route)?;
        let response = self
            .send_authorized(|client| {
                let mut request = client.get(url.clone());
                if let Some(query) = query {
                    request = request.query(query);
                }
                Ok(request)
            })
            .await?;
        Self::parse_envelope(response).await
    }

    async fn post_data<T, B>(&self, route: &str, body: &B) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let url = self.route(route)?;
        let response = self
            .send_authorized(|client| Ok(client.post(url.clone()).json(body)))
            .await?;
        Self::parse_envelope(response).await
    }

    pub async fn list_estates(&self, filter: &EstateFilter) -> Result<Vec<Estate>> {
        self.get_data(ESTATE_ROUTE, Some(filter)).await
    }

    pub async fn get_estate(&self, id: Uuid) -> Result<Estate> {
        let route = format!("{}/{}", ESTATE_ROUTE, id);
        let mut estates: Vec<Estate> = self.get_data(&route, None::<&()>).await?;
        match estates.pop() {
            Some(estate) => Ok(estate),
            None => Err(anyhow!("Estate with ID '{}' not found", id)),
        }
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.get_data(CATEGORY_ROUTE, None::<&()>).await
    }

    pub async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        self.get_data(REMINDER_ROUTE, None::<&()>).await
    }

    pub async fn create_reminder(&self, request: &CreateReminderRequest) -> Result<Reminder> {
        let mut created: Vec<Reminder> = self.post_data(REMINDER_ROUTE, request).await?;
        created
            .pop()
            .ok_or_else(|| anyhow!("Reminder creation returned no reminder"))
    }

    pub async fn list_estate_requests(&self) -> Result<Vec<EstateRequest>> {
        self.get_data(ESTATE_REQUEST_ROUTE, None::<&()>).await
    }

    async fn init_upload(
        &self,
        file_name: &str,
        mime_type: &str,
        kind: Option<AssetKind>,
        total_chunks: u64,
    ) -> Result<InitUploadData> {
        let url = self.route(BUCKET_FILE_ROUTE)?;

        let response = self
            .send_authorized(|client| {
                // Empty uploadId/key sentinels mark the initiation call; the
                // binary field stays absent until the backend assigns real
                // identifiers.
                let mut form = reqwest::multipart::Form::new()
                    .text("uploadId", "")
                    .text("key", "")
                    .text("fileName", file_name.to_string())
                    .text("fileType", mime_type.to_string())
                    .text("chunkIndex", "0")
                    .text("totalChunks", total_chunks.to_string());
                if let Some(kind) = kind {
                    form = form.text("type", kind.as_str());
                }
                Ok(client.post(url.clone()).multipart(form))
            })
            .await?;

        if !response.status().is_success() {
            bail!(
                "Failed to initiate upload: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        let envelope: DataEnvelope<InitUploadData> = response.json().await?;
        envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Upload initiation returned no identifiers"))
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        index: u64,
        chunk: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        parts_json: Option<String>,
    ) -> Result<Vec<ChunkDatum>> {
        let url = self.route(BUCKET_FILE_ROUTE)?;
        let field_name = upload::chunk_field_name(index, session.total_chunks());

        let response = self
            .send_authorized(|client| {
                let part = reqwest::multipart::Part::bytes(chunk.clone())
                    .file_name(file_name.to_string())
                    .mime_str(mime_type)?;
                let mut form = reqwest::multipart::Form::new()
                    .text("uploadId", session.upload_id().to_string())
                    .text("key", session.storage_key().to_string())
                    .text("fileName", file_name.to_string())
                    .text("fileType", mime_type.to_string())
                    .text("chunkIndex", index.to_string())
                    .text("totalChunks", session.total_chunks().to_string())
                    .part(field_name.clone(), part);
                if let Some(parts) = &parts_json {
                    form = form.text("parts", parts.clone());
                }
                Ok(client.post(url.clone()).multipart(form))
            })
            .await?;

        if !response.status().is_success() {
            bail!(
                "Failed to upload chunk {}: {} - {}",
                index,
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        let envelope: DataEnvelope<ChunkDatum> = response.json().await?;
        Ok(envelope.data)
    }

    /// Uploads an asset in fixed-size chunks, yielding progress events and a
    /// terminal [`UploadEvent::Complete`] or [`UploadEvent::Cancelled`].
    ///
    /// Chunks go out strictly one at a time: part numbers must stay
    /// contiguous and the final request carries the accumulated parts list,
    /// so ordering is load-bearing. The cancellation token is consulted
    /// before the initiation request and before every chunk, and in-flight
    /// requests are raced against it, which bounds cancellation latency by
    /// one request.
    pub fn upload_asset<'a, P: AsRef<Path> + Send + 'a>(
        &'a self,
        asset: P,
        kind: Option<AssetKind>,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'a, Result<UploadEvent>>> {
        let path: PathBuf = asset.as_ref().to_path_buf();
        let file_size = std::fs::metadata(&path)
            .context("Failed to get file metadata")?
            .len();
        let total_chunks = upload::chunk_count(file_size)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Asset path has no file name"))?;
        let mime_type = upload::mime_type_for(&path).to_string();

        let stream = async_stream::try_stream! {
            let mut session = UploadSession::new(total_chunks);
            yield UploadEvent::Progress(session.progress());

            let init = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    yield UploadEvent::Cancelled;
                    return;
                }
                init = self.init_upload(&file_name, &mime_type, kind, total_chunks) => init,
            };
            let init = init?;
            session.adopt_identifiers(init);

            let mut file = File::open(&path).context("Failed to open asset file")?;
            let mut buffer = vec![0u8; upload::CHUNK_SIZE_BYTES as usize];

            for index in 0..total_chunks {
                if cancel.is_cancelled() {
                    yield UploadEvent::Cancelled;
                    return;
                }

                let range = upload::chunk_range(index, file_size);
                let len = (range.end - range.start) as usize;
                file.read_exact(&mut buffer[..len])
                    .context("Failed to read chunk")?;
                let chunk = buffer[..len].to_vec();

                let parts_json = if session.is_final_chunk(index) {
                    Some(serde_json::to_string(session.parts())?)
                } else {
                    None
                };

                let data = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        yield UploadEvent::Cancelled;
                        return;
                    }
                    result = self.upload_chunk(
                        &session, index, chunk, &file_name, &mime_type, parts_json,
                    ) => result,
                };
                let data = data?;

                let mut data = data.into_iter();
                let part = match data.next() {
                    Some(ChunkDatum::Part(part)) => part,
                    _ => Err(anyhow!("Chunk {} response missing part metadata", index))?,
                };
                let final_url = data.find_map(|datum| match datum {
                    ChunkDatum::Url { url } => Some(url),
                    ChunkDatum::Part(_) => None,
                });

                session.record_chunk(index, part);
                yield UploadEvent::Progress(session.progress());

                if session.is_complete() {
                    let url = final_url
                        .ok_or_else(|| anyhow!("Final chunk response missing object URL"))?;
                    yield UploadEvent::Complete(UploadedAsset {
                        url,
                        storage_key: session.storage_key().to_string(),
                        mime_type: mime_type.clone(),
                        file_name: file_name.clone(),
                    });
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use std::net::{Shutdown, TcpListener};
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    fn offline_client() -> AmlakClient {
        // Port 9 (discard) is never listening; nothing here should reach
        // the network anyway.
        AmlakClient::new(
            Url::parse("http://localhost:9/").unwrap(),
            TokenStore::default(),
        )
    }

    /// Serves a fixed sequence of responses, one connection per response,
    /// and records each request line in order.
    fn spawn_scripted_server(
        responses: Vec<(u16, &'static str)>,
    ) -> (Url, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let request_lines = Arc::new(Mutex::new(Vec::new()));
        let log = request_lines.clone();

        std::thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };

                let mut data = Vec::new();
                let mut buf = [0u8; 8192];
                loop {
                    let Ok(n) = stream.read(&mut buf) else { break };
                    if n == 0 {
                        break;
                    }
                    data.extend_from_slice(&buf[..n]);

                    let Some(headers_end) = data.windows(4).position(|w| w == b"\r\n\r\n")
                    else {
                        continue;
                    };
                    let headers = String::from_utf8_lossy(&data[..headers_end]).to_string();
                    let content_length = headers
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            if name.eq_ignore_ascii_case("content-length") {
                                value.trim().parse::<usize>().ok()
                            } else {
                                None
                            }
                        })
                        .unwrap_or(0);

                    let mut body_read = data.len() - (headers_end + 4);
                    while body_read < content_length {
                        let Ok(n) = stream.read(&mut buf) else { break };
                        if n == 0 {
                            break;
                        }
                        body_read += n;
                    }

                    log.lock()
                        .unwrap()
                        .push(headers.lines().next().unwrap_or_default().to_string());
                    break;
                }

                let reason = match status {
                    200 => "OK",
                    401 => "Unauthorized",
                    403 => "Forbidden",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.shutdown(Shutdown::Both);
            }
        });

        let url = Url::parse(&format!("http://{}/", addr)).unwrap();
        (url, request_lines)
    }

    fn logged_in_store() -> TokenStore {
        TokenStore::new(Some(SessionTokens {
            access: "access-1".to_string(),
            refresh: "refresh-1".to_string(),
        }))
    }

    const REFRESHED_TOKENS_BODY: &str =
        r#"{"data":[{"accessToken":"access-2","refreshToken":"refresh-2"}]}"#;
    const EMPTY_LIST_BODY: &str = r#"{"data":[]}"#;

    #[tokio::test]
    async fn test_401_triggers_one_refresh_and_one_replay() {
        let (url, requests) = spawn_scripted_server(vec![
            (401, ""),
            (200, REFRESHED_TOKENS_BODY),
            (200, EMPTY_LIST_BODY),
        ]);
        let client = AmlakClient::new(url, logged_in_store());

        let categories = client.list_categories().await.unwrap();
        assert!(categories.is_empty());
        assert_eq!(client.tokens().access_token().as_deref(), Some("access-2"));
        assert_eq!(client.tokens().refresh_token().as_deref(), Some("refresh-2"));

        let lines = requests.lock().unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("GET /v1/category"));
        assert!(lines[1].starts_with("POST /v1/auth/refresh"));
        assert!(lines[2].starts_with("GET /v1/category"));
    }

    #[tokio::test]
    async fn test_second_401_surfaces_the_error() {
        let (url, requests) =
            spawn_scripted_server(vec![(401, ""), (200, REFRESHED_TOKENS_BODY), (401, "")]);
        let client = AmlakClient::new(url, logged_in_store());

        let error = client.list_categories().await.unwrap_err();
        assert!(error.to_string().contains("401"));

        // Exactly one replay: original, refresh, replay, nothing more.
        let lines = requests.lock().unwrap();
        assert_eq!(lines.len(), 3);
    }

    #[tokio::test]
    async fn test_403_clears_the_token_store() {
        let (url, requests) = spawn_scripted_server(vec![(403, "")]);
        let client = AmlakClient::new(url, logged_in_store());

        let error = client.list_categories().await.unwrap_err();
        assert!(error.to_string().contains("log in again"));
        assert!(!client.tokens().is_authenticated());

        let lines = requests.lock().unwrap();
        assert_eq!(lines.len(), 1);
    }

    fn asset_file(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".jpg").unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_cancellation_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_upload_rejects_empty_file() {
        let client = offline_client();
        let file = asset_file(b"");
        let result = client.upload_asset(file.path(), None, CancellationToken::new());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_upload_yields_cancelled_before_initiation() {
        let client = offline_client();
        let file = asset_file(b"some image bytes");

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut stream = client
            .upload_asset(file.path(), Some(AssetKind::Gallery), cancel)
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        match first {
            UploadEvent::Progress(progress) => {
                assert_eq!(progress.percent, 0);
                assert_eq!(progress.total_chunks, 1);
            }
            other => panic!("expected initial progress event, got {:?}", other),
        }

        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second, UploadEvent::Cancelled));

        // Cancellation is terminal, never followed by an error.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_upload_surfaces_error_when_not_logged_in() {
        let client = offline_client();
        let file = asset_file(b"some image bytes");

        let mut stream = client
            .upload_asset(file.path(), None, CancellationToken::new())
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, UploadEvent::Progress(_)));

        let second = stream.next().await.unwrap();
        assert!(second.is_err());
        assert!(stream.next().await.is_none());
    }
}
