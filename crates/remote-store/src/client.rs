//! HTTP implementation of [`RemoteStore`].
//!
//! Async client using `reqwest`. Caller identity from the injected
//! [`CredentialProvider`] is attached to every request as headers.

use std::sync::Arc;

use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, ETAG, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use stashbox_protocol::{
    AbortMultipartRequest, CompleteMultipartRequest, CreateFolderRequest, InitMultipartRequest,
    InitMultipartResponse, MoveFileRequest, RemoteFileRecord, UploadPartResponse,
};

use crate::config::RemoteStoreConfig;
use crate::credentials::CredentialProvider;
use crate::store::{ByteProgress, PartUpload, RemoteStore, StoreFuture, WholeFileUpload};
use crate::RemoteStoreError;

const USER_ID_HEADER: &str = "x-user-id";
const USER_TYPE_HEADER: &str = "x-user-type";
const CHECKSUM_HEADER: &str = "x-content-sha256";

/// Body slice size for progress-reporting uploads.
const PROGRESS_SLICE: usize = 64 * 1024;

/// Remote store client for the stashbox web API.
pub struct HttpRemoteStore {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpRemoteStore {
    /// Creates a client for `config.base_url`.
    pub fn new(
        config: &RemoteStoreConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, RemoteStoreError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn file_url(&self, id: &str) -> String {
        let encoded = utf8_percent_encode(id, NON_ALPHANUMERIC);
        self.url(&format!("/api/files/{encoded}"))
    }

    fn identity_headers(&self) -> Result<HeaderMap, RemoteStoreError> {
        let identity = self.credentials.identity();
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&identity.user_id).map_err(|_| {
                RemoteStoreError::InvalidCredentials("user id is not a valid header value".into())
            })?,
        );
        headers.insert(
            USER_TYPE_HEADER,
            HeaderValue::from_static(identity.kind.as_header_value()),
        );
        if let Some(token) = identity.token.as_deref() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    RemoteStoreError::InvalidCredentials("token is not a valid header value".into())
                })?,
            );
        }
        Ok(headers)
    }

    /// Sends an authenticated request and rejects non-2xx responses.
    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteStoreError> {
        let resp = request.headers(self.identity_headers()?).send().await?;
        let status = resp.status();
        trace!(status = status.as_u16(), url = %resp.url(), "remote store response");

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteStoreError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteStoreError> {
        let resp = self.send(request).await?;
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

impl RemoteStore for HttpRemoteStore {
    fn init_multipart(
        &self,
        req: InitMultipartRequest,
    ) -> StoreFuture<'_, InitMultipartResponse> {
        Box::pin(async move {
            debug!(file = %req.file_name, folder = %req.folder, "init multipart upload");
            let request = self
                .http
                .post(self.url("/api/uploads/multipart/init"))
                .json(&req);
            self.send_json(request).await
        })
    }

    fn upload_part(&self, part: PartUpload) -> StoreFuture<'_, UploadPartResponse> {
        Box::pin(async move {
            let part_number = part.part_number.to_string();
            let request = self
                .http
                .put(self.url("/api/uploads/multipart/part"))
                .query(&[
                    ("uploadId", part.upload_id.as_str()),
                    ("key", part.key.as_str()),
                    ("partNumber", part_number.as_str()),
                ])
                .header(CHECKSUM_HEADER, part.checksum.as_str())
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(part.data);

            let resp = self.send(request).await?;

            // S3-style backends return the part ETag as a header; the web API
            // returns it in the JSON body.
            if let Some(etag) = resp.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
                return Ok(UploadPartResponse {
                    etag: etag.to_string(),
                });
            }
            let body = resp.bytes().await?;
            if body.is_empty() {
                return Err(RemoteStoreError::UnexpectedResponse(format!(
                    "no ETag returned for part {part_number}"
                )));
            }
            Ok(serde_json::from_slice(&body)?)
        })
    }

    fn complete_multipart(
        &self,
        req: CompleteMultipartRequest,
    ) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            debug!(
                upload_id = %req.upload_id,
                parts = req.parts.len(),
                "complete multipart upload"
            );
            let request = self
                .http
                .post(self.url("/api/uploads/multipart/complete"))
                .json(&req);
            self.send_json(request).await
        })
    }

    fn abort_multipart(&self, req: AbortMultipartRequest) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            debug!(upload_id = %req.upload_id, "abort multipart upload");
            let request = self
                .http
                .post(self.url("/api/uploads/multipart/abort"))
                .json(&req);
            self.send(request).await.map(|_| ())
        })
    }

    fn upload_whole(
        &self,
        upload: WholeFileUpload,
        progress: Option<ByteProgress>,
    ) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            let WholeFileUpload {
                file_name,
                folder,
                content_type,
                data,
            } = upload;
            debug!(file = %file_name, folder = %folder, bytes = data.len(), "upload whole file");

            let total = data.len() as u64;
            let part = match progress {
                Some(progress) => Part::stream_with_length(progress_body(data, progress), total),
                None => Part::bytes(data),
            };
            let part = part.file_name(file_name).mime_str(&content_type)?;
            let form = Form::new().text("folder", folder).part("file", part);

            let request = self.http.post(self.url("/api/uploads")).multipart(form);
            self.send_json(request).await
        })
    }

    fn list_files(&self, folder: Option<String>) -> StoreFuture<'_, Vec<RemoteFileRecord>> {
        Box::pin(async move {
            let mut request = self.http.get(self.url("/api/files"));
            if let Some(folder) = folder {
                request = request.query(&[("folder", folder)]);
            }
            self.send_json(request).await
        })
    }

    fn delete_file(&self, id: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let request = self.http.delete(self.file_url(&id));
            self.send(request).await.map(|_| ())
        })
    }

    fn move_file(&self, id: String, folder: String) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            let request = self
                .http
                .patch(self.file_url(&id))
                .json(&MoveFileRequest { folder });
            self.send_json(request).await
        })
    }

    fn create_folder(&self, path: String) -> StoreFuture<'_, RemoteFileRecord> {
        Box::pin(async move {
            let request = self
                .http
                .post(self.url("/api/folders"))
                .json(&CreateFolderRequest { path });
            self.send_json(request).await
        })
    }
}

/// Streams `data` in slices, reporting cumulative bytes as each slice is
/// pulled by the connection.
fn progress_body(data: Vec<u8>, progress: ByteProgress) -> reqwest::Body {
    let data = Bytes::from(data);
    let len = data.len();
    let stream = futures_util::stream::iter((0..len).step_by(PROGRESS_SLICE).map(move |start| {
        let end = (start + PROGRESS_SLICE).min(len);
        progress(end as u64);
        Ok::<_, std::io::Error>(data.slice(start..end))
    }));
    reqwest::Body::wrap_stream(stream)
}

/// Extracts the human-readable message from an API error body.
fn api_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["error", "message"] {
            if let Some(msg) = value.get(field).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.to_string()
    }
}
