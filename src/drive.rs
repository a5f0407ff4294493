//! Google Drive uploads.
//!
//! Files are created with a single `multipart/related` request. Auth is a
//! service account key exchanged for an access token (JWT bearer grant), or
//! a token handed to us directly.

use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::constants::{DRIVE_SCOPE, GOOGLE_TOKEN_URI};
use crate::error::BatchError;
use crate::pipeline::ImageStore;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh this long before Google says the token expires.
const TOKEN_EXPIRY_MARGIN_SECONDS: i64 = 60;

/// The fields of a service account JSON key we use.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    /// Service account email, the JWT issuer
    pub client_email: String,
    /// PEM-encoded RSA private key
    pub private_key: String,
    /// Token endpoint
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Reads a key file downloaded from the Cloud console.
    pub fn from_file(path: &Path) -> Result<Self, BatchError> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|err| BatchError::Auth(format!("invalid key file {}: {err}", path.display())))
    }
}

/// How we authenticate to Drive.
pub enum DriveCredentials {
    /// Exchange a signed JWT for short-lived tokens
    ServiceAccount {
        /// The key file contents
        key: ServiceAccountKey,
        /// Parsed signing key
        signing_key: EncodingKey,
    },
    /// Use this bearer token as-is
    AccessToken(String),
}

impl DriveCredentials {
    /// Loads and validates a service account key file.
    pub fn service_account(path: &Path) -> Result<Self, BatchError> {
        let key = ServiceAccountKey::from_file(path)?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self::ServiceAccount { key, signing_key })
    }

    /// A pre-issued access token.
    pub fn access_token(token: impl Into<String>) -> Self {
        Self::AccessToken(token.into())
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Uploads images into one Drive folder.
pub struct DriveUploader {
    http: reqwest::Client,
    upload_base: Url,
    folder_id: String,
    credentials: DriveCredentials,
    token: Mutex<Option<CachedToken>>,
}

/// Viewable link for a Drive file id.
pub fn drive_view_link(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{file_id}/view")
}

/// Builds a `multipart/related` body: JSON metadata, then the file.
pub fn multipart_related_body(
    boundary: &str,
    metadata: &serde_json::Value,
    content_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

impl DriveUploader {
    /// Uploads into `folder_id` through `upload_base` (normally `https://www.googleapis.com/`).
    pub fn new(
        http: reqwest::Client,
        folder_id: impl Into<String>,
        upload_base: Url,
        credentials: DriveCredentials,
    ) -> Self {
        Self {
            http,
            upload_base,
            folder_id: folder_id.into(),
            credentials,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, BatchError> {
        let (key, signing_key) = match &self.credentials {
            DriveCredentials::AccessToken(token) => return Ok(token.clone()),
            DriveCredentials::ServiceAccount { key, signing_key } => (key, signing_key),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Utc::now()
        {
            return Ok(token.token.clone());
        }

        let token_uri = key.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URI);
        let now = Utc::now();
        let claims = Claims {
            iss: &key.client_email,
            scope: DRIVE_SCOPE,
            aud: token_uri,
            iat: now.timestamp(),
            exp: (now + TimeDelta::hours(1)).timestamp(),
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, signing_key)?;

        let resp = self
            .http
            .post(token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BatchError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|err| BatchError::Auth(format!("bad token response: {err}")))?;
        debug!("Fetched Drive access token, valid for {}s", token.expires_in);

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            token: token.access_token,
            expires_at: now + TimeDelta::seconds(token.expires_in - TOKEN_EXPIRY_MARGIN_SECONDS),
        });
        Ok(access_token)
    }

    /// Creates `name` in the folder from the file at `path`, returning its view link.
    pub async fn upload_file(&self, name: &str, path: &Path) -> Result<String, BatchError> {
        let bytes = std::fs::read(path)?;
        let token = self.access_token().await?;

        let boundary = format!("imagegen-{:016x}", rand::random::<u64>());
        let metadata = json!({
            "name": name,
            "parents": [self.folder_id],
        });
        let body = multipart_related_body(&boundary, &metadata, "image/png", &bytes);

        let mut url = self.upload_base.join("upload/drive/v3/files")?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", "id");

        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BatchError::Upload(format!("{status}: {body}")));
        }
        let created: CreatedFile = resp
            .json()
            .await
            .map_err(|err| BatchError::Upload(format!("unexpected response: {err}")))?;
        debug!("Uploaded {name} as Drive file {}", created.id);
        Ok(drive_view_link(&created.id))
    }
}

impl ImageStore for DriveUploader {
    async fn upload(&self, name: &str, path: &Path) -> Result<String, BatchError> {
        self.upload_file(name, path).await
    }
}
