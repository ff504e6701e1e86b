//! Google Docs and Drive adapter.
//!
//! Implements [`DocumentStore`] over two REST APIs:
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | `get` / `content_structure` | `GET {docs}/documents/{id}` |
//! | `create` | `POST {docs}/documents` |
//! | `batch_insert_text` | `POST {docs}/documents/{id}:batchUpdate` |
//! | `list` | `GET {drive}/files?q=...` |
//!
//! Every request asks [`CredentialStore`] for a bearer token first, so an
//! expired credential is refreshed before it is ever sent.
//!
//! # Configuration
//!
//! ```toml
//! [google]
//! docs_api_url = "https://docs.googleapis.com/v1"
//! drive_api_url = "https://www.googleapis.com/drive/v3"
//! timeout_secs = 30
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::GoogleConfig;
use crate::credential::CredentialStore;
use crate::error::StoreError;
use crate::models::DocumentId;
use crate::store::{DocumentMeta, DocumentStore, DocumentStructure, FileEntry, FileQuery};

/// Longest error body carried into a [`StoreError::Http`].
const MAX_ERROR_BODY: usize = 500;

pub struct GoogleDocsStore {
    client: Client,
    docs_api: String,
    drive_api: String,
    credentials: Arc<CredentialStore>,
}

impl GoogleDocsStore {
    pub fn new(config: &GoogleConfig, credentials: Arc<CredentialStore>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("bytebrief/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            docs_api: config.docs_api_url.trim_end_matches('/').to_string(),
            drive_api: config.drive_api_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let credential = self.credentials.obtain().await?;
        let resp = request
            .header("Authorization", credential.authorization_header())
            .send()
            .await?;
        Ok(resp)
    }

    async fn fetch_document<T: DeserializeOwned>(
        &self,
        id: &DocumentId,
        fields: &str,
    ) -> Result<T, StoreError> {
        let url = format!("{}/documents/{}", self.docs_api, id);
        debug!(document_id = %id, fields, "fetching document");
        let resp = self
            .send(self.client.get(&url).query(&[("fields", fields)]))
            .await?;
        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        decode(resp).await
    }
}

/// Turn a response into `T`, mapping non-2xx statuses to [`StoreError::Http`].
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Http {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

/// Build a Drive `files.list` query for an exact title and MIME type.
pub fn drive_query(query: &FileQuery) -> String {
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escape_query_value(&query.title),
        escape_query_value(&query.mime_type)
    )
}

/// Escape `\` and `'` inside a single-quoted Drive query string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentTitle {
    document_id: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedDocument {
    document_id: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

#[async_trait]
impl DocumentStore for GoogleDocsStore {
    async fn get(&self, id: &DocumentId) -> Result<DocumentMeta, StoreError> {
        let doc: DocumentTitle = self.fetch_document(id, "documentId,title").await?;
        Ok(DocumentMeta {
            id: DocumentId::new(doc.document_id),
            title: doc.title,
        })
    }

    async fn content_structure(&self, id: &DocumentId) -> Result<DocumentStructure, StoreError> {
        self.fetch_document(id, "documentId,title,body(content(startIndex,endIndex))")
            .await
    }

    async fn create(&self, title: &str) -> Result<DocumentId, StoreError> {
        let url = format!("{}/documents", self.docs_api);
        let resp = self
            .send(self.client.post(&url).json(&json!({ "title": title })))
            .await?;
        let created: CreatedDocument = decode(resp).await?;
        Ok(DocumentId::new(created.document_id))
    }

    async fn batch_insert_text(
        &self,
        id: &DocumentId,
        index: i64,
        text: &str,
    ) -> Result<(), StoreError> {
        let url = format!("{}/documents/{}:batchUpdate", self.docs_api, id);
        let body = json!({
            "requests": [{
                "insertText": {
                    "location": { "index": index },
                    "text": text,
                }
            }]
        });
        debug!(document_id = %id, index, chars = text.chars().count(), "inserting text");
        let resp = self.send(self.client.post(&url).json(&body)).await?;
        let _: serde_json::Value = decode(resp).await?;
        Ok(())
    }

    async fn list(&self, query: &FileQuery) -> Result<Vec<FileEntry>, StoreError> {
        let url = format!("{}/files", self.drive_api);
        let q = drive_query(query);
        let resp = self
            .send(self.client.get(&url).query(&[
                ("q", q.as_str()),
                ("spaces", "drive"),
                ("orderBy", "modifiedTime desc"),
                ("fields", "files(id,name,modifiedTime)"),
            ]))
            .await?;
        let list: FileList = decode(resp).await?;
        Ok(list
            .files
            .into_iter()
            .map(|f| FileEntry {
                id: DocumentId::new(f.id),
                name: f.name,
                modified_time: f.modified_time,
            })
            .collect())
    }
}
