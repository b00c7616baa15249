use crate::error::StorageError;
use crate::models::{validate_chunk_batch, ChunkRecord, DocumentRecord, EmbeddingStatus};
use crate::store::{ChunkStore, DocumentStatusStore, SearchableChunk};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const DOCUMENTS_TABLE: &str = "documents";
const CHUNKS_TABLE: &str = "chunks";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Generic table store speaking PostgREST-style row filters
/// (`?column=eq.value`) over HTTP. Backend schema: a `documents` table and
/// a `chunks` table keyed by `document_id`.
pub struct RestTableStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl RestTableStore {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, StorageError> {
        let mut base_url = Url::parse(endpoint)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, StorageError> {
        Ok(self.base_url.join(table)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(REQUEST_TIMEOUT);
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn ensure_success(response: Response) -> Result<Response, StorageError> {
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Backend {
                backend: "table-store".to_string(),
                details: status.to_string(),
            });
        }
        Ok(response)
    }

    async fn select_documents(
        &self,
        filters: &[(&str, String)],
    ) -> Result<Vec<DocumentRecord>, StorageError> {
        let response = self
            .authorize(self.client.get(self.table_url(DOCUMENTS_TABLE)?))
            .query(filters)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChunkStore for RestTableStore {
    async fn delete_for_document(&self, document_id: Uuid) -> Result<(), StorageError> {
        let response = self
            .authorize(self.client.delete(self.table_url(CHUNKS_TABLE)?))
            .query(&[("document_id", format!("eq.{document_id}"))])
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn insert_chunks(&self, batch: &[ChunkRecord]) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        validate_chunk_batch(batch).map_err(StorageError::InvalidBatch)?;

        let response = self
            .authorize(self.client.post(self.table_url(CHUNKS_TABLE)?))
            .header("Prefer", "return=minimal")
            .json(batch)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn count_for_document(&self, document_id: Uuid) -> Result<usize, StorageError> {
        let response = self
            .authorize(self.client.get(self.table_url(CHUNKS_TABLE)?))
            .query(&[
                ("document_id", format!("eq.{document_id}")),
                ("select", "chunk_index".to_string()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let rows: Vec<Value> = response.json().await?;
        Ok(rows.len())
    }

    async fn list_for_search(
        &self,
        department: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchableChunk>, StorageError> {
        let mut filters = vec![
            ("embedding_status", "eq.completed".to_string()),
            ("deleted_at", "is.null".to_string()),
        ];
        if let Some(department) = department {
            filters.push(("department", format!("eq.{department}")));
        }

        let documents = self.select_documents(&filters).await?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let by_id: HashMap<Uuid, &DocumentRecord> =
            documents.iter().map(|document| (document.id, document)).collect();
        let id_list = documents
            .iter()
            .map(|document| document.id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .authorize(self.client.get(self.table_url(CHUNKS_TABLE)?))
            .query(&[
                ("document_id", format!("in.({id_list})")),
                ("order", "document_id.asc,chunk_index.asc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let chunks: Vec<ChunkRecord> = response.json().await?;

        Ok(chunks
            .into_iter()
            .filter_map(|chunk| {
                let document = by_id.get(&chunk.document_id)?;
                Some(SearchableChunk {
                    document_id: chunk.document_id,
                    document_title: document.original_name.clone(),
                    department: document.department.clone(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text,
                    embedding: chunk.embedding,
                })
            })
            .collect())
    }
}

#[async_trait]
impl DocumentStatusStore for RestTableStore {
    async fn insert_document(&self, document: &DocumentRecord) -> Result<(), StorageError> {
        let response = self
            .authorize(self.client.post(self.table_url(DOCUMENTS_TABLE)?))
            .header("Prefer", "return=minimal")
            .json(document)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn get_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<DocumentRecord>, StorageError> {
        let mut documents = self
            .select_documents(&[("id", format!("eq.{document_id}"))])
            .await?;
        Ok(documents.pop())
    }

    async fn set_status(
        &self,
        document_id: Uuid,
        status: EmbeddingStatus,
        total_chunks: Option<usize>,
    ) -> Result<(), StorageError> {
        let mut body = json!({ "embedding_status": status.as_str() });
        if let Some(total_chunks) = total_chunks {
            body["total_chunks"] = json!(total_chunks);
        }

        let response = self
            .authorize(self.client.patch(self.table_url(DOCUMENTS_TABLE)?))
            .query(&[("id", format!("eq.{document_id}"))])
            .json(&body)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn list_with_status(
        &self,
        status: EmbeddingStatus,
    ) -> Result<Vec<DocumentRecord>, StorageError> {
        self.select_documents(&[
            ("embedding_status", format!("eq.{}", status.as_str())),
            ("deleted_at", "is.null".to_string()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::PATCH;

    fn store_for(server: &MockServer) -> RestTableStore {
        RestTableStore::new(&server.base_url(), Some("secret".to_string())).expect("store")
    }

    fn document_json(document: &DocumentRecord) -> Value {
        serde_json::to_value(document).expect("document json")
    }

    #[tokio::test]
    async fn delete_targets_the_document_rows() {
        let server = MockServer::start_async().await;
        let document_id = Uuid::new_v4();
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/chunks")
                    .query_param("document_id", format!("eq.{document_id}"));
                then.status(204);
            })
            .await;

        store_for(&server)
            .delete_for_document(document_id)
            .await
            .expect("delete");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn insert_posts_the_batch_with_auth_headers() {
        let server = MockServer::start_async().await;
        let chunk = ChunkRecord::new(Uuid::new_v4(), 0, "text".to_string(), vec![0.5; 4], 1);
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chunks")
                    .header("Prefer", "return=minimal")
                    .header("apikey", "secret");
                then.status(201);
            })
            .await;

        store_for(&server)
            .insert_chunks(std::slice::from_ref(&chunk))
            .await
            .expect("insert");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_storage_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chunks");
                then.status(503);
            })
            .await;

        let chunk = ChunkRecord::new(Uuid::new_v4(), 0, "text".to_string(), vec![0.5; 4], 1);
        let result = store_for(&server).insert_chunks(&[chunk]).await;
        assert!(matches!(result, Err(StorageError::Backend { .. })));
    }

    #[tokio::test]
    async fn status_patch_includes_the_count_when_given() {
        let server = MockServer::start_async().await;
        let document_id = Uuid::new_v4();
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/documents")
                    .query_param("id", format!("eq.{document_id}"))
                    .json_body(json!({"embedding_status": "completed", "total_chunks": 8}));
                then.status(204);
            })
            .await;

        store_for(&server)
            .set_status(document_id, EmbeddingStatus::Completed, Some(8))
            .await
            .expect("patch");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn search_listing_joins_documents_and_chunks() {
        let server = MockServer::start_async().await;

        let mut document = DocumentRecord::new("report.pdf", "report.pdf", Some("ops".to_string()));
        document.embedding_status = EmbeddingStatus::Completed;
        let chunk = ChunkRecord::new(document.id, 0, "chunk text".to_string(), vec![0.5; 4], 1);

        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/documents")
                    .query_param("embedding_status", "eq.completed")
                    .query_param("deleted_at", "is.null");
                then.status(200).json_body(json!([document_json(&document)]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/chunks")
                    .query_param("document_id", format!("in.({})", document.id));
                then.status(200)
                    .json_body(json!([serde_json::to_value(&chunk).expect("chunk json")]));
            })
            .await;

        let rows = store_for(&server)
            .list_for_search(None, 100)
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].document_title, "report.pdf");
        assert_eq!(rows[0].department.as_deref(), Some("ops"));
        assert_eq!(rows[0].text, "chunk text");
    }
}
