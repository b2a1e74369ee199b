//! Embedding and vector-store collaborators.
//!
//! Both are best effort: the indexer records failures and moves on.

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ChunkMetadata;
use crate::error::{EmbedError, StoreError};

/// Turns chunk text into a vector.
pub trait Embedder: Send + Sync {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbedError>>;
}

/// Persists an embedded chunk.
pub trait VectorStore: Send + Sync {
    fn store<'a>(
        &'a self,
        text: &'a str,
        metadata: &'a ChunkMetadata,
        vector: &'a [f32],
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// Used when no embedding endpoint is configured.
pub struct DisabledEmbedder;

impl Embedder for DisabledEmbedder {
    fn embed<'a>(&'a self, _text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbedError>> {
        futures::future::ready(Err(EmbedError::Disabled)).boxed()
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding service reached over HTTP.
///
/// POST `{"input": text}` → `{"embedding": [f32, ...]}`
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(client: Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl Embedder for HttpEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>, EmbedError>> {
        async move {
            let response = self
                .client
                .post(&self.endpoint)
                .timeout(self.timeout)
                .json(&EmbedRequest { input: text })
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        EmbedError::Timeout(self.timeout.as_secs())
                    } else {
                        EmbedError::Network(e)
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(EmbedError::BadResponse(format!("HTTP {}", status.as_u16())));
            }

            let body: EmbedResponse = response
                .json()
                .await
                .map_err(|e| EmbedError::BadResponse(e.to_string()))?;
            if body.embedding.is_empty() {
                return Err(EmbedError::BadResponse("empty embedding".to_string()));
            }
            Ok(body.embedding)
        }
        .boxed()
    }
}

#[derive(Serialize)]
struct StoreObject<'a> {
    class: &'a str,
    properties: StoreProperties<'a>,
    vector: &'a [f32],
}

#[derive(Serialize)]
struct StoreProperties<'a> {
    text: &'a str,
    #[serde(flatten)]
    metadata: &'a ChunkMetadata,
}

/// Vector store reached over HTTP: POST `<url>/v1/objects`.
pub struct HttpVectorStore {
    client: Client,
    objects_url: String,
    class_name: String,
}

impl HttpVectorStore {
    pub fn new(client: Client, base_url: &str, class_name: impl Into<String>) -> Self {
        Self {
            client,
            objects_url: format!("{}/v1/objects", base_url.trim_end_matches('/')),
            class_name: class_name.into(),
        }
    }

    pub fn objects_url(&self) -> &str {
        &self.objects_url
    }
}

impl VectorStore for HttpVectorStore {
    fn store<'a>(
        &'a self,
        text: &'a str,
        metadata: &'a ChunkMetadata,
        vector: &'a [f32],
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let object = StoreObject {
                class: &self.class_name,
                properties: StoreProperties { text, metadata },
                vector,
            };
            let response = self
                .client
                .post(&self.objects_url)
                .json(&object)
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => Ok(()),
                status => Err(StoreError::Rejected(status.as_u16())),
            }
        }
        .boxed()
    }
}
