//! CouchDB-backed document store.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{DocumentIdentity, DocumentStore, Filter, StorageError};
use crate::config::DatabaseConfig;
use crate::models::ResearchItem;
use crate::utils::HttpClient;

/// Store writing research items into one CouchDB database
#[derive(Debug, Clone)]
pub struct CouchDbStore {
    client: HttpClient,
    base_url: Url,
    database: String,
    username: Option<String>,
    password: Option<String>,
}

impl CouchDbStore {
    /// Create a store from database settings
    pub fn new(client: HttpClient, config: &DatabaseConfig) -> Result<Self, StorageError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| StorageError::Configuration(format!("{}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::Configuration(format!(
                "{} cannot be used as a base URL",
                config.url
            )));
        }

        Ok(Self {
            client,
            base_url,
            database: config.name.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Create the database if it does not exist yet
    pub async fn ensure_database(&self) -> Result<(), StorageError> {
        let response = self
            .request(Method::PUT, &[])?
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => {
                tracing::info!("Created database '{}'", self.database);
                Ok(())
            }
            StatusCode::PRECONDITION_FAILED => {
                tracing::debug!("Database '{}' already exists", self.database);
                Ok(())
            }
            _ => check(response).await.map(|_| ()),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Configuration(self.base_url.to_string()))?
            .pop_if_empty()
            .push(&self.database)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, StorageError> {
        let url = self.endpoint(segments)?;
        let builder = self.client.client().request(method, url);
        Ok(match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        })
    }
}

#[async_trait]
impl DocumentStore for CouchDbStore {
    async fn query(&self, filter: &Filter) -> Result<Vec<ResearchItem>, StorageError> {
        let body = serde_json::json!({
            "selector": filter.to_selector(),
            "execution_stats": true,
        });

        let response = self
            .request(Method::POST, &["_find"])?
            .json(&body)
            .send()
            .await?;
        let found: FindResponse = check(response).await?.json().await?;

        if let Some(warning) = &found.warning {
            tracing::warn!("Query {} returned warning: {}", body["selector"], warning);
        }
        if let Some(stats) = &found.execution_stats {
            tracing::debug!(
                "Query {} returned {} docs in {}ms ({} docs examined)",
                body["selector"],
                stats.results_returned,
                stats.execution_time_ms,
                stats.total_docs_examined
            );
        }

        Ok(found.docs)
    }

    async fn insert(&self, item: &ResearchItem) -> Result<DocumentIdentity, StorageError> {
        let response = self
            .request(Method::POST, &[])?
            .json(item)
            .send()
            .await?;
        let written: WriteResponse = check(response).await?.json().await?;

        Ok(DocumentIdentity {
            id: written.id,
            revision: written.rev,
        })
    }

    async fn update(&self, item: &ResearchItem) -> Result<DocumentIdentity, StorageError> {
        let (Some(id), Some(_)) = (item.id.as_deref(), item.revision.as_deref()) else {
            return Err(StorageError::MissingIdentity(item.doi.clone()));
        };

        let response = self
            .request(Method::PUT, &[id])?
            .json(item)
            .send()
            .await?;
        let written: WriteResponse = check(response).await?.json().await?;

        Ok(DocumentIdentity {
            id: written.id,
            revision: written.rev,
        })
    }
}

/// Map CouchDB error statuses onto `StorageError`
async fn check(response: Response) -> Result<Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(err) => format!("{}: {}", err.error, err.reason),
        Err(_) => text,
    };

    if status == StatusCode::CONFLICT {
        Err(StorageError::Conflict(message))
    } else {
        Err(StorageError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    docs: Vec<ResearchItem>,
    #[serde(default)]
    warning: Option<String>,
    #[serde(default)]
    execution_stats: Option<ExecutionStats>,
}

#[derive(Debug, Deserialize)]
struct ExecutionStats {
    #[serde(default)]
    total_docs_examined: u64,
    #[serde(default)]
    results_returned: u64,
    #[serde(default)]
    execution_time_ms: f64,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    id: String,
    rev: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    reason: String,
}
