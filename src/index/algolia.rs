//! Hosted search index client (Algolia REST API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::{BrowsePage, IndexService, IndexSettings, StaleFilter, MAX_DELETE_BATCH};
use crate::error::IndexError;
use crate::record::SearchRecord;

const BROWSE_PAGE_SIZE: usize = 1000;
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_MAX_TASK_POLLS: usize = 240;

/// Async client for one index on the hosted search service.
#[derive(Clone)]
pub struct AlgoliaIndex {
    client: Client,
    base: Url,
    index_name: String,
    max_retries: usize,
    retry_base: Duration,
    task_poll_interval: Duration,
    max_task_polls: usize,
}

impl AlgoliaIndex {
    /// Builds a client.
    ///
    /// # Arguments
    /// * `app_id` - Application id, sent as `X-Algolia-Application-Id`
    /// * `api_key` - Admin API key with write + browse ACLs
    /// * `index_name` - Target index
    /// * `endpoint` - Base URL override; defaults to `https://{app_id}.algolia.net`
    pub fn new(
        app_id: &str,
        api_key: &str,
        index_name: &str,
        endpoint: Option<Url>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, IndexError> {
        let base = match endpoint {
            Some(url) => url,
            None => Url::parse(&format!("https://{}.algolia.net", app_id.trim()))
                .map_err(|err| IndexError::Other(format!("invalid application id: {err}")))?,
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-algolia-application-id",
            HeaderValue::from_str(app_id.trim())
                .map_err(|_| IndexError::Other("invalid application id header".to_string()))?,
        );
        let mut key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| IndexError::Other("invalid API key header".to_string()))?;
        key.set_sensitive(true);
        headers.insert("x-algolia-api-key", key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base,
            index_name: index_name.to_string(),
            max_retries: max_retries.max(1),
            retry_base: DEFAULT_RETRY_BASE,
            task_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            max_task_polls: DEFAULT_MAX_TASK_POLLS,
        })
    }

    /// Overrides the base delay used for retry backoff.
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Overrides how task acknowledgments are polled.
    pub fn with_task_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.task_poll_interval = interval;
        self.max_task_polls = max_polls.max(1);
        self
    }

    /// Target index name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn endpoint(&self, tail: &[&str]) -> Result<Url, IndexError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::Other(format!("endpoint {} cannot take a path", self.base)))?
            .pop_if_empty()
            .extend(["1", "indexes", self.index_name.as_str()])
            .extend(tail);
        Ok(url)
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, IndexError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut attempt = 0usize;
        loop {
            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<T>()
                            .await
                            .map_err(|err| IndexError::Decode(err.to_string()));
                    }
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, path = url.path(), "retrying index request");
                        sleep(retry_backoff(self.retry_base, attempt)).await;
                        continue;
                    }
                    return Err(IndexError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout() || err.is_request())
                        && attempt + 1 < self.max_retries
                    {
                        attempt += 1;
                        warn!(error = %err, attempt, path = url.path(), "retrying index request");
                        sleep(retry_backoff(self.retry_base, attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }

    async fn submit_batch(&self, requests: Vec<BatchRequest<'_>>) -> Result<(), IndexError> {
        if requests.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&["batch"])?;
        let body = BatchBody { requests };
        let task: TaskResponse = self.send(Method::POST, url, Some(&body)).await?;
        self.wait_for_task(task.task_id).await
    }

    async fn wait_for_task(&self, task_id: u64) -> Result<(), IndexError> {
        let task = task_id.to_string();
        let url = self.endpoint(&["task", task.as_str()])?;
        for poll in 1..=self.max_task_polls {
            let status: TaskStatus = self.send(Method::GET, url.clone(), None::<&()>).await?;
            if status.status == "published" {
                debug!(task_id, poll, "task published");
                return Ok(());
            }
            sleep(self.task_poll_interval).await;
        }
        Err(IndexError::TaskTimeout {
            task_id,
            attempts: self.max_task_polls,
        })
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(base: Duration, attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    base * (1 << capped)
}

#[async_trait]
impl IndexService for AlgoliaIndex {
    async fn upsert(&self, records: &[SearchRecord]) -> Result<(), IndexError> {
        let requests = records
            .iter()
            .map(|record| BatchRequest {
                action: "updateObject",
                body: BatchPayload::Record(record),
            })
            .collect();
        self.submit_batch(requests).await
    }

    async fn browse(
        &self,
        filter: &StaleFilter,
        cursor: Option<&str>,
    ) -> Result<BrowsePage, IndexError> {
        let url = self.endpoint(&["browse"])?;
        let body = BrowseRequest {
            filters: filter.expression(),
            attributes_to_retrieve: &["objectID"],
            hits_per_page: BROWSE_PAGE_SIZE,
            cursor,
        };
        let response: BrowseResponse = self.send(Method::POST, url, Some(&body)).await?;
        Ok(BrowsePage {
            object_ids: response.hits.into_iter().map(|hit| hit.object_id).collect(),
            cursor: response.cursor.filter(|cursor| !cursor.is_empty()),
        })
    }

    async fn delete(&self, object_ids: &[String]) -> Result<(), IndexError> {
        if object_ids.len() > MAX_DELETE_BATCH {
            return Err(IndexError::Limit(format!(
                "delete of {} ids exceeds the {} id limit",
                object_ids.len(),
                MAX_DELETE_BATCH
            )));
        }
        let requests = object_ids
            .iter()
            .map(|id| BatchRequest {
                action: "deleteObject",
                body: BatchPayload::Id(ObjectRef { object_id: id }),
            })
            .collect();
        self.submit_batch(requests).await
    }

    async fn configure(&self, settings: &IndexSettings) -> Result<(), IndexError> {
        let url = self.endpoint(&["settings"])?;
        let task: TaskResponse = self.send(Method::PUT, url, Some(settings)).await?;
        self.wait_for_task(task.task_id).await
    }
}

#[derive(Serialize)]
struct BatchBody<'a> {
    requests: Vec<BatchRequest<'a>>,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    action: &'static str,
    body: BatchPayload<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum BatchPayload<'a> {
    Record(&'a SearchRecord),
    Id(ObjectRef<'a>),
}

#[derive(Serialize)]
struct ObjectRef<'a> {
    #[serde(rename = "objectID")]
    object_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrowseRequest<'a> {
    filters: String,
    attributes_to_retrieve: &'a [&'a str],
    hits_per_page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct BrowseResponse {
    #[serde(default)]
    hits: Vec<BrowseHit>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrowseHit {
    #[serde(rename = "objectID")]
    object_id: String,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(rename = "taskID")]
    task_id: u64,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> AlgoliaIndex {
        AlgoliaIndex::new(
            "APPID",
            "secret",
            "docs",
            Some(Url::parse(endpoint).unwrap()),
            Duration::from_secs(5),
            3,
        )
        .unwrap()
    }

    #[test]
    fn endpoint_paths_are_encoded() {
        let index = AlgoliaIndex::new(
            "APPID",
            "secret",
            "docs prod",
            None,
            Duration::from_secs(5),
            1,
        )
        .unwrap();
        assert_eq!(
            index.endpoint(&["task", "7"]).unwrap().as_str(),
            "https://appid.algolia.net/1/indexes/docs%20prod/task/7"
        );
    }

    #[test]
    fn endpoint_override_keeps_prefix() {
        let index = client("http://localhost:9200/proxy/");
        assert_eq!(
            index.endpoint(&["browse"]).unwrap().as_str(),
            "http://localhost:9200/proxy/1/indexes/docs/browse"
        );
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_backoff(base, 1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(base, 5), Duration::from_millis(16000));
        assert_eq!(retry_backoff(base, 9), Duration::from_millis(16000));
    }

    #[test]
    fn retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::FORBIDDEN));
    }
}
