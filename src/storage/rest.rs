//! Firebase 风格的 REST 文档存储
//!
//! 每个节点映射为 `{base_url}/{path}.json`：GET 读取、PUT 替换、PATCH 合并。
//! 所有请求都有超时，瞬时错误按指数退避重试。

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{AppError, Result};
use crate::storage::store::{DocumentStore, StorePath};

/// 单次退避上限
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// REST 文档存储
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl RestStore {
    /// 根据配置创建存储
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(AppError::Config("store.base_url is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// 节点对应的 URL
    pub fn url(&self, path: &StorePath) -> String {
        let mut url = self.base_url.clone();
        if path.segments().is_empty() {
            url.push('/');
        }
        for segment in path.segments() {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url.push_str(".json");
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.query(&[("auth", token.as_str())]),
            None => builder,
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(AppError::Status {
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }

    /// 发送请求，瞬时错误时按指数退避重试
    async fn send<F>(&self, op: &'static str, path: &StorePath, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt = 0u32;
        let mut backoff = self.initial_backoff;

        loop {
            let result = match self.authorize(build()).send().await {
                Ok(response) => Self::check_status(response).await,
                Err(e) => Err(AppError::from(e)),
            };

            match result {
                Ok(response) => {
                    debug!(op, path = %path, attempt, "Store request succeeded");
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        op,
                        path = %path,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn read(&self, path: &StorePath) -> Result<Option<Value>> {
        let url = self.url(path);
        let response = self.send("read", path, || self.client.get(&url)).await?;
        let value: Value = response.json().await?;
        Ok(Some(value).filter(|v| !v.is_null()))
    }

    async fn write(&self, path: &StorePath, document: &Value) -> Result<()> {
        let url = self.url(path);
        self.send("write", path, || {
            self.client
                .put(&url)
                .query(&[("print", "silent")])
                .json(document)
        })
        .await?;
        Ok(())
    }

    async fn update(&self, path: &StorePath, partial: &Map<String, Value>) -> Result<()> {
        let url = self.url(path);
        self.send("update", path, || {
            self.client
                .patch(&url)
                .query(&[("print", "silent")])
                .json(partial)
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, token: Option<&str>) -> RestStore {
        RestStore::new(&StoreConfig {
            base_url: server.uri(),
            auth_token: token.map(Into::into),
            request_timeout_secs: 5,
            max_retries: 2,
            retry_backoff_ms: 1,
            ..StoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_encodes_segments() {
        let store = RestStore::new(&StoreConfig {
            base_url: "https://example.firebaseio.com/".into(),
            ..StoreConfig::default()
        })
        .unwrap();
        assert_eq!(
            store.url(&StorePath::student("a b")),
            "https://example.firebaseio.com/students/a%20b.json"
        );
        assert_eq!(store.url(&StorePath::root()), "https://example.firebaseio.com/.json");
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        assert!(matches!(
            RestStore::new(&StoreConfig::default()),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_read_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/modules/m1.json"))
            .and(query_param("auth", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Algebra" })))
            .mount(&server)
            .await;

        let store = store_for(&server, Some("secret"));
        let value = store.read(&StorePath::module("m1")).await.unwrap();
        assert_eq!(value, Some(json!({ "name": "Algebra" })));
    }

    #[tokio::test]
    async fn test_read_null_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/modules/gone.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Null))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        assert!(store.read(&StorePath::module("gone")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_sends_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/modules/m1/2024-03-04.json"))
            .and(body_json(json!({ "totalStudents": 3 })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let partial = json!({ "totalStudents": 3 }).as_object().cloned().unwrap();
        store
            .update(&StorePath::module_day("m1", date), &partial)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students.json"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/students.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "s1": {} })))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let value = store.read(&StorePath::students()).await.unwrap();
        assert_eq!(value, Some(json!({ "s1": {} })));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/students.json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let err = store.read(&StorePath::students()).await.unwrap_err();
        assert!(matches!(err, AppError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/modules/m1.json"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Permission denied"))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let err = store
            .write(&StorePath::module("m1"), &json!({ "name": "Algebra" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Status { status: 401, .. }));
    }
}
