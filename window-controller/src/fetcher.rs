// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::marker::PhantomData;

use async_trait::async_trait;
use core_types::config::FetchConfig;
use log::debug;
use record_ledger::RecordId;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("row endpoint returned {0}")]
    HttpStatus(StatusCode),
    #[error("row endpoint returned non-JSON content type '{content_type}'")]
    NotJson { content_type: String },
    #[error("failed to decode rows: {0}")]
    Decode(#[from] serde_json::Error),
    /// Failure reported by a non-HTTP fetcher.
    #[error("{0}")]
    Other(String),
}

/// Row-fetch-by-ids collaborator.
#[async_trait]
pub trait RowFetcher<R>: Send + Sync {
    /// Fetches rows for exactly `ids`. Rows may come back in any order; ids without a
    /// row in the response are treated as failed.
    async fn fetch_rows(&self, module: &str, ids: &[RecordId]) -> Result<Vec<R>, FetchError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RowsPayload<R> {
    Bare(Vec<R>),
    Wrapped { rows: Vec<R> },
}

impl<R> RowsPayload<R> {
    fn into_rows(self) -> Vec<R> {
        match self {
            RowsPayload::Bare(rows) | RowsPayload::Wrapped { rows } => rows,
        }
    }
}

/// `GET {base_url}{rows_path}?ids=..&ids=..` fetcher backed by reqwest.
pub struct HttpRowFetcher<R> {
    client: Client,
    config: FetchConfig,
    _rows: PhantomData<fn() -> R>,
}

impl<R> HttpRowFetcher<R> {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder().user_agent(config.user_agent.clone()).build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: FetchConfig) -> Self {
        Self {
            client,
            config,
            _rows: PhantomData,
        }
    }

    pub fn rows_url(&self, module: &str, ids: &[RecordId]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.config.base_url)?;
        // rows path is relative to any path prefix on the base url
        let rows_path = self.config.rows_path_for(module);
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            rows_path.trim_start_matches('/')
        );
        url.set_path(&path);
        {
            let mut pairs = url.query_pairs_mut();
            for id in ids {
                pairs.append_pair("ids", id.key().as_str());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl<R> RowFetcher<R> for HttpRowFetcher<R>
where
    R: DeserializeOwned + Send + 'static,
{
    async fn fetch_rows(&self, module: &str, ids: &[RecordId]) -> Result<Vec<R>, FetchError> {
        let url = self.rows_url(module, ids)?;
        debug!("[{}] fetching {} row(s)", module, ids.len());
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status));
        }
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.to_ascii_lowercase().contains("json") {
            return Err(FetchError::NotJson { content_type });
        }
        let body = resp.bytes().await?;
        let payload: RowsPayload<R> = serde_json::from_slice(&body)?;
        Ok(payload.into_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::RawQuery,
        http::{header, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    fn requested_ids(query: Option<String>) -> Vec<i64> {
        query
            .unwrap_or_default()
            .split('&')
            .filter_map(|pair| pair.strip_prefix("ids="))
            .filter_map(|id| id.parse().ok())
            .collect()
    }

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher(base_url: String, rows_path: Option<&str>) -> HttpRowFetcher<Value> {
        HttpRowFetcher::new(FetchConfig {
            base_url,
            rows_path: rows_path.map(str::to_string),
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn url_repeats_ids_in_order() {
        let fetcher = fetcher("http://localhost:9000".into(), None);
        let url = fetcher
            .rows_url("jobs", &[RecordId::Int(3), RecordId::Int(1), RecordId::from("a-7")])
            .unwrap();
        assert_eq!(url.path(), "/jobs/rows");
        assert_eq!(url.query(), Some("ids=3&ids=1&ids=a-7"));
    }

    #[test]
    fn url_honors_path_template() {
        let fetcher = fetcher("http://localhost:9000".into(), Some("/api/{module}/by-ids"));
        let url = fetcher.rows_url("companies", &[RecordId::Int(1)]).unwrap();
        assert_eq!(url.path(), "/api/companies/by-ids");
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        for base in ["http://localhost:9000/app", "http://localhost:9000/app/"] {
            let fetcher = fetcher(base.into(), None);
            let url = fetcher.rows_url("jobs", &[RecordId::Int(1)]).unwrap();
            assert_eq!(url.path(), "/app/jobs/rows");
        }
        let fetcher = fetcher("http://localhost:9000/app".into(), Some("/api/{module}/by-ids"));
        let url = fetcher.rows_url("companies", &[RecordId::Int(1)]).unwrap();
        assert_eq!(url.path(), "/app/api/companies/by-ids");
    }

    #[tokio::test]
    async fn accepts_bare_and_wrapped_payloads() {
        let app = Router::new()
            .route(
                "/jobs/rows",
                get(|RawQuery(q): RawQuery| async move {
                    Json(Value::Array(
                        requested_ids(q).into_iter().map(|id| json!({ "id": id })).collect(),
                    ))
                }),
            )
            .route(
                "/companies/rows",
                get(|RawQuery(q): RawQuery| async move {
                    let rows: Vec<Value> =
                        requested_ids(q).into_iter().map(|id| json!({ "id": id })).collect();
                    Json(json!({ "rows": rows }))
                }),
            );
        let base = serve(app).await;
        let fetcher = fetcher(base, None);
        let ids = [RecordId::Int(1), RecordId::Int(2)];
        let jobs = fetcher.fetch_rows("jobs", &ids).await.unwrap();
        assert_eq!(jobs, vec![json!({"id": 1}), json!({"id": 2})]);
        let companies = fetcher.fetch_rows("companies", &ids).await.unwrap();
        assert_eq!(companies.len(), 2);
    }

    #[tokio::test]
    async fn rejects_error_status_and_non_json() {
        let app = Router::new()
            .route(
                "/jobs/rows",
                get(|| async { (AxumStatus::BAD_GATEWAY, "upstream down") }),
            )
            .route(
                "/companies/rows",
                get(|| async {
                    ([(header::CONTENT_TYPE, "text/html")], "<html></html>").into_response()
                }),
            );
        let base = serve(app).await;
        let fetcher = fetcher(base, None);
        let ids = [RecordId::Int(1)];
        assert!(matches!(
            fetcher.fetch_rows("jobs", &ids).await,
            Err(FetchError::HttpStatus(status)) if status.as_u16() == 502
        ));
        assert!(matches!(
            fetcher.fetch_rows("companies", &ids).await,
            Err(FetchError::NotJson { .. })
        ));
    }
}
