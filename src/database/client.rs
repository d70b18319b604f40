use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;

/// 记录源访问错误
#[derive(Debug)]
pub enum RepositoryError {
    /// 记录源未配置：读操作返回空集，写操作显式失败
    NotConfigured,
    /// 传输层失败（连接、超时等）
    Http(reqwest::Error),
    /// 响应体解码失败，与传输失败分开呈现
    Decode(reqwest::Error),
    Status(StatusCode),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::NotConfigured => write!(f, "repository not configured"),
            RepositoryError::Http(e) => write!(f, "repository request failed: {}", e),
            RepositoryError::Decode(e) => write!(f, "repository response decode failed: {}", e),
            RepositoryError::Status(s) => write!(f, "repository returned {}", s),
        }
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(e: reqwest::Error) -> Self {
        RepositoryError::Http(e)
    }
}

/// 记录源REST客户端
/// 租户句柄使用匿名密钥（行级策略生效），管理句柄使用服务密钥（绕过行级策略）
#[derive(Clone)]
pub struct RepositoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RepositoryClient {
    /// 管理句柄，用于成员关系与围栏的扇出查询
    pub fn admin(config: &Config) -> Option<Self> {
        Self::build(
            config.repository_url.clone()?,
            config.repository_service_key.clone()?,
        )
    }

    /// 租户句柄，用于由具体用户发起的操作
    pub fn tenant(config: &Config) -> Option<Self> {
        Self::build(
            config.repository_url.clone()?,
            config.repository_anon_key.clone()?,
        )
    }

    fn build(base_url: String, api_key: String) -> Option<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .ok()?;

        Some(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), table)
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.api_key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert("Authorization", value);
        }
        headers
    }

    /// 条件查询，返回解码后的行集
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, RepositoryError> {
        let resp = self
            .http
            .get(self.url(table))
            .headers(self.auth_headers())
            .query(query)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(RepositoryError::Status(resp.status()));
        }

        resp.json().await.map_err(RepositoryError::Decode)
    }

    /// 按唯一键合并写入
    pub async fn upsert<B: Serialize>(
        &self,
        table: &str,
        on_conflict: &str,
        body: &B,
    ) -> Result<(), RepositoryError> {
        let resp = self
            .http
            .post(self.url(table))
            .headers(self.auth_headers())
            .header("Prefer", "resolution=merge-duplicates")
            .query(&[("on_conflict", on_conflict)])
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(RepositoryError::Status(resp.status()));
        }

        Ok(())
    }
}
