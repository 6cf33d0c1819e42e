use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;

const TIMEOUT_SECONDS: u64 = 20;

/// Bangumi API 要求 UA 标明项目来源
const USER_AGENT: &str =
    "bangumi-annual-api/0.1 (https://github.com/Moe-Sakura/bangumi-annual-api)";

/// 全局 HTTP 客户端
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(TIMEOUT_SECONDS))
        .user_agent(USER_AGENT)
        .gzip(true)
        .brotli(true)
        .build()
        .expect("Failed to create HTTP client")
});

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("请求超时")]
    Timeout,
    #[error("请求失败: {0}")]
    RequestFailed(String),
    #[error("响应异常状态码: {0}")]
    BadStatus(u16),
}

impl HttpClientError {
    /// 上游返回的状态码 (非 HTTP 层错误时为 None)
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpClientError::BadStatus(code) => Some(*code),
            _ => None,
        }
    }
}

/// GET 请求, 可选 Bearer Token
pub async fn get(url: &str, token: Option<&str>) -> Result<Response, HttpClientError> {
    let mut req = HTTP_CLIENT.get(url);

    if let Some(token) = token {
        req = req.bearer_auth(token);
    }

    let response = req.send().await.map_err(|e| {
        if e.is_timeout() {
            HttpClientError::Timeout
        } else {
            HttpClientError::RequestFailed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(HttpClientError::BadStatus(response.status().as_u16()));
    }

    Ok(response)
}

/// GET 请求并返回 JSON
pub async fn get_json<T: serde::de::DeserializeOwned>(
    url: &str,
    token: Option<&str>,
) -> Result<T, HttpClientError> {
    let response = get(url, token).await?;
    response
        .json()
        .await
        .map_err(|e| HttpClientError::RequestFailed(e.to_string()))
}

/// GET 请求并返回原始字节与 Content-Type (图片代理用)
pub async fn get_bytes(url: &str) -> Result<(Vec<u8>, Option<String>), HttpClientError> {
    let response = get(url, None).await?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = response
        .bytes()
        .await
        .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;
    Ok((bytes.to_vec(), content_type))
}
