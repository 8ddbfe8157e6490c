//! 服务商请求的 HTTP 传输层
//!
//! 各服务商只负责构造 [`HttpRequest`] 和解析 [`HttpResponse`]，真正的发送由
//! [`HttpTransport`] 完成，测试时可以替换为记录请求的实现。

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    /// 已编码的 `application/x-www-form-urlencoded` 内容
    Form(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, body: String) -> Self {
        self.body = Some(RequestBody::Form(body));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 解析响应体，非 JSON 内容返回 `None`
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

static BUILT_IN_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// 基于 reqwest 的默认实现
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: Option<reqwest::Client>) -> Self {
        let client = client.unwrap_or_else(|| BUILT_IN_CLIENT.get_or_init(reqwest::Client::new).clone());
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!("{} {}", request.method, strip_query(&request.url));

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Form(body)) => builder
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .with_context(|| format!("请求失败: {}", strip_query(&request.url)))?;
        let status = response.status().as_u16();
        let body = response.text().await.context("读取响应内容失败")?;
        debug!("响应状态 {}，{} 字节", status, body.len());

        Ok(HttpResponse { status, body })
    }
}

// 查询参数里可能带有 access_token 或签名，日志中不输出
fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
