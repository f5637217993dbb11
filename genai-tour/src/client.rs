//! Client configuration and transport layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as HttpClient, Proxy};

use crate::error::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/";
const DEFAULT_API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// 凭据环境变量，按优先级排列。
pub const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Gemini 客户端。
///
/// 克隆开销很小，所有克隆共享同一个连接池与凭据。
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub http: HttpClient,
    pub config: ClientConfig,
    pub endpoint: Endpoint,
}

/// 已解析的客户端配置。
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub http_options: HttpOptions,
}

/// HTTP 选项。
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// 请求超时（秒）。
    pub timeout: Option<u64>,
    pub proxy: Option<String>,
    /// 额外的默认请求头；同名时覆盖 API Key 头。
    pub headers: HashMap<String, String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
}

impl Client {
    /// 使用给定 API Key 和默认选项创建客户端。
    ///
    /// # Errors
    /// API Key 为空或无法作为请求头时返回错误。
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::builder().api_key(api_key).build()
    }

    /// 从环境变量创建客户端，见 [`ClientBuilder::from_env`]。
    ///
    /// # Errors
    /// 找不到凭据或构建失败时返回错误。
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env()?.build()
    }

    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// 访问 Models API。
    #[must_use]
    pub fn models(&self) -> crate::models::Models {
        crate::models::Models::new(self.inner.clone())
    }

    /// 访问 Chats API。
    #[must_use]
    pub fn chats(&self) -> crate::chats::Chats {
        crate::chats::Chats::new(self.inner.clone())
    }
}

/// 客户端 Builder。
#[derive(Default)]
pub struct ClientBuilder {
    api_key: Option<String>,
    http_options: HttpOptions,
}

impl ClientBuilder {
    /// 以环境变量初始化 Builder。
    ///
    /// 凭据取自 `GOOGLE_API_KEY`，其次 `GEMINI_API_KEY`；空白值视为未设置。
    /// `GENAI_BASE_URL`（或 `GEMINI_BASE_URL`）与 `GENAI_API_VERSION` 为可选覆盖。
    ///
    /// # Errors
    /// 两个凭据变量都缺失或为空白时返回 `InvalidConfig`。
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut keys = API_KEY_VARS
            .iter()
            .filter_map(|name| present(name).map(|value| (*name, value)));
        let (source, api_key) = keys.next().ok_or_else(|| Error::InvalidConfig {
            message: format!("{} or {} not found", API_KEY_VARS[1], API_KEY_VARS[0]),
        })?;
        if let Some((ignored, _)) = keys.next() {
            tracing::warn!(using = source, ignored, "both API key variables are set");
        }

        let mut builder = Self::default().api_key(api_key);
        if let Some(base_url) = present("GENAI_BASE_URL").or_else(|| present("GEMINI_BASE_URL")) {
            builder = builder.base_url(base_url);
        }
        if let Some(api_version) = present("GENAI_API_VERSION") {
            builder = builder.api_version(api_version);
        }
        Ok(builder)
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub const fn timeout(mut self, secs: u64) -> Self {
        self.http_options.timeout = Some(secs);
        self
    }

    #[must_use]
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.http_options.proxy = Some(url.into());
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_options.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http_options.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.http_options.api_version = Some(api_version.into());
        self
    }

    /// 构建客户端。
    ///
    /// # Errors
    /// API Key 缺失、请求头或代理无效、HTTP 客户端构建失败时返回错误。
    pub fn build(self) -> Result<Client> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig {
                message: "API key required for Gemini API".into(),
            })?;
        let config = ClientConfig {
            api_key,
            http_options: self.http_options,
        };

        let http = http_client(&config)?;
        let endpoint = Endpoint::new(&config.http_options);
        tracing::debug!(base_url = %endpoint.base_url, api_version = %endpoint.api_version, "client ready");

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                config,
                endpoint,
            }),
        })
    }
}

fn http_client(config: &ClientConfig) -> Result<HttpClient> {
    let options = &config.http_options;
    let mut builder = HttpClient::builder().default_headers(default_headers(config)?);
    if let Some(secs) = options.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(url) = &options.proxy {
        let proxy = Proxy::all(url).map_err(|err| Error::InvalidConfig {
            message: format!("Invalid proxy: {err}"),
        })?;
        builder = builder.proxy(proxy);
    }
    Ok(builder.build()?)
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let invalid = |message: String| Error::InvalidConfig { message };

    let mut key = HeaderValue::from_str(&config.api_key)
        .map_err(|_| invalid("Invalid API key value".into()))?;
    key.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(API_KEY_HEADER), key);
    for (name, value) in &config.http_options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| invalid(format!("Invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| invalid(format!("Invalid header value for {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

impl ClientInner {
    /// 发送请求。
    ///
    /// # Errors
    /// 请求构建或网络请求失败时返回错误。
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = request.build()?;
        tracing::debug!(
            method = %request.method(),
            path = request.url().path(),
            "sending Gemini API request"
        );
        let response = self.http.execute(request).await?;
        tracing::debug!(status = response.status().as_u16(), "Gemini API responded");
        Ok(response)
    }

    /// 发送请求，非 2xx 状态转换为 `ApiError`。
    ///
    /// # Errors
    /// 网络请求失败或服务端返回错误状态时返回错误。
    pub async fn send_checked(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(Error::ApiError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }
}

/// API 根地址与版本。
pub(crate) struct Endpoint {
    pub base_url: String,
    pub api_version: String,
}

impl Endpoint {
    fn new(options: &HttpOptions) -> Self {
        let base_url = options
            .base_url
            .as_deref()
            .map_or_else(|| DEFAULT_BASE_URL.to_string(), normalize_base_url);
        let api_version = options
            .api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        Self {
            base_url,
            api_version,
        }
    }

    /// `{base}{version}/{path}`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}/{path}", self.base_url, self.api_version)
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::with_env;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    fn resolved_key(vars: &[(&str, &str)]) -> Result<String> {
        Ok(ClientBuilder::from_lookup(lookup(vars))?.build()?.config().api_key.clone())
    }

    #[test]
    fn defaults_point_at_gemini_api() {
        let client = Client::new("k").unwrap();
        assert_eq!(
            client.inner.endpoint.url("models"),
            "https://generativelanguage.googleapis.com/v1beta/models"
        );
    }

    #[test]
    fn endpoint_overrides_are_normalized() {
        let client = Client::builder()
            .api_key("k")
            .base_url(" http://localhost:8080 ")
            .api_version("v1")
            .build()
            .unwrap();
        assert_eq!(client.inner.endpoint.url("models"), "http://localhost:8080/v1/models");
    }

    #[test]
    fn google_api_key_wins_when_both_are_set() {
        let key = resolved_key(&[("GEMINI_API_KEY", "gemini"), ("GOOGLE_API_KEY", "google")]);
        assert_eq!(key.unwrap(), "google");
    }

    #[test]
    fn blank_key_falls_through_to_the_other_variable() {
        let key = resolved_key(&[("GEMINI_API_KEY", ""), ("GOOGLE_API_KEY", "good-key")]);
        assert_eq!(key.unwrap(), "good-key");

        let key = resolved_key(&[("GOOGLE_API_KEY", "  "), ("GEMINI_API_KEY", "gemini")]);
        assert_eq!(key.unwrap(), "gemini");
    }

    #[test]
    fn blank_keys_count_as_missing() {
        let err = resolved_key(&[("GEMINI_API_KEY", ""), ("GOOGLE_API_KEY", " ")]).unwrap_err();
        assert!(
            matches!(err, Error::InvalidConfig { ref message } if message.contains("GEMINI_API_KEY"))
        );
    }

    #[test]
    fn blank_endpoint_overrides_are_ignored() {
        let builder = ClientBuilder::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "k"),
            ("GENAI_BASE_URL", "   "),
            ("GEMINI_BASE_URL", "http://fallback"),
            ("GENAI_API_VERSION", ""),
        ]))
        .unwrap();
        assert_eq!(builder.http_options.base_url.as_deref(), Some("http://fallback"));
        assert_eq!(builder.http_options.api_version, None);
    }

    #[test]
    fn from_env_reads_process_environment() {
        with_env(
            &[
                ("GEMINI_API_KEY", Some("")),
                ("GOOGLE_API_KEY", Some("env-key")),
                ("GENAI_BASE_URL", None),
                ("GEMINI_BASE_URL", None),
                ("GENAI_API_VERSION", Some("v99")),
            ],
            || {
                let client = Client::from_env().unwrap();
                assert_eq!(client.config().api_key, "env-key");
                assert_eq!(client.inner.endpoint.api_version, "v99");
            },
        );
    }

    #[test]
    fn invalid_options_are_rejected() {
        let base = || Client::builder().api_key("k");
        assert!(Client::builder().build().is_err());
        assert!(Client::builder().api_key("bad\nkey").build().is_err());
        assert!(base().proxy("not a url").build().is_err());
        assert!(base().header("bad header", "v").build().is_err());
        assert!(base().header("x-test", "bad\nvalue").build().is_err());
        assert!(base().proxy("http://127.0.0.1:8888").timeout(5).build().is_ok());
    }
}
