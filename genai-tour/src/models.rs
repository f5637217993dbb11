//! Models API surface.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use genai_tour_types::content::Content;
use genai_tour_types::models::{
    GenerateContentConfig, GenerateContentRequest, ListModelsConfig, ListModelsResponse, Model,
};
use genai_tour_types::response::GenerateContentResponse;

use crate::client::ClientInner;
use crate::error::{Error, Result};
use serde_json::Value;

#[derive(Clone)]
pub struct Models {
    pub(crate) inner: Arc<ClientInner>,
}

impl Models {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// 生成内容（默认配置）。
    pub async fn generate_content(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
    ) -> Result<GenerateContentResponse> {
        self.generate_content_with_config(model, contents, GenerateContentConfig::default())
            .await
    }

    /// 生成内容（自定义配置）。
    pub async fn generate_content_with_config(
        &self,
        model: impl Into<String>,
        contents: Vec<Content>,
        config: GenerateContentConfig,
    ) -> Result<GenerateContentResponse> {
        let model = model.into();
        if contents.is_empty() {
            return Err(Error::InvalidConfig {
                message: "contents must not be empty".into(),
            });
        }

        let request = GenerateContentRequest::new(contents, config);
        let url = build_model_method_url(&self.inner, &model, "generateContent");
        let request = self.inner.http.post(url).json(&request);
        let response = self.inner.send_checked(request).await?;
        let value = response.json::<Value>().await?;
        Ok(serde_json::from_value::<GenerateContentResponse>(value)?)
    }

    /// 列出模型（基础列表）。
    pub async fn list(&self) -> Result<ListModelsResponse> {
        self.list_with_config(ListModelsConfig::default()).await
    }

    /// 列出模型（带配置）。
    pub async fn list_with_config(&self, config: ListModelsConfig) -> Result<ListModelsResponse> {
        let url = build_models_list_url(&self.inner, &config)?;
        let request = self.inner.http.get(url);
        let response = self.inner.send_checked(request).await?;
        Ok(response.json::<ListModelsResponse>().await?)
    }

    /// 按需翻页的模型流。
    ///
    /// 只有当前页消费完才会请求下一页；某一页出错时流以该错误结束。
    /// 流只能遍历一次。
    pub fn pager(&self, config: ListModelsConfig) -> impl Stream<Item = Result<Model>> + Send {
        let state = PagerState {
            models: self.clone(),
            config,
            buffered: VecDeque::new(),
            exhausted: false,
        };
        stream::try_unfold(state, next_model)
    }
}

struct PagerState {
    models: Models,
    config: ListModelsConfig,
    buffered: VecDeque<Model>,
    exhausted: bool,
}

async fn next_model(mut state: PagerState) -> Result<Option<(Model, PagerState)>> {
    loop {
        if let Some(model) = state.buffered.pop_front() {
            return Ok(Some((model, state)));
        }
        if state.exhausted {
            return Ok(None);
        }

        let response = state.models.list_with_config(state.config.clone()).await?;
        state.buffered.extend(response.models.unwrap_or_default());
        match response.next_page_token {
            Some(token) if !token.is_empty() => state.config.page_token = Some(token),
            _ => state.exhausted = true,
        }
    }
}

fn transform_model_name(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn build_model_method_url(inner: &ClientInner, model: &str, method: &str) -> String {
    let model = transform_model_name(model);
    inner.endpoint.url(&format!("{model}:{method}"))
}

fn build_models_list_url(inner: &ClientInner, config: &ListModelsConfig) -> Result<String> {
    add_list_query_params(inner.endpoint.url("models"), config)
}

fn add_list_query_params(url: String, config: &ListModelsConfig) -> Result<String> {
    let mut url = reqwest::Url::parse(&url).map_err(|err| Error::InvalidConfig {
        message: err.to_string(),
    })?;
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(page_size) = config.page_size {
            pairs.append_pair("pageSize", &page_size.to_string());
        }
        if let Some(page_token) = &config.page_token {
            pairs.append_pair("pageToken", page_token);
        }
        if let Some(filter) = &config.filter {
            pairs.append_pair("filter", filter);
        }
        if let Some(query_base) = config.query_base {
            pairs.append_pair("queryBase", if query_base { "true" } else { "false" });
        }
    }
    // 无查询参数时去掉末尾的 `?`。
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url.to_string())
}
