//! Chats API surface.

use std::sync::Arc;

use tokio::sync::RwLock;

use genai_tour_types::content::Content;
use genai_tour_types::models::GenerateContentConfig;
use genai_tour_types::response::GenerateContentResponse;

use crate::client::ClientInner;
use crate::error::Result;
use crate::models::Models;

#[derive(Clone)]
pub struct Chats {
    pub(crate) inner: Arc<ClientInner>,
}

impl Chats {
    pub(crate) fn new(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// 创建新会话。
    pub fn create(&self, model: impl Into<String>) -> ChatSession {
        ChatSession::new(self.inner.clone(), model.into(), GenerateContentConfig::default())
    }

    /// 带配置创建会话。配置在会话生命周期内保持不变。
    pub fn create_with_config(
        &self,
        model: impl Into<String>,
        config: GenerateContentConfig,
    ) -> ChatSession {
        ChatSession::new(self.inner.clone(), model.into(), config)
    }
}

/// Chat 会话。
///
/// 历史只追加不修改；克隆的会话共享同一份历史。
#[derive(Clone)]
pub struct ChatSession {
    client: Arc<ClientInner>,
    model: String,
    history: Arc<RwLock<Vec<Content>>>,
    config: GenerateContentConfig,
}

impl ChatSession {
    fn new(client: Arc<ClientInner>, model: String, config: GenerateContentConfig) -> Self {
        Self {
            client,
            model,
            history: Arc::new(RwLock::new(Vec::new())),
            config,
        }
    }

    /// 发送消息。
    ///
    /// 请求使用历史快照加上本轮用户消息；只有响应带有内容时，
    /// 用户消息与模型消息才一起写入历史。失败的一轮不会留下痕迹。
    pub async fn send_message(
        &self,
        message: impl Into<String>,
    ) -> Result<GenerateContentResponse> {
        let user_content = Content::user(message);

        let mut contents = self.history.read().await.clone();
        contents.push(user_content.clone());

        let models = Models::new(self.client.clone());
        let response = models
            .generate_content_with_config(&self.model, contents, self.config.clone())
            .await?;

        if let Some(content) = response.first_content() {
            let mut history = self.history.write().await;
            history.push(user_content);
            history.push(content.clone());
        }

        Ok(response)
    }

    /// 获取历史快照。
    pub async fn history(&self) -> Vec<Content> {
        self.history.read().await.clone()
    }

    /// 会话配置（只读）。
    #[must_use]
    pub const fn config(&self) -> &GenerateContentConfig {
        &self.config
    }

    /// 会话使用的模型。
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}
