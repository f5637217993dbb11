//! Capability seam between the session runner and the remote service.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt, TryStreamExt};

use genai_tour_types::content::Content;
use genai_tour_types::models::{GenerateContentConfig, ListModelsConfig};
use genai_tour_types::response::GenerateContentResponse;

use crate::chats::ChatSession;
use crate::client::Client;
use crate::error::Result;

/// 生成式语言服务能力。
pub trait GenerativeService {
    type Session: ConversationSession;

    /// 可用模型标识的惰性序列，只能遍历一次。
    fn list_models(&self) -> BoxStream<'_, Result<String>>;

    /// 单次生成，返回响应文本。
    fn generate_text<'a>(&'a self, model: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String>>;

    /// 创建会话；`system_instruction` 在创建后不可更改。
    fn start_chat(&self, model: &str, system_instruction: Option<&str>) -> Self::Session;
}

/// 有状态的对话会话。
pub trait ConversationSession {
    /// 发送一轮对话，返回响应文本。
    fn send_text<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;

    /// 按顺序返回会话历史。
    fn history(&self) -> BoxFuture<'_, Vec<Content>>;
}

impl GenerativeService for Client {
    type Session = ChatSession;

    fn list_models(&self) -> BoxStream<'_, Result<String>> {
        self.models()
            .pager(ListModelsConfig::default())
            .try_filter_map(|model| async move { Ok(model.name) })
            .boxed()
    }

    fn generate_text<'a>(&'a self, model: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            let response = self
                .models()
                .generate_content(model, vec![Content::user(prompt)])
                .await?;
            Ok(response_text(&response))
        }
        .boxed()
    }

    fn start_chat(&self, model: &str, system_instruction: Option<&str>) -> ChatSession {
        let config = system_instruction
            .map(GenerateContentConfig::with_system_instruction)
            .unwrap_or_default();
        self.chats().create_with_config(model, config)
    }
}

impl ConversationSession for ChatSession {
    fn send_text<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            let response = self.send_message(prompt).await?;
            Ok(response_text(&response))
        }
        .boxed()
    }

    fn history(&self) -> BoxFuture<'_, Vec<Content>> {
        ChatSession::history(self).boxed()
    }
}

/// 响应文本；无文本（如被安全策略拦截）时为空串。
fn response_text(response: &GenerateContentResponse) -> String {
    response.text().unwrap_or_default()
}

/// 单条历史的可读形式：`role: text`；缺少角色时只输出文本。
#[must_use]
pub fn describe_turn(content: &Content) -> String {
    match content.role {
        Some(role) => format!("{role}: {}", content.joined_text()),
        None => content.joined_text(),
    }
}
