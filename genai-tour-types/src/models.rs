use serde::{Deserialize, Serialize};

use crate::content::{Content, Part};

/// `GenerateContent` 请求配置。
///
/// 会话创建时绑定，之后不可修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl GenerateContentConfig {
    /// 以系统指令创建配置。
    pub fn with_system_instruction(instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(instruction)],
            }),
        }
    }

    /// 系统指令文本（若有）。
    #[must_use]
    pub fn system_instruction_text(&self) -> Option<&str> {
        self.system_instruction
            .as_ref()
            .and_then(Content::first_text)
    }
}

/// `GenerateContent` 请求体。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl GenerateContentRequest {
    /// 由内容与配置组装请求体。
    #[must_use]
    pub fn new(contents: Vec<Content>, config: GenerateContentConfig) -> Self {
        Self {
            contents,
            system_instruction: config.system_instruction,
        }
    }
}

/// 模型信息。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_token_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_token_limit: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_actions: Option<Vec<String>>,
}

/// `ListModels` 请求配置。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListModelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_base: Option<bool>,
}

/// `ListModels` 响应体。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListModelsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<Model>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}
