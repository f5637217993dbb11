#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{FutureExt, StreamExt};
use serde_json::{json, Value};

use genai_tour::types::content::Content;
use genai_tour::{Client, ConversationSession, Error, GenerativeService, Result};

pub fn build_gemini_client(base_url: &str) -> Client {
    Client::builder()
        .api_key("test-key")
        .base_url(base_url)
        .build()
        .unwrap()
}

pub fn model_reply(text: &str) -> Value {
    json!({
        "candidates": [
            {"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}
        ]
    })
}

/// 模拟协作方收到的一次调用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListModels,
    Generate {
        model: String,
        prompt: String,
    },
    StartChat {
        model: String,
        instruction: Option<String>,
    },
    Send {
        prompt: String,
        instruction: Option<String>,
    },
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

fn service_unavailable() -> Error {
    Error::ApiError {
        status: 503,
        message: "service unavailable".into(),
    }
}

/// 记录调用的模拟服务。
#[derive(Default)]
pub struct MockService {
    pub log: CallLog,
    pub models: Vec<String>,
    pub fail_list: bool,
    pub fail_generate: bool,
    /// 发送到此提问时返回错误。
    pub fail_prompt: Option<String>,
}

impl MockService {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            models: vec![
                "models/gemini-2.0-flash".to_string(),
                "models/gemini-2.5-pro".to_string(),
            ],
            ..Self::default()
        }
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

impl GenerativeService for MockService {
    type Session = MockSession;

    fn list_models(&self) -> BoxStream<'_, Result<String>> {
        self.record(Call::ListModels);
        if self.fail_list {
            return stream::once(async { Err(service_unavailable()) }).boxed();
        }
        stream::iter(self.models.clone().into_iter().map(Ok)).boxed()
    }

    fn generate_text<'a>(&'a self, model: &'a str, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        self.record(Call::Generate {
            model: model.to_string(),
            prompt: prompt.to_string(),
        });
        let fail = self.fail_generate;
        async move {
            if fail {
                Err(service_unavailable())
            } else {
                Ok("Google".to_string())
            }
        }
        .boxed()
    }

    fn start_chat(&self, model: &str, system_instruction: Option<&str>) -> MockSession {
        let instruction = system_instruction.map(ToString::to_string);
        self.record(Call::StartChat {
            model: model.to_string(),
            instruction: instruction.clone(),
        });
        MockSession {
            log: self.log.clone(),
            instruction,
            history: Arc::default(),
            fail_prompt: self.fail_prompt.clone(),
        }
    }
}

/// 模拟会话：回显提问并记录当时生效的系统指令。
///
/// 与 `ChatSession` 一致，失败的一轮不写入历史。
pub struct MockSession {
    log: CallLog,
    instruction: Option<String>,
    history: Arc<Mutex<Vec<Content>>>,
    fail_prompt: Option<String>,
}

impl MockSession {
    pub fn standalone(log: CallLog, instruction: Option<&str>) -> Self {
        Self {
            log,
            instruction: instruction.map(ToString::to_string),
            history: Arc::default(),
            fail_prompt: None,
        }
    }

    pub fn failing_on(mut self, prompt: &str) -> Self {
        self.fail_prompt = Some(prompt.to_string());
        self
    }
}

impl ConversationSession for MockSession {
    fn send_text<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            self.log.lock().unwrap().push(Call::Send {
                prompt: prompt.to_string(),
                instruction: self.instruction.clone(),
            });
            if self.fail_prompt.as_deref() == Some(prompt) {
                return Err(service_unavailable());
            }
            let reply = format!("eco: {prompt}");
            let mut history = self.history.lock().unwrap();
            history.push(Content::user(prompt));
            history.push(Content::model(reply.clone()));
            Ok(reply)
        }
        .boxed()
    }

    fn history(&self) -> BoxFuture<'_, Vec<Content>> {
        let snapshot = self.history.lock().unwrap().clone();
        async move { snapshot }.boxed()
    }
}

pub fn sent_prompts(log: &CallLog) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|call| match call {
            Call::Send { prompt, .. } => Some(prompt.clone()),
            _ => None,
        })
        .collect()
}
