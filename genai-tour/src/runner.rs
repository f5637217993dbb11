//! Session runner: the guided tour through the Gemini API.
//!
//! Steps run in a fixed order and each one is guarded on its own. Only
//! client initialization is fatal; every later failure is reported and the
//! tour moves on.

use std::fmt;
use std::io::{self, Write};

use futures_util::TryStreamExt;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{Error, Result};
use crate::service::{describe_turn, ConversationSession, GenerativeService};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_SENTINEL: &str = "fim";
pub const INPUT_PROMPT: &str = "esperando pergunta: ";

/// 可被单独捕获的步骤。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ListModels,
    GenerateOnce,
    PlainChat,
    ConfiguredChat,
    InteractiveLoop,
}

impl Step {
    /// 打印给用户的失败前缀。
    #[must_use]
    pub const fn failure_prefix(self) -> &'static str {
        match self {
            Self::ListModels => "Erro ao listar modelos",
            Self::GenerateOnce => "Erro ao usar generate_content",
            Self::PlainChat => "Erro durante a interação do chat",
            Self::ConfiguredChat => "Erro durante o chat com system_instruction",
            Self::InteractiveLoop => "Erro durante o loop de interação",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ListModels => "list-models",
            Self::GenerateOnce => "generate-once",
            Self::PlainChat => "plain-chat",
            Self::ConfiguredChat => "configured-chat",
            Self::InteractiveLoop => "interactive-loop",
        };
        f.write_str(name)
    }
}

/// 客户端初始化失败；终止整个流程。
#[derive(Debug, Error)]
#[error("Erro ao inicializar o cliente da API: {source}")]
pub struct InitializationError {
    #[from]
    pub source: Error,
}

/// 单个步骤失败；记录后继续下一步。
#[derive(Debug, Error)]
#[error("{}: {source}", .step.failure_prefix())]
pub struct StepError {
    pub step: Step,
    #[source]
    pub source: Error,
}

/// 带标签的固定提问。
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pub label: String,
    pub prompt: String,
}

impl ScriptedTurn {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
        }
    }
}

/// 导览脚本：模型、固定提问、系统指令与结束词。
#[derive(Debug, Clone)]
pub struct Script {
    pub model: String,
    pub generate_prompt: String,
    pub plain_turns: Vec<ScriptedTurn>,
    pub system_instruction: String,
    pub configured_turns: Vec<ScriptedTurn>,
    pub sentinel: String,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            generate_prompt: "quem é a empresa por tras dos modelos gemini".to_string(),
            plain_turns: vec![
                ScriptedTurn::new("Resposta inicial do chat:", "Oi, tudo bem?"),
                ScriptedTurn::new(
                    "Resposta sobre IA:",
                    "voce é um assistente pessoal e voce sempre responde de forma sucinta. oque é inteligencia artificial ?",
                ),
            ],
            system_instruction:
                "voce é um assistente pessoal e voce sempre responde de forma sucinta.".to_string(),
            configured_turns: vec![
                ScriptedTurn::new(
                    "Resposta sobre computação quântica:",
                    "oque é computação quntica?",
                ),
                ScriptedTurn::new(
                    "Resposta sobre computação clássica:",
                    "e qual a diferença para a computação clássica?",
                ),
            ],
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

/// 各步骤的执行结果。
#[derive(Debug, Default)]
pub struct RunReport {
    pub attempted: Vec<Step>,
    pub failures: Vec<StepError>,
}

impl RunReport {
    /// 步骤是否被执行过。
    #[must_use]
    pub fn attempted(&self, step: Step) -> bool {
        self.attempted.contains(&step)
    }

    /// 步骤是否失败。
    #[must_use]
    pub fn failed(&self, step: Step) -> bool {
        self.failures.iter().any(|failure| failure.step == step)
    }

    fn record<W: Write>(&mut self, step: Step, result: Result<()>, out: &mut W) {
        self.attempted.push(step);
        if let Err(source) = result {
            let failure = StepError { step, source };
            tracing::warn!(%step, error = %failure.source, "step failed");
            notify(out, format_args!("{failure}"));
            self.failures.push(failure);
        }
    }
}

/// 初始化客户端；失败时打印提示并返回 `InitializationError`。
///
/// # Errors
/// `connect` 失败时返回错误，调用方应终止流程。
pub fn initialize<S, F, W>(connect: F, out: &mut W) -> std::result::Result<S, InitializationError>
where
    F: FnOnce() -> Result<S>,
    W: Write,
{
    match connect() {
        Ok(service) => {
            notify(out, format_args!("Cliente da API Gemini inicializado."));
            Ok(service)
        }
        Err(source) => {
            let err = InitializationError::from(source);
            tracing::error!(error = %err.source, "client initialization failed");
            notify(out, format_args!("{err}"));
            notify(
                out,
                format_args!(
                    "Certifique-se de que a variável de ambiente GOOGLE_API_KEY (ou GEMINI_API_KEY) está definida corretamente."
                ),
            );
            Err(err)
        }
    }
}

/// 完整流程：初始化后依次执行全部步骤。
///
/// # Errors
/// 仅在客户端初始化失败时返回错误；此时不会调用任何远程接口。
pub async fn run_session<S, F, R, W>(
    connect: F,
    script: &Script,
    input: R,
    out: &mut W,
) -> std::result::Result<RunReport, InitializationError>
where
    S: GenerativeService,
    F: FnOnce() -> Result<S>,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let service = initialize(connect, out)?;
    Ok(run_steps(&service, script, input, out).await)
}

/// 依次执行初始化之后的五个步骤。
pub async fn run_steps<S, R, W>(service: &S, script: &Script, input: R, out: &mut W) -> RunReport
where
    S: GenerativeService,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut report = RunReport::default();

    let result = list_models(service, out).await;
    report.record(Step::ListModels, result, out);

    let result = generate_once(service, script, out).await;
    report.record(Step::GenerateOnce, result, out);

    let plain = service.start_chat(&script.model, None);
    let result = plain_chat(&plain, script, out).await;
    report.record(Step::PlainChat, result, out);

    let configured = service.start_chat(&script.model, Some(script.system_instruction.as_str()));
    let result = configured_chat(&configured, script, out).await;
    report.record(Step::ConfiguredChat, result, out);

    let result = interactive_loop(&configured, &script.sentinel, input, out).await;
    report.record(Step::InteractiveLoop, result, out);

    notify(out, format_args!("\nFim do script."));
    report
}

/// 步骤之外的输出；写入失败只记录日志，不影响流程。
fn notify<W: Write>(out: &mut W, line: fmt::Arguments<'_>) {
    if let Err(err) = writeln!(out, "{line}") {
        tracing::debug!(error = %err, "could not write to output");
    }
}

/// 逐行打印可用模型。
pub async fn list_models<S, W>(service: &S, out: &mut W) -> Result<()>
where
    S: GenerativeService,
    W: Write,
{
    writeln!(out, "\nModelos disponíveis:")?;
    let mut names = service.list_models();
    while let Some(name) = names.try_next().await? {
        writeln!(out, "{name}")?;
    }
    Ok(())
}

/// 单次生成。
pub async fn generate_once<S, W>(service: &S, script: &Script, out: &mut W) -> Result<()>
where
    S: GenerativeService,
    W: Write,
{
    writeln!(out, "\nExemplo generate_content:")?;
    let text = service
        .generate_text(&script.model, &script.generate_prompt)
        .await?;
    writeln!(out, "Resposta:")?;
    writeln!(out, "{text}")?;
    Ok(())
}

/// 无系统指令的两轮对话。
pub async fn plain_chat<C, W>(session: &C, script: &Script, out: &mut W) -> Result<()>
where
    C: ConversationSession,
    W: Write,
{
    writeln!(out, "\nExemplo de chat:")?;
    send_turns(session, &script.plain_turns, out).await
}

/// 带系统指令的两轮对话，随后打印完整历史。
pub async fn configured_chat<C, W>(session: &C, script: &Script, out: &mut W) -> Result<()>
where
    C: ConversationSession,
    W: Write,
{
    writeln!(out, "\nExemplo de chat com system_instruction:")?;
    send_turns(session, &script.configured_turns, out).await?;

    writeln!(out, "\nHistórico do chat:")?;
    for turn in session.history().await {
        writeln!(out, "{}", describe_turn(&turn))?;
    }
    Ok(())
}

async fn send_turns<C, W>(session: &C, turns: &[ScriptedTurn], out: &mut W) -> Result<()>
where
    C: ConversationSession,
    W: Write,
{
    for turn in turns {
        let text = session.send_text(&turn.prompt).await?;
        writeln!(out, "{}", turn.label)?;
        writeln!(out, "{text}")?;
    }
    Ok(())
}

/// 交互循环：逐行转发输入，直到读到结束词。
///
/// 结束词本身不会被发送。输入在结束词之前耗尽视为错误，整个循环随之终止。
pub async fn interactive_loop<C, R, W>(
    session: &C,
    sentinel: &str,
    mut input: R,
    out: &mut W,
) -> Result<()>
where
    C: ConversationSession,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "\nIniciando loop de perguntas (digite '{sentinel}' para sair):")?;
    let mut prompt = read_prompt(&mut input, out).await?;
    while prompt != sentinel {
        let text = session.send_text(&prompt).await?;
        writeln!(out, "resposta: {text}")?;
        prompt = read_prompt(&mut input, out).await?;
    }
    tracing::debug!("sentinel received, leaving interactive loop");
    Ok(())
}

async fn read_prompt<R, W>(input: &mut R, out: &mut W) -> Result<String>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    write!(out, "{INPUT_PROMPT}")?;
    out.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Err(Error::Io {
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "EOF when reading a line"),
        });
    }
    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    Ok(trimmed.to_string())
}
