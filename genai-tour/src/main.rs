//! `genai-tour` entry point.
//!
//! Walks through the Gemini API with the credential found in the
//! environment, then keeps chatting on stdin until the sentinel word.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use genai_tour::runner::{self, Script, DEFAULT_MODEL, DEFAULT_SENTINEL};
use genai_tour::{Client, ClientBuilder};

#[derive(Debug, Parser)]
#[command(name = "genai-tour", version, about = "Guided tour of the Gemini API")]
struct Cli {
    /// Model used for generation and both chat sessions.
    #[arg(long, env = "GENAI_TOUR_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Word that ends the interactive loop.
    #[arg(long, default_value = DEFAULT_SENTINEL)]
    sentinel: String,

    /// Request timeout in seconds.
    #[arg(long, env = "GENAI_TOUR_TIMEOUT")]
    timeout: Option<u64>,

    /// Proxy for every API request.
    #[arg(long, env = "GENAI_TOUR_PROXY")]
    proxy: Option<String>,

    /// Extra request header, as NAME=VALUE. Repeatable.
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Increase diagnostic output (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors on stderr.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn configure(&self, mut builder: ClientBuilder) -> ClientBuilder {
        if let Some(secs) = self.timeout {
            builder = builder.timeout(secs);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder
    }

    fn connect(&self) -> genai_tour::Result<Client> {
        self.configure(ClientBuilder::from_env()?).build()
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,genai_tour=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let script = Script {
        model: cli.model.clone(),
        sentinel: cli.sentinel.clone(),
        ..Script::default()
    };

    let input = BufReader::new(tokio::io::stdin());
    let mut out = io::stdout();
    match runner::run_session(|| cli.connect(), &script, input, &mut out).await {
        Ok(report) => {
            tracing::info!(
                attempted = report.attempted.len(),
                failed = report.failures.len(),
                "tour finished"
            );
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}
