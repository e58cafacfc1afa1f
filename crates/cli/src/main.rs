use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prompthub_engine::{FlowError, FlowExecutor, validate_flow_document};
use prompthub_mcp::{BrokerConfig, McpHttpServer, build_executor, config, resolve_bind_address, serve_stdio};
use prompthub_types::{DocumentKind, VariableMap};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "prompthub", version, about = "Render prompt templates and run prompt flows from a Git repository")]
struct Cli {
    /// Serve documents from this directory instead of GitHub.
    #[arg(long, global = true, value_name = "DIR")]
    local: Option<PathBuf>,

    /// Configuration file (defaults to $PROMPTHUB_CONFIG_PATH or <config dir>/prompthub/config.json).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the MCP tools over stdio, or over streamable HTTP with --http.
    Serve {
        /// Loopback address for HTTP; without a value the configured address is used.
        #[arg(long, value_name = "ADDR")]
        http: Option<Option<String>>,
    },
    /// Execute a stored flow, or a flow document read from --file.
    Run {
        /// Stored flow name.
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        flow: Option<String>,
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Initial variable as key=value; repeatable.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_variable)]
        variables: Vec<(String, String)>,
        #[arg(long = "ref", value_name = "REF")]
        reference: Option<String>,
    },
    /// Validate a flow document file without running it.
    Validate { path: PathBuf },
    /// List template names.
    Templates {
        #[arg(long = "ref", value_name = "REF")]
        reference: Option<String>,
    },
    /// Render one template.
    Render {
        template: String,
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_variable)]
        variables: Vec<(String, String)>,
        #[arg(long = "ref", value_name = "REF")]
        reference: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", serde_json::to_string_pretty(&error_payload(&error)).unwrap_or_else(|_| error.to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays clean for JSON output and the stdio transport.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::Validate { path } = &cli.command {
        return validate_file(path);
    }

    let broker_config = load_broker_config(&cli)?;
    let executor = build_executor(&broker_config)?;

    let outcome = match cli.command {
        Command::Serve { http } => serve(executor, &broker_config, http).await,
        Command::Run {
            flow,
            file,
            variables,
            reference,
        } => {
            let variables = variable_map(variables);
            let cancellation = cancel_on_ctrl_c();
            let execution = match (flow, file) {
                (_, Some(file)) => {
                    let document = read_json_file(&file)?;
                    executor
                        .execute_flow_with_cancellation(&document, &variables, reference.as_deref(), &cancellation)
                        .await?
                }
                (Some(flow), None) => {
                    executor
                        .execute_named_flow(&flow, &variables, reference.as_deref(), &cancellation)
                        .await?
                }
                (None, None) => anyhow::bail!("provide a flow name or --file"),
            };
            print_json(&execution)
        }
        Command::Templates { reference } => {
            let reference = executor.config().resolve_ref(reference.as_deref());
            let names = executor.documents().list_documents(DocumentKind::Template, reference).await?;
            print_json(&names)
        }
        Command::Render {
            template,
            variables,
            reference,
        } => {
            let rendered = executor
                .render_named_template(&template, &variable_map(variables), reference.as_deref())
                .await?;
            print_json(&rendered)
        }
        Command::Validate { .. } => Ok(()),
    };
    outcome.map(|()| ExitCode::SUCCESS)
}

/// Prints the validation report; an invalid document exits with failure.
fn validate_file(path: &Path) -> Result<ExitCode> {
    let report = validate_flow_document(&read_json_file(path)?);
    print_json(&report)?;
    Ok(if report.valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn load_broker_config(cli: &Cli) -> Result<BrokerConfig> {
    let path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let local = cli.local.clone();
    let loaded = config::load_config_with(&path, |broker_config| {
        if let Some(local) = local {
            broker_config.local_root = Some(local);
        }
    })
    .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    Ok(loaded)
}

async fn serve(executor: std::sync::Arc<FlowExecutor>, broker_config: &BrokerConfig, http: Option<Option<String>>) -> Result<()> {
    let Some(address) = http else {
        let shutdown = CancellationToken::new();
        return tokio::select! {
            result = serve_stdio(executor, shutdown.clone()) => result,
            _ = tokio::signal::ctrl_c() => {
                shutdown.cancel();
                Ok(())
            }
        };
    };

    let address = address.unwrap_or_else(|| broker_config.http_server.bind_address.clone());
    let bind_address = resolve_bind_address(&address)?;
    let running = McpHttpServer::new(bind_address, executor).start().await?;
    info!(address = %running.bound_address(), "press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("shutting down");
    running.stop().await
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested; stopping after the current node");
            trigger.cancel();
        }
    });
    token
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("variable name is empty in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn variable_map(pairs: Vec<(String, String)>) -> VariableMap {
    pairs.into_iter().map(|(key, value)| (key, Value::String(value))).collect()
}

fn read_json_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Engine failures print their structured payload; anything else is wrapped.
fn error_payload(error: &anyhow::Error) -> Value {
    match error.downcast_ref::<FlowError>() {
        Some(flow_error) => json!({ "error": flow_error.to_payload() }),
        None => json!({
            "error": {
                "code": "INTERNAL_ERROR",
                "message": format!("{error:#}"),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prompthub_types::{ErrorCode, FailedAt};

    const VALID_FLOW: &str = r#"{
        "metadata": { "version": "1.0.0", "exportedAt": "2024-06-01T08:00:00Z", "count": 1 },
        "flows": [{
            "id": "flow-1",
            "name": "Daily",
            "version": "1.0.0",
            "nodes": [{ "id": "draft", "type": "template", "data": { "selectedTemplateId": "Draft", "variables": ["topic"] } }],
            "edges": []
        }]
    }"#;

    #[test]
    fn parses_key_value_variables() {
        assert_eq!(parse_variable("topic=Rust = fun"), Ok(("topic".to_string(), "Rust = fun".to_string())));
        assert_eq!(parse_variable("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_variable("novalue").is_err());
        assert!(parse_variable("=value").is_err());
    }

    #[test]
    fn run_requires_exactly_one_flow_source() {
        let cli = Cli::try_parse_from(["prompthub", "run", "daily", "--var", "topic=rust", "--ref", "dev"]).expect("parse");
        assert!(matches!(cli.command, Command::Run { flow: Some(ref flow), ref variables, .. } if flow == "daily" && variables.len() == 1));

        assert!(Cli::try_parse_from(["prompthub", "run"]).is_err());
        assert!(Cli::try_parse_from(["prompthub", "run", "daily", "--file", "flow.json"]).is_err());
    }

    #[test]
    fn serve_http_address_is_optional() {
        let stdio = Cli::try_parse_from(["prompthub", "serve"]).expect("parse");
        assert!(matches!(stdio.command, Command::Serve { http: None }));

        let default_http = Cli::try_parse_from(["prompthub", "serve", "--http"]).expect("parse");
        assert!(matches!(default_http.command, Command::Serve { http: Some(None) }));

        let explicit = Cli::try_parse_from(["prompthub", "--local", "./prompts", "serve", "--http", "127.0.0.1:9000"]).expect("parse");
        assert_eq!(explicit.local.as_deref(), Some(Path::new("./prompts")));
        assert!(matches!(explicit.command, Command::Serve { http: Some(Some(ref address)) } if address == "127.0.0.1:9000"));
    }

    #[test]
    fn flow_errors_print_their_structured_payload() {
        let flow_error = FlowError::execution("Node \"Draft\" failed: boom", Vec::new(), FailedAt::flow_level("boom"));
        let payload = error_payload(&anyhow::Error::new(flow_error));
        assert_eq!(payload["error"]["code"], ErrorCode::ExecutionError.as_str());
        assert_eq!(payload["error"]["partialResults"], json!([]));

        let other = error_payload(&anyhow::anyhow!("disk on fire"));
        assert_eq!(other["error"]["code"], "INTERNAL_ERROR");
    }

    #[test]
    fn validate_reads_documents_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("flow.json");
        std::fs::write(&path, r#"{ "metadata": { "version": "1.0.0", "count": 0 }, "flows": [] }"#).expect("write flow");

        let document = read_json_file(&path).expect("read");
        assert!(!validate_flow_document(&document).valid);
        assert!(read_json_file(&temp.path().join("absent.json")).is_err());
    }

    #[test]
    fn invalid_flow_files_exit_with_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let invalid = temp.path().join("invalid.json");
        std::fs::write(&invalid, r#"{ "metadata": { "version": "1.0.0", "count": 0 }, "flows": [] }"#).expect("write flow");
        assert_eq!(validate_file(&invalid).expect("report"), ExitCode::FAILURE);

        let valid = temp.path().join("valid.json");
        std::fs::write(&valid, VALID_FLOW).expect("write flow");
        assert_eq!(validate_file(&valid).expect("report"), ExitCode::SUCCESS);
    }
}
