//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Async work runs on a
//! tokio runtime created per command.

use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{AgentConfig, ModelClient, Orchestrator, PromptSet};
use crate::bridge::BridgeService;
use crate::cli::output::OutputFormat;
use crate::cli::parser::{Cli, Commands};
use crate::config::BridgeConfig;
use crate::core::extract_object;
use crate::error::{CommandError, Result};
use crate::rag::RagClient;

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or the command fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Run {
            relays,
            publish_relay,
            prefix,
        } => {
            let mut builder = BridgeConfig::builder();
            if !relays.is_empty() {
                builder = builder.relays(relays.iter().cloned());
            }
            if let Some(url) = publish_relay {
                builder = builder.publish_relay(url.as_str());
            }
            if let Some(prefix) = prefix {
                builder = builder.command_prefix(prefix.as_str());
            }
            let bridge_config = builder.from_env().build()?;
            cmd_run(bridge_config, &agent_config(cli)?)
        }
        Commands::Ask { question, rag_url } => {
            cmd_ask(question, rag_url, &agent_config(cli)?, format)
        }
        Commands::Optimize { question } => cmd_optimize(question, &agent_config(cli)?, format),
        Commands::Extract => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            cmd_extract(&input, format)
        }
        Commands::InitPrompts { dir } => cmd_init_prompts(dir, format),
    }
}

/// Resolves model configuration: CLI flags, then environment, then defaults.
fn agent_config(cli: &Cli) -> Result<AgentConfig> {
    let mut builder = AgentConfig::builder();
    if let Some(model) = &cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(url) = &cli.llm_url {
        builder = builder.base_url(url.as_str());
    }
    if let Some(dir) = &cli.prompt_dir {
        builder = builder.prompt_dir(dir.as_path());
    }
    Ok(builder.from_env().build()?)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}"))
    })
}

fn cmd_run(bridge_config: BridgeConfig, agent: &AgentConfig) -> Result<String> {
    let service = BridgeService::from_config(bridge_config, agent)
        .map_err(|e| CommandError::ExecutionFailed(format!("Bridge setup failed: {e}")))?;

    let rt = runtime()?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received, shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for interrupt"),
            }
            on_signal.cancel();
        });

        service
            .run(cancel)
            .await
            .map_err(|e| CommandError::ExecutionFailed(format!("Bridge failed: {e}")))
    })?;

    Ok(String::new())
}

fn cmd_ask(
    question: &str,
    rag_url: &str,
    agent: &AgentConfig,
    format: OutputFormat,
) -> Result<String> {
    let llm = ModelClient::from_config(agent)
        .map_err(|e| CommandError::ExecutionFailed(format!("Provider creation failed: {e}")))?;
    let orchestrator = Orchestrator::new(
        Arc::new(llm),
        Arc::new(RagClient::new(rag_url)),
        PromptSet::load(agent.prompt_dir.as_deref()),
    );

    let rt = runtime()?;
    let result = rt
        .block_on(orchestrator.run(question))
        .map_err(|e| CommandError::ExecutionFailed(format!("Query failed: {e}")))?;

    match format {
        OutputFormat::Text => {
            let mut output = result.answer.trim_end().to_string();
            let _ = write!(
                output,
                "\n\n---\nSearch query: {} | Knowledge: {} | Time: {:.1}s\n",
                result.search_query,
                if result.used_knowledge { "yes" } else { "none" },
                std::time::Duration::from_millis(
                    u64::try_from(result.elapsed_ms).unwrap_or(u64::MAX)
                )
                .as_secs_f64()
            );
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&result)?),
    }
}

fn cmd_optimize(question: &str, agent: &AgentConfig, format: OutputFormat) -> Result<String> {
    let llm = ModelClient::from_config(agent)
        .map_err(|e| CommandError::ExecutionFailed(format!("Provider creation failed: {e}")))?;
    let optimizer = crate::agent::QueryOptimizer::new(
        Arc::new(llm),
        Arc::new(PromptSet::load(agent.prompt_dir.as_deref())),
    );

    let rt = runtime()?;
    let query = rt.block_on(optimizer.optimize(question));

    match format {
        OutputFormat::Text => Ok(format!("{query}\n")),
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "question": question,
            "query": query,
            "optimized": query != question,
        }))?),
    }
}

/// Prints the object recovered from `input`, or `null`.
///
/// # Errors
///
/// Returns [`CommandError::Output`] if the result cannot be serialized.
pub fn cmd_extract(input: &str, format: OutputFormat) -> Result<String> {
    let value = extract_object(input).map_or(serde_json::Value::Null, serde_json::Value::Object);
    match format {
        OutputFormat::Text => Ok(format!("{}\n", serde_json::to_string(&value)?)),
        OutputFormat::Json => Ok(format.to_json(&value)?),
    }
}

fn cmd_init_prompts(dir: &Path, format: OutputFormat) -> Result<String> {
    let written = PromptSet::write_defaults(dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                dir.display()
            );
            for path in &written {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("unknown");
                let _ = writeln!(output, "  {name}");
            }
            output.push_str("\nSet BRIDGE_PROMPT_DIR to this directory to use them.\n");
            Ok(output)
        }
        OutputFormat::Json => Ok(format.to_json(&serde_json::json!({
            "directory": dir.to_string_lossy(),
            "written": written
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            "count": written.len(),
        }))?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_repairs_fenced_object() {
        let out = cmd_extract("```json\n{\"query\": unquotedWord}\n```", OutputFormat::Text)
            .unwrap_or_default();
        assert_eq!(out, "{\"query\":\"unquotedWord\"}\n");
    }

    #[test]
    fn test_extract_array_is_null() {
        let out = cmd_extract("[1,2,3]", OutputFormat::Text).unwrap_or_default();
        assert_eq!(out, "null\n");
    }

    #[test]
    fn test_init_prompts_reports_written_files() {
        let temp_dir = TempDir::new().unwrap_or_else(|_| unreachable!());
        let dir = temp_dir.path().join("prompts");
        let first = cmd_init_prompts(&dir, OutputFormat::Text).unwrap_or_default();
        assert!(first.contains("Wrote 2 prompt template(s)"));
        let second = cmd_init_prompts(&dir, OutputFormat::Json).unwrap_or_default();
        assert!(second.contains("\"count\": 0"));
    }
}
