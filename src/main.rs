use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docbrief::{api, config, logging};
use docbrief::processing::{DocumentUpload, ProcessingApi, ProcessingService};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Summarize tender documents and answer questions against a reference corpus.
#[derive(Parser)]
#[command(name = "docbrief", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Summarize one document and print the result as JSON.
    Summarize {
        /// Document to summarize.
        file: PathBuf,
    },
    /// Answer a question from the configured corpus.
    Ask {
        /// Question to answer.
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let service = ProcessingService::from_config(config)
        .await
        .context("failed to initialize processing service")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(service).await,
        Command::Summarize { file } => summarize_file(&service, file).await,
        Command::Ask { question } => ask(&service, question).await,
    }
}

async fn serve(service: ProcessingService) -> Result<()> {
    tracing::info!(answering = service.has_corpus(), "Processing service ready");
    let app = api::create_router(Arc::new(service));
    let (listener, port) = bind_listener().await.context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}

async fn summarize_file(service: &ProcessingService, file: PathBuf) -> Result<()> {
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let result = match service.summarize(DocumentUpload { file_name, bytes }).await {
        Ok(outcome) => json!({
            "success": true,
            "job_id": outcome.job_id,
            "final_summary": outcome.final_summary,
            "page_summaries": outcome.page_summaries,
            "skipped_pages": outcome.skipped_pages,
            "summary_file": outcome.summary_file,
            "error": null,
        }),
        Err(error) => json!({ "success": false, "error": error.to_string() }),
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn ask(service: &ProcessingService, question: String) -> Result<()> {
    let outcome = service.answer(question).await?;
    println!("{}", outcome.answer);
    for (position, hit) in outcome.evidence.iter().enumerate() {
        println!("\n[{}] similarity {:.4}\n{}", position + 1, hit.score, hit.text);
    }
    Ok(())
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
