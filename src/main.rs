use anyhow::{bail, Context};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crpt_client::config::{Config, LogFormat};
use crpt_client::{AppError, Document, SubmissionClient};

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load Config
    let config = Config::load()?;
    init_tracing(&config);

    let mut args = std::env::args().skip(1);
    let (document_path, signature_path) = match (args.next(), args.next()) {
        (Some(document), Some(signature)) => (document, signature),
        _ => bail!("usage: crpt-client <document.json> <signature-file>"),
    };

    let raw = tokio::fs::read(&document_path)
        .await
        .with_context(|| format!("reading document {}", document_path))?;
    let document: Document = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing document {}", document_path))?;
    let signature = tokio::fs::read_to_string(&signature_path)
        .await
        .with_context(|| format!("reading signature {}", signature_path))?;

    info!(
        "Submitting {} to {} (limit {} per {})",
        document.doc_id, config.api_url, config.request_limit, config.time_unit
    );

    let client = SubmissionClient::from_config(&config)?;

    // Ctrl-C while waiting for admission abandons the submission.
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let result = client
        .submit_with_cancel(&document, signature.trim(), cancel)
        .await;

    client.shutdown();
    client.wait_stopped().await;
    client.stats().log_stats();

    match result {
        Ok(response) => {
            info!("Document accepted with status {}", response.status);
            Ok(())
        }
        Err(AppError::AdmissionCancelled) => {
            info!("Interrupted before the document was sent.");
            Ok(())
        }
        Err(e) => {
            error!("Submission failed: {}", e);
            Err(e.into())
        }
    }
}
