use anyhow::{Context, Result};
use clap::Parser;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use postpilot::config;
use postpilot::firestore::FirestoreClient;
use postpilot::gcs::GcsClient;
use postpilot::handlers;
use postpilot::openai::OpenAiClient;
use postpilot::scrape;
use postpilot::state::AppState;
use postpilot::vision::VisionClient;
use postpilot::wordpress::WordpressClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load(Some(&args.config))?;
    cfg.apply_env_overrides();

    let auth: Arc<dyn TokenProvider> = Arc::new(
        CustomServiceAccount::from_file(&cfg.google.credentials_path)
            .context("failed to load Google service account credentials")?,
    );
    let project = if cfg.google.project_id.trim().is_empty() {
        auth.project_id()
            .await
            .context("project id missing from both config and credentials")?
            .to_string()
    } else {
        cfg.google.project_id.clone()
    };

    let state = AppState {
        store: Arc::new(FirestoreClient::new(auth.clone(), project.clone())),
        media: Arc::new(GcsClient::new(auth.clone(), cfg.google.bucket.clone())),
        labeler: Arc::new(VisionClient::new(auth)),
        llm: Arc::new(OpenAiClient::new(
            cfg.openai.api_key.clone(),
            cfg.openai.model.clone(),
        )),
        publisher: Arc::new(WordpressClient::new()),
        http: reqwest::Client::builder()
            .user_agent("postpilot/0.1")
            .build()
            .context("failed to build http client")?,
        geo_base: Url::parse(scrape::GEO_API_BASE).expect("valid geolocation URL"),
        upload_daily_limit: cfg.app.upload_daily_limit,
    };

    let app = handlers::router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.app.bind_addr))?;
    info!(addr = %cfg.app.bind_addr, project = %project, "starting http server");
    axum::serve(listener, app).await?;

    Ok(())
}
