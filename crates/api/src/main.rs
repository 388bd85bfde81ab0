use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use extract::{
    ExtractError, GroqClient, LevelStatus, LlmClient, OllamaClient, Pipeline, RiskBand, RunStatus,
};
use ingest::{FileReader, IngestError, Segmenter, SentenceSegmenter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod error;
mod metrics;
mod output;

use cache::{CacheStats, ResultCache};
use config::{AppConfig, LlmConfig, LlmProvider, LogFormat};
use error::ApiError;
use metrics::{Metrics, MetricsSnapshot, TimedOperation};

struct AppState {
    pipeline: Pipeline<dyn LlmClient>,
    segmenter: Box<dyn Segmenter>,
    cache: Option<ResultCache>,
    metrics: Arc<Metrics>,
    config: AppConfig,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    model: String,
}

#[derive(Deserialize)]
struct ExtractRequest {
    /// A `.txt`/`.md` file, or a directory of them
    path: String,
}

#[derive(Serialize)]
struct ExtractResponse {
    documents_processed: usize,
    documents: Vec<DocumentSummary>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DocumentOutcome {
    Complete,
    Degraded,
    Truncated,
    Rejected,
    /// Could not be read, extracted or written; the batch carries on
    Failed,
}

impl From<RunStatus> for DocumentOutcome {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Complete => DocumentOutcome::Complete,
            RunStatus::Degraded => DocumentOutcome::Degraded,
            RunStatus::Truncated => DocumentOutcome::Truncated,
        }
    }
}

#[derive(Debug, Serialize)]
struct DocumentSummary {
    source: String,
    status: DocumentOutcome,
    entities: usize,
    relations: usize,
    bankruptcy_level: Option<f64>,
    level_status: Option<LevelStatus>,
    risk_band: Option<RiskBand>,
    output_path: Option<PathBuf>,
    cached: bool,
    /// Set when the input was rejected or failed
    reason: Option<String>,
}

impl DocumentSummary {
    fn without_result(file: &Path, status: DocumentOutcome, reason: String) -> Self {
        Self {
            source: file.display().to_string(),
            status,
            entities: 0,
            relations: 0,
            bankruptcy_level: None,
            level_status: None,
            risk_band: None,
            output_path: None,
            cached: false,
            reason: Some(reason),
        }
    }
}

#[derive(Serialize)]
struct StatsResponse {
    metrics: MetricsSnapshot,
    cache: Option<CacheStats>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    info!(
        provider = ?config.llm.provider,
        model = config.llm.model(),
        output_dir = %config.output_dir.display(),
        max_chunk_tokens = config.pipeline.max_chunk_tokens,
        max_attempts = config.pipeline.max_attempts,
        "Starting narrative extractor"
    );

    let llm = build_llm(&config.llm, config.pipeline.call_timeout())?;
    let pipeline = Pipeline::new(llm, config.pipeline.clone())
        .context("Failed to build extraction pipeline")?;

    let state = Arc::new(AppState {
        pipeline,
        segmenter: Box::new(SentenceSegmenter),
        cache: config
            .cache
            .enabled
            .then(|| ResultCache::new(config.cache.max_entries)),
        metrics: Metrics::new(),
        config,
    });

    let bind_addr = state.config.bind_addr.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,extract=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_llm(llm: &LlmConfig, timeout: Duration) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match llm.provider {
        LlmProvider::Ollama => Arc::new(OllamaClient::new(
            llm.base_url().to_string(),
            llm.model().to_string(),
            timeout,
        )?),
        LlmProvider::Groq => Arc::new(GroqClient::new(
            llm.base_url().to_string(),
            llm.model().to_string(),
            llm.api_key.clone().unwrap_or_default(),
            llm.temperature,
            timeout,
        )?),
    };
    Ok(client)
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/extract", post(extract_documents))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.pipeline.model_name().to_string(),
    })
}

async fn extract_documents(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let result = run_request(&state, &req.path).await;
    state.metrics.record_request(result.is_ok());
    result.map(Json)
}

async fn run_request(state: &AppState, path: &str) -> Result<ExtractResponse, ApiError> {
    let path = PathBuf::from(path);

    let (root, files) = if path.is_dir() {
        (path.clone(), FileReader::list_directory(&path))
    } else if path.is_file() {
        if !FileReader::is_supported(&path) {
            return Err(ApiError::BadRequest(
                IngestError::UnsupportedFormat(path.clone()).to_string(),
            ));
        }
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        (root, vec![path.clone()])
    } else {
        return Err(ApiError::NotFound(path.display().to_string()));
    };

    if files.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "no .txt or .md files under {}",
            path.display()
        )));
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        let summary = match process_file(state, &root, file).await {
            Ok(summary) => summary,
            Err(e) => fail(state, file, e),
        };
        documents.push(summary);
    }

    Ok(ExtractResponse {
        documents_processed: documents.len(),
        documents,
    })
}

async fn process_file(
    state: &AppState,
    root: &Path,
    file: &Path,
) -> Result<DocumentSummary, ApiError> {
    let timer = TimedOperation::start();

    let document = ingest::load_document(file, state.segmenter.as_ref())
        .await
        .map_err(|e| match e {
            IngestError::UnsupportedFormat(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        })?;

    let model = state.pipeline.model_name();
    let cached = state
        .cache
        .as_ref()
        .and_then(|cache| cache.get(document.text(), model));
    let is_cached = cached.is_some();

    let result = match cached {
        Some(result) => {
            info!(source = %file.display(), "Using cached result");
            state.metrics.record_cache_hit();
            result
        }
        None => match state.pipeline.run(&document).await {
            Ok(result) => {
                state.metrics.record_document(timer.elapsed(), &result);
                if let Some(cache) = &state.cache {
                    cache.insert(document.text(), model, &result);
                }
                result
            }
            Err(ExtractError::InvalidInput(e)) if e.is_invalid_input() => {
                return Ok(reject(state, file, e).await);
            }
            Err(e) => return Err(ApiError::Internal(e.to_string())),
        },
    };

    let output_path =
        output::write_result(&state.config.output_dir, root, file, &result).await?;

    Ok(DocumentSummary {
        source: file.display().to_string(),
        status: result.metadata.status.into(),
        entities: result.entities.len(),
        relations: result.relations.len(),
        bankruptcy_level: result.bankruptcy_level.level,
        level_status: Some(result.bankruptcy_level.status),
        risk_band: Some(result.bankruptcy_level.band),
        output_path: Some(output_path),
        cached: is_cached,
        reason: None,
    })
}

async fn reject(state: &AppState, file: &Path, error: IngestError) -> DocumentSummary {
    warn!(source = %file.display(), error = %error, "Rejected input document");
    state.metrics.record_rejected();

    if state.config.remove_rejected_inputs {
        if let Err(e) = FileReader::remove_source(file).await {
            warn!(source = %file.display(), error = %e, "Failed to remove rejected input");
        }
    }

    DocumentSummary::without_result(file, DocumentOutcome::Rejected, error.to_string())
}

fn fail(state: &AppState, file: &Path, error: ApiError) -> DocumentSummary {
    warn!(source = %file.display(), error = %error, "Failed to process document");
    state.metrics.record_failed();
    DocumentSummary::without_result(file, DocumentOutcome::Failed, error.to_string())
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        metrics: state.metrics.snapshot(),
        cache: state.cache.as_ref().map(ResultCache::stats),
    })
}
