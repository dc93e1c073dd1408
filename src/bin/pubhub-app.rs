use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use clap::Parser;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use pubhub::app::queue::InProcessQueue;
use pubhub::app::runner::BookRunner;
use pubhub::config::{AppConfig, LlmConfig};
use pubhub::content::BookWriter;
use pubhub::credentials::CredentialStore;
use pubhub::epub::{self, EpubOptions};
use pubhub::llm::{LlmEngine, build_client};
use pubhub::markdown::book_markdown;
use pubhub::model::{HeatLevel, Perspective};
use pubhub::outline::OutlineRequest;
use pubhub::scheduler::AutoPublisher;
use pubhub::site::WORDPRESS_TIMEOUT;
use pubhub::store::{BookStore, LocalFsStore, PersonaStore, PublishingStore};
use pubhub::wordpress::WordPressClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// YAML settings file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    max_concurrency: Option<usize>,

    #[arg(long, value_enum)]
    engine: Option<LlmEngine>,
}

#[derive(Clone)]
struct AppState {
    store: Arc<LocalFsStore>,
    writer: BookWriter,
    queue: InProcessQueue,
    runner: Arc<BookRunner>,
    publisher: Option<Arc<AutoPublisher>>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    pubhub::logging::init()?;

    let args = AppArgs::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(max_concurrency) = args.max_concurrency {
        config.max_concurrency = max_concurrency;
    }
    if let Some(engine) = args.engine {
        config.engine = engine;
    }
    config.validate()?;
    tracing::info!(addr = %args.addr, ?config, "starting pubhub-app");

    let llm_config = LlmConfig::from_env()?;
    let store = Arc::new(LocalFsStore::new(&config.data_dir));
    let writer = BookWriter::from_engine(config.engine, &llm_config)?;
    let runner = Arc::new(BookRunner::new(store.clone(), writer.clone()));

    let publisher = match config.engine {
        LlmEngine::Noop => {
            tracing::warn!("engine is noop; auto-publisher disabled");
            None
        }
        engine => Some(Arc::new(AutoPublisher::new(
            store.clone(),
            CredentialStore::new(&config.data_dir),
            build_client(engine, &llm_config)?,
            Arc::new(WordPressClient::new(WORDPRESS_TIMEOUT)?),
        ))),
    };
    if let Some(publisher) = &publisher {
        let publisher = Arc::clone(publisher);
        let period = config.poll_interval();
        tokio::spawn(publisher.run(period, shutdown_signal()));
    }

    let state = AppState {
        store,
        writer,
        queue: InProcessQueue::new(config.max_concurrency),
        runner,
        publisher,
    };

    let app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/books", get(list_books).post(create_book))
        .route("/books/:id", get(get_book))
        .route("/books/:id/generate", post(generate_book))
        .route("/books/:id/book.epub", get(download_book_epub))
        .route("/books/:id/book.md", get(download_book_md))
        .route("/schedules", get(list_schedules))
        .route("/schedules/:id/articles", get(list_articles))
        .route("/scheduler/tick", post(tick))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("bind {}", args.addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "listen for ctrl-c");
    }
}

type ApiError = (StatusCode, String);

fn internal(err: anyhow::Error) -> ApiError {
    tracing::error!(?err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

fn not_found(what: &str, id: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{what} not found: {id}"))
}

fn valid_id(id: &str) -> Result<(), ApiError> {
    pubhub::store::validate_record_id(id).map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))
}

#[derive(Debug, Deserialize)]
struct CreateBookRequest {
    #[serde(default)]
    title: Option<String>,
    description: String,
    genre: String,
    #[serde(default)]
    sub_genre: Option<String>,
    #[serde(default)]
    tone: Option<String>,
    #[serde(default)]
    heat_level: Option<HeatLevel>,
    #[serde(default)]
    perspective: Option<Perspective>,
    #[serde(default)]
    chapter_count: Option<usize>,
    #[serde(default)]
    persona_id: Option<String>,
}

async fn create_book(
    State(state): State<AppState>,
    Json(req): Json<CreateBookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.description.trim().is_empty() || req.genre.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "description and genre are required".to_owned(),
        ));
    }
    let persona = match &req.persona_id {
        Some(id) => {
            valid_id(id)?;
            Some(
                state
                    .store
                    .get_persona(id)
                    .await
                    .map_err(internal)?
                    .ok_or_else(|| not_found("persona", id))?,
            )
        }
        None => None,
    };

    let request = OutlineRequest {
        title: req.title.filter(|t| !t.trim().is_empty()),
        description: req.description,
        genre: req.genre,
        sub_genre: req.sub_genre,
        tone: req.tone.unwrap_or_else(|| "engaging".to_owned()),
        heat_level: req.heat_level,
        perspective: req.perspective,
        chapter_count: req.chapter_count.unwrap_or(10),
        persona,
    };
    if request.chapter_count == 0 || request.chapter_count > pubhub::outline::MAX_CHAPTERS {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "chapter_count must be between 1 and {}",
                pubhub::outline::MAX_CHAPTERS
            ),
        ));
    }

    let book = state.writer.outline(&request).await.map_err(internal)?;
    state.store.put_book(&book).await.map_err(internal)?;
    Ok((StatusCode::CREATED, Json(book)))
}

async fn list_books(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let books = state.store.list_books().await.map_err(internal)?;
    Ok(Json(books))
}

async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    valid_id(&id)?;
    let book = state
        .store
        .get_book(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("book", &id))?;
    Ok(Json(book))
}

async fn generate_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    valid_id(&id)?;
    if state.store.get_book(&id).await.map_err(internal)?.is_none() {
        return Err(not_found("book", &id));
    }
    // A persisted `generating` status without a live claim is left over from
    // an interrupted process, so only the claim decides.
    let Some(claim) = state.runner.try_claim(&id) else {
        return Err((
            StatusCode::CONFLICT,
            format!("book {id} is already generating"),
        ));
    };

    state.queue.spawn(claim.run());
    tracing::info!(book_id = %id, "book generation queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "book_id": id })),
    ))
}

async fn download_book_md(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    valid_id(&id)?;
    let book = state
        .store
        .get_book(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("book", &id))?;

    let mut resp = Response::new(axum::body::Body::from(book_markdown(&book)));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/markdown; charset=utf-8"),
    );
    Ok(resp)
}

async fn download_book_epub(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    valid_id(&id)?;
    let book = state
        .store
        .get_book(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found("book", &id))?;
    if book.chapters.is_empty() {
        return Err((StatusCode::CONFLICT, format!("book {id} has no chapters")));
    }

    let bytes = epub::export_to_bytes(&book, &EpubOptions::default()).map_err(internal)?;
    let mut resp = Response::new(axum::body::Body::from(bytes));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/epub+zip"),
    );
    resp.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"pubhub-{id}.epub\""))
            .map_err(|err| internal(err.into()))?,
    );
    Ok(resp)
}

async fn list_schedules(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let schedules = state.store.list_schedules().await.map_err(internal)?;
    Ok(Json(schedules))
}

async fn list_articles(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    valid_id(&id)?;
    if state.store.get_schedule(&id).await.map_err(internal)?.is_none() {
        return Err(not_found("schedule", &id));
    }
    let articles = state.store.list_articles(&id).await.map_err(internal)?;
    Ok(Json(articles))
}

async fn tick(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let Some(publisher) = &state.publisher else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "auto-publisher is disabled (noop engine)".to_owned(),
        ));
    };
    let report = publisher.tick().await.map_err(internal)?;
    Ok(Json(report))
}
