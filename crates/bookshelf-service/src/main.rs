mod pages;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use bookshelf_api::{BookDraft, BookId, BookshelfApi, StoreError, API_CONTRACT_VERSION};
use bookshelf_core::RecordStore;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "bookshelf-service";

#[derive(Debug)]
struct ServiceState<S> {
    api: BookshelfApi<S>,
}

impl<S> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self { api: self.api.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    api_contract_version: &'static str,
}

/// `Name`, `Author` and `Year` as sent in the query string or an urlencoded
/// body.
#[derive(Debug, Clone, Default, Deserialize)]
struct BookForm {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Author", default)]
    author: Option<String>,
    #[serde(rename = "Year", default)]
    year: Option<String>,
}

impl BookForm {
    /// Body values win; the query string fills in whatever the body lacks.
    fn merge(query: Self, body: Option<Form<Self>>) -> Self {
        match body {
            Some(Form(body)) => Self {
                name: body.name.or(query.name),
                author: body.author.or(query.author),
                year: body.year.or(query.year),
            },
            None => query,
        }
    }

    /// Missing `Name` or `Author` read as empty text.
    fn into_draft(self) -> Result<BookDraft, ServiceError> {
        let raw_year = self.year.unwrap_or_default();
        let year = raw_year.parse::<i64>().map_err(|_| {
            ServiceError::bad_request(format!("Year must be an integer, got {raw_year:?}"))
        })?;
        Ok(BookDraft {
            name: self.name.unwrap_or_default(),
            author: self.author.unwrap_or_default(),
            year,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "bookshelf-service")]
#[command(about = "HTTP service for the bookshelf data file")]
struct Args {
    #[arg(long, default_value = "./books.csv")]
    data: PathBuf,
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(Debug)]
struct ServiceError {
    status: StatusCode,
    title: &'static str,
    detail: String,
}

impl ServiceError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, title: "Bad request", detail: detail.into() }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        error!(kind = err.kind().as_str(), error = %err, "store operation failed");
        let title = match err {
            StoreError::Parse(_) => "Stored data is malformed",
            StoreError::Read(_) | StoreError::Write(_) => "Storage failure",
            StoreError::IdSpaceExhausted { .. } => "No Id left for a new book",
        };
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, title, detail: err.to_string() }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (self.status, pages::error(self.title, &self.detail)).into_response()
    }
}

fn parse_book_id(raw: &str) -> Result<BookId, ServiceError> {
    raw.parse::<BookId>().map_err(|_| {
        ServiceError::bad_request(format!("Id must be a non-negative integer, got {raw:?}"))
    })
}

fn not_found(id: BookId) -> Response {
    info!(%id, "book not found");
    (StatusCode::NOT_FOUND, pages::book_not_found()).into_response()
}

fn app<S: RecordStore + 'static>(state: ServiceState<S>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/books/", get(books::<S>))
        .route("/books/create/", get(create_book::<S>).post(create_book::<S>))
        .route("/books/:id/", get(book_info::<S>))
        .route("/books/update/:id", get(update_book::<S>).post(update_book::<S>))
        .route("/books/delete/:id", get(delete_book::<S>).post(delete_book::<S>))
        .with_state(state)
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log);

    let state = ServiceState { api: BookshelfApi::open(args.data.clone()) };
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        data = %args.data.display(),
        "bookshelf service listening"
    );

    axum::serve(listener, app(state)).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn home() -> Html<String> {
    pages::home()
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        api_contract_version: API_CONTRACT_VERSION,
    })
}

async fn books<S: RecordStore + 'static>(
    State(state): State<ServiceState<S>>,
) -> Result<Html<String>, ServiceError> {
    let books = state.api.list()?;
    Ok(pages::book_list(&books))
}

async fn book_info<S: RecordStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path(raw_id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_book_id(&raw_id)?;
    match state.api.get(id)? {
        Some(book) => Ok(pages::book_info(&book).into_response()),
        None => Ok(not_found(id)),
    }
}

async fn create_book<S: RecordStore + 'static>(
    State(state): State<ServiceState<S>>,
    Query(query): Query<BookForm>,
    body: Option<Form<BookForm>>,
) -> Result<Html<String>, ServiceError> {
    let draft = BookForm::merge(query, body).into_draft()?;
    let book = state.api.create(draft)?;
    Ok(pages::book_created(&book))
}

async fn update_book<S: RecordStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path(raw_id): Path<String>,
    Query(query): Query<BookForm>,
    body: Option<Form<BookForm>>,
) -> Result<Response, ServiceError> {
    let id = parse_book_id(&raw_id)?;
    let draft = BookForm::merge(query, body).into_draft()?;
    match state.api.update(id, draft)? {
        0 => Ok(not_found(id)),
        replaced => Ok(pages::book_updated(replaced).into_response()),
    }
}

async fn delete_book<S: RecordStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path(raw_id): Path<String>,
) -> Result<Response, ServiceError> {
    let id = parse_book_id(&raw_id)?;
    match state.api.delete(id)? {
        Some(book) => Ok(pages::book_deleted(&book).into_response()),
        None => Ok(not_found(id)),
    }
}
