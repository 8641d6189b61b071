mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::{Backend, Config};
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::files::store::{MemoryMetadataStore, MetadataStore, PgMetadataStore};
use crate::features::files::{routes as files_routes, FileService};
use crate::features::health;
use crate::modules::storage::{BlobStore, MemoryBlobStore, MinIOClient};
use axum::{middleware::from_fn, Router};
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("Tokio runtime started with {} worker threads", worker_threads);

    let metadata_store: Arc<dyn MetadataStore> = match config.metadata.metadata_backend {
        Backend::External => {
            let pool = database::create_pool(&config.database).await?;
            tracing::info!("Database connection established");

            tracing::info!("Running database migrations...");
            database::run_migrations(&pool).await?;
            tracing::info!("Database migrations completed successfully");

            let store = PgMetadataStore::new(pool, &config.metadata);
            store
                .verify_schema()
                .await
                .map_err(|e| anyhow::anyhow!("Metadata schema check failed: {}", e))?;
            Arc::new(store)
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory metadata store; records are lost on restart");
            Arc::new(MemoryMetadataStore::new(&config.metadata))
        }
    };

    let presigned_url_expiry_secs = config.storage.presigned_url_expiry_secs;
    let blob_store: Arc<dyn BlobStore> = match config.metadata.blob_backend {
        Backend::External => {
            let client = MinIOClient::new(config.storage.clone())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize MinIO client: {}", e))?;
            tracing::info!("MinIO bucket ready: {}", client.bucket_name());
            Arc::new(client)
        }
        Backend::Memory => {
            tracing::warn!("Using in-memory blob store; file contents are lost on restart");
            Arc::new(MemoryBlobStore::new(config.storage.bucket.clone()))
        }
    };

    let file_service = Arc::new(FileService::new(
        metadata_store,
        blob_store,
        config.metadata.clone(),
        presigned_url_expiry_secs,
    ));

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    // Build swagger router
    let swagger = if let Some(credentials) = config.swagger.credentials() {
        tracing::info!("Swagger UI basic auth enabled");
        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
            .layer(from_fn(middleware::basic_auth_middleware(Arc::new(
                credentials,
            ))))
    } else {
        tracing::info!("Swagger UI basic auth disabled (no credentials configured)");
        Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
    };

    let app = Router::new()
        .merge(swagger)
        .merge(files_routes(
            file_service,
            config.app.max_request_body_size,
        ))
        .merge(health::routes())
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nodelay(true)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
