mod config;
mod constants;
mod error;
mod routes;
mod transforms;

use axum::ServiceExt;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use clap::Parser;
use config::{Config, CorsMode};
use constants::CONNECT_TIMEOUT;
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePath;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

pub struct AppState {
    pub config: Config,
    pub http_client: Client,
}

#[derive(Parser)]
#[command(name = "kimi-proxy")]
#[command(about = "Reasoning-repair proxy for Kimi thinking models")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "KIMI_PROXY_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "KIMI_PROXY_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let host = args.host.unwrap_or_else(|| config.host.clone());
    let port = args.port.unwrap_or(config.port);

    // Shared HTTP client with connection pooling; streaming responses get no
    // overall deadline, so only connection establishment is bounded here
    let mut client_builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(10);
    if let Some(proxy_url) = &config.https_proxy {
        let proxy = reqwest::Proxy::all(proxy_url).expect("Invalid egress proxy URL");
        client_builder = client_builder.proxy(proxy);
    }
    let http_client = client_builder.build().expect("Failed to create HTTP client");

    // CORS configuration based on environment
    let cors_origins = config.cors_mode.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let Ok(origin_str) = origin.to_str() else {
                return false;
            };

            match &cors_origins {
                CorsMode::AllowAll => true,
                CorsMode::LocalhostOnly => {
                    let Ok(url) = url::Url::parse(origin_str) else {
                        return false;
                    };
                    matches!(
                        url.host_str(),
                        Some("localhost") | Some("127.0.0.1") | Some("::1")
                    )
                }
                CorsMode::AllowList(allowed) => allowed.iter().any(|a| a == origin_str),
            }
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-api-key"),
            header::HeaderName::from_static("anthropic-version"),
        ])
        .allow_credentials(true);

    match &config.cors_mode {
        CorsMode::AllowAll => info!("CORS: Allowing all origins"),
        CorsMode::LocalhostOnly => info!("CORS: Localhost only"),
        CorsMode::AllowList(list) => info!("CORS: Allowing origins: {:?}", list),
    }

    info!("Upstream: {} ({:?})", config.upstream_url, config.upstream_format);

    let state = Arc::new(AppState {
        config,
        http_client,
    });

    let api_routes = Router::new()
        .route("/chat/completions", post(routes::openai::chat_completions))
        .route("/models", get(routes::openai::list_models))
        .route("/messages", post(routes::anthropic::messages));

    let app = NormalizePath::trim_trailing_slash(
        Router::new()
            .route("/health", get(routes::health::health))
            .route("/version", get(routes::health::version))
            .nest("/v1", api_routes)
            .layer(cors)
            .with_state(state),
    );

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");
    info!(
        "Starting kimi-proxy v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind");
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .await
    .expect("Server error");
}
