use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use server::AppState;
use server::handlers::http::utils::json_response::{HttpResponse, deliver_error_json, internal_error};
use server::handlers::http::{Router, build_router};
use server::logging::init_logging;
use shared::config::load_config;

#[derive(Debug, Parser)]
#[command(name = "myfb-server", about = "MyFacebook authentication service")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let _log_guard = init_logging(&config.logging)?;

    let addr = config.server.addr();
    let max_body_bytes = config.server.max_body_bytes;

    let state = AppState::from_config(config).await?;
    let router = Arc::new(build_router());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        let router = Arc::clone(&router);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                handle_request(req, peer, max_body_bytes, Arc::clone(&router), state.clone())
            });

            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, service)
                .await
            {
                warn!("Error serving connection from {}: {:?}", peer, err);
            }
        });
    }

    info!("Server stopped");
    Ok(())
}

/// Buffer the body under the configured cap, then hand off to the router.
/// Handler errors are logged and answered with a generic 500.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    peer: SocketAddr,
    max_body_bytes: usize,
    router: Arc<Router>,
    state: AppState,
) -> std::result::Result<HttpResponse, Infallible> {
    let (mut parts, body) = req.into_parts();
    parts.extensions.insert(peer);

    let body: Bytes = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Rejected body from {} on {}: {}", peer, parts.uri.path(), e);
            let (message, status) = if e.downcast_ref::<LengthLimitError>().is_some() {
                ("Request body too large", StatusCode::PAYLOAD_TOO_LARGE)
            } else {
                ("Malformed request body", StatusCode::BAD_REQUEST)
            };
            return Ok(deliver_error_json(message, status).unwrap_or_else(|_| internal_error()));
        }
    };

    let req = Request::from_parts(parts, body);
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match router.route(req, state).await {
        Ok(response) => Ok(response),
        Err(e) => {
            error!("{} {} failed: {:#}", method, path, e);
            Ok(internal_error())
        }
    }
}
