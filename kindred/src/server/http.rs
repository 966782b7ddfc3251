//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one task per connection, hand-routed paths.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::images::ImageHost;
use crate::people::{PeopleService, PersonStore};
use crate::routes;
use crate::types::KindredError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub people: Arc<PeopleService>,
    pub jwt: JwtValidator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn PersonStore>,
        images: Option<Arc<dyn ImageHost>>,
    ) -> Result<Self, KindredError> {
        let jwt = match args.jwt_secret() {
            Some(secret) => JwtValidator::new(secret.to_string(), args.jwt_expiry_seconds)?,
            None if args.dev_mode => JwtValidator::new_dev(),
            None => {
                return Err(KindredError::Config(
                    "JWT_SECRET is required in production mode".into(),
                ))
            }
        };

        Ok(Self {
            args,
            people: Arc::new(PeopleService::new(store, images)),
            jwt,
            started_at: Instant::now(),
        })
    }
}

/// Bind the configured address and serve forever
pub async fn run(state: Arc<AppState>) -> Result<(), KindredError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Kindred listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - authentication disabled");
    }

    serve(listener, state).await
}

/// Serve connections from an already bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), KindredError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let response = match (method, segments.as_slice()) {
        (Method::GET, ["health"]) | (Method::GET, ["healthz"]) => {
            routes::health_check(Arc::clone(&state))
        }

        (Method::GET, ["relations"]) => routes::handle_relations(),

        (Method::GET, ["me"]) => routes::handle_me(req, Arc::clone(&state)).await,

        (Method::GET, ["people"]) => routes::handle_list_people(req, Arc::clone(&state)).await,
        (Method::POST, ["people"]) => routes::handle_create_person(req, Arc::clone(&state)).await,
        (Method::GET, ["people", id]) => {
            routes::handle_get_person(req, Arc::clone(&state), id).await
        }
        (Method::PUT, ["people", id]) => {
            routes::handle_update_person(req, Arc::clone(&state), id).await
        }
        (Method::DELETE, ["people", id]) => {
            routes::handle_delete_person(req, Arc::clone(&state), id).await
        }
        (Method::POST, ["people", id, "upload-profile-pic"]) => {
            routes::handle_upload_profile_pic(req, Arc::clone(&state), id).await
        }

        // CORS preflight
        (Method::OPTIONS, _) => preflight_response(state.args.cors_origin()),

        _ => not_found_response(&path),
    };

    Ok(with_cors(to_boxed(response), state.args.cors_origin()))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

fn with_cors(mut response: Response<BoxBody>, origin: &str) -> Response<BoxBody> {
    if let Ok(value) = HeaderValue::from_str(origin) {
        response
            .headers_mut()
            .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
            .or_insert(value);
    }
    response
}

/// CORS preflight response
fn preflight_response(origin: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", origin)
        .header("Access-Control-Allow-Headers", "Authorization, Content-Type")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "code": "NOT_FOUND",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
