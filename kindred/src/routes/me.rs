//! GET /me: the person named by the bearer token
//!
//! Requires a token even in dev mode.

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use super::{authenticate, respond, FullBody};
use crate::server::AppState;

pub async fn handle_me(req: Request<Incoming>, state: Arc<AppState>) -> Response<FullBody> {
    let result = async {
        let id = authenticate(req.headers(), &state).await?;
        state.people.get(&id).await
    }
    .await;
    respond(StatusCode::OK, result)
}
