use crate::api::models::ErrorResponse;
use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Open/closed flag of the server. Once closed, new requests are turned away while
/// in-flight ones finish.
#[derive(Debug, Default)]
pub struct Lifecycle {
    closed: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Lifecycle::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub async fn reject_when_closed(State(lifecycle): State<Arc<Lifecycle>>, req: Request, next: Next) -> Response {
    if lifecycle.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Server is shutting down".to_string(),
                kind: "UNAVAILABLE".to_string(),
            }),
        )
            .into_response();
    }
    next.run(req).await
}
