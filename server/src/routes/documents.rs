//! Document endpoint routes.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tally_engine::{RemoteDocument, WriteRequest};

use crate::error::Result;
use crate::handlers::{handle_get, handle_put};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/documents/{collection}/{id}",
        get(get_handler).put(put_handler),
    )
}

/// GET /documents/{collection}/{id} - Fetch a counter document.
async fn get_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<RemoteDocument>> {
    let document = handle_get(state.repo.as_ref(), &collection, &id).await?;
    Ok(Json(document))
}

/// PUT /documents/{collection}/{id} - Write a counter document.
async fn put_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(request): Json<WriteRequest>,
) -> Result<Json<RemoteDocument>> {
    let document = handle_put(state.repo.as_ref(), &collection, &id, request).await?;
    Ok(Json(document))
}
