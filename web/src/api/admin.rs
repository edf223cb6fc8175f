use actix_web::{post, web, HttpResponse, Responder};

use crate::state::AppState;
use crate::web_error::WebError;

/// Replaces the local database with the snapshot in the request body.
/// Guarded by the empty-store gate (C9): refuses with 409 if any voucher
/// or token row already exists.
#[post("/admin/replace-state")]
async fn replace_state(state: web::Data<AppState>, body: web::Bytes) -> Result<impl Responder, WebError> {
    let blob = body.to_vec();
    let mut conn = state.conn.lock().await;

    recover::call_if_empty(&mut conn, move |c| {
        let blob = blob.clone();
        Box::pin(async move { sql::snapshot::recover(c, &blob).map_err(recover::RecoverError::from) })
    })
    .await?;

    Ok(HttpResponse::Ok().finish())
}
