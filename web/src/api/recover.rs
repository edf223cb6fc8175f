use actix_web::{get, post, web, HttpResponse, Responder};

use crate::memory_store::InMemoryDownloader;
use crate::state::{AppState, REMOTE_DIR};
use crate::web_error::WebError;

/// Kicks off recovery against the demo object store's remote directory
/// and returns immediately; poll `/recover/state` for completion.
#[post("/recover")]
async fn post_recover(state: web::Data<AppState>) -> Result<impl Responder, WebError> {
    let downloader = InMemoryDownloader::new(state.store.clone(), REMOTE_DIR);
    let conn = state.conn.lock().await;
    state.recoverer.recover(&downloader, &conn).await?;
    Ok(HttpResponse::Accepted().json(state.recoverer.state()))
}

#[get("/recover/state")]
async fn get_recover_state(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.recoverer.state())
}
