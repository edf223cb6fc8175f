use actix_web::{get, HttpResponse, Responder};
use serde::Serialize;

#[derive(Serialize)]
struct PriceView {
    tokens: u32,
}

/// Stub price calculator: a constant value, wired only to show the core
/// sitting behind a realistic caller.
#[get("/price")]
async fn get_price() -> impl Responder {
    HttpResponse::Ok().json(PriceView { tokens: 100 })
}
