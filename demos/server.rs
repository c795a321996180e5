//! Minimal Actix Web example demonstrating the [`Claims`] extractor.
//!
//! This server exposes two endpoints:
//! - `/protected`: Requires a valid bearer token and returns the verified identity.
//! - `/whoami`: Returns the identity if authenticated, or `"Anonymous"` otherwise.
//!
//! The identity provider is configured through `JWKS_BASE_URL` (required),
//! `JWKS_KEY_SET_PATH`, `JWKS_TIMEOUT_SECS` and `JWKS_SKIP_SSL_VALIDATION`.

use actix_jwks_auth::{Claims, KeySetConfig, VerifyingClient};
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = match KeySetConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    // Fetches the identity provider's key set before accepting requests
    let client = match VerifyingClient::with_config(config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to initialize VerifyingClient: {e}");
            std::process::exit(1);
        }
    };

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(client.clone()))
            .service(protected)
            .service(whoami)
    })
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}

// Protected route, requires a valid bearer token
#[get("/protected")]
async fn protected(claims: Claims) -> impl Responder {
    HttpResponse::Ok().json(claims)
}

// Returns the verified identity, or "Anonymous" if unauthenticated
#[get("/whoami")]
async fn whoami(claims: Option<Claims>) -> impl Responder {
    match claims {
        Some(c) => HttpResponse::Ok().json(c),
        None => HttpResponse::Ok().body("Anonymous"),
    }
}
