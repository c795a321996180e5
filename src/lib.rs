//! # actix-jwks-auth
//!
//! This crate verifies RSA-signed bearer tokens issued by an OAuth2 / OIDC
//! identity provider (such as Cloud Foundry UAA) for the `actix-web` framework,
//! using the provider's published JSON Web Key Set.
//!
//! Keys are fetched when the [`VerifyingClient`] is created and refreshed on
//! demand when a token names a key that is not cached yet. Concurrent requests
//! that hit the same missing key share one fetch.
//!
//! ## Example
//!
//! ```no_run
//! use actix_web::{web, App, HttpServer, HttpResponse};
//! use actix_jwks_auth::{Claims, VerifyingClient};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let client = VerifyingClient::new("https://login.sys.example.com", None)
//!         .await
//!         .expect("identity provider keys should be reachable");
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .app_data(web::Data::new(client.clone()))
//!             .route("/profile", web::get().to(get_profile))
//!     })
//!     .bind(("127.0.0.1", 8080))?
//!     .run()
//!     .await
//! }
//!
//! async fn get_profile(claims: Claims) -> HttpResponse {
//!     HttpResponse::Ok().json(claims)
//! }
//! ```

mod cache;
mod claims;
mod client;
mod error;
mod impls;
mod jwk;
mod singleflight;

#[cfg(test)]
mod testutil;

pub use cache::*;
pub use claims::*;
pub use client::*;
pub use error::*;
pub use jwk::*;
pub use singleflight::*;
