use actix_web::error::InternalError;
use actix_web::http::{header, StatusCode};
use actix_web::{dev, http::header::Header, web, FromRequest, HttpRequest};
use actix_web::{HttpResponse, ResponseError};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures::future::{err, FutureExt, LocalBoxFuture};
use tracing::*;

use crate::{Claims, Error, VerifyingClient};

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_string())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            // The identity provider could not be reached or sent garbage.
            Error::KeySetError(_) => StatusCode::BAD_GATEWAY,

            // Every token failure, including an unknown `kid`, is an authentication failure.
            Error::VerificationError(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

impl FromRequest for Claims {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let Some(client) = req.app_data::<web::Data<VerifyingClient>>().cloned() else {
            error!("VerifyingClient is not registered as application data");
            return err(internal_token_verification_error()).boxed_local();
        };

        let bearer = match Authorization::<Bearer>::parse(req) {
            Ok(header) => header.into_scheme(),
            Err(_) => {
                // Per RFC 7235, a 401 Unauthorized response MUST be returned when the
                // Authorization header is missing, malformed, or uses an unsupported scheme.
                return err(missing_or_malformed_auth_header()).boxed_local();
            }
        };

        let token = bearer.token().to_string();

        async move {
            match client.verify(&token).await {
                Ok(claims) => Ok(claims),
                Err(Error::KeySetError(e)) => {
                    warn!(error = %e, "Key set unavailable during token verification");
                    Err(upstream_key_set_error())
                }
                Err(other) => {
                    debug!(error = %other, "Rejected bearer token");
                    Err(invalid_token_error(&other))
                }
            }
        }
        .boxed_local()
    }
}

fn internal_token_verification_error() -> actix_web::Error {
    let response =
        HttpResponse::InternalServerError().body("Internal error during token verification");

    InternalError::from_response("token_verification_failure", response).into()
}

fn upstream_key_set_error() -> actix_web::Error {
    let response =
        HttpResponse::BadGateway().body("Identity provider keys are currently unavailable");

    InternalError::from_response("key_set_unavailable", response).into()
}

fn missing_or_malformed_auth_header() -> actix_web::Error {
    unauthorized_with_www_authenticate(
        "invalid_request",
        "Authorization header missing or not using Bearer scheme",
        "Authorization header is missing or malformed",
    )
}

fn invalid_token_error(err: &Error) -> actix_web::Error {
    unauthorized_with_www_authenticate(
        "invalid_token",
        &err.to_string(),
        format!("Failed to verify bearer token: {err}"),
    )
}

/// Constructs a `401 Unauthorized` error carrying an RFC 6750 `WWW-Authenticate` header.
fn unauthorized_with_www_authenticate(
    www_error_code: &str,
    www_error_description: &str,
    body: impl Into<String>,
) -> actix_web::Error {
    let header_value = format!(
        r#"Bearer error="{}", error_description="{}""#,
        www_error_code,
        www_error_description.replace('"', "'")
    );

    let response = HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, header_value))
        .body(body.into());

    InternalError::from_response("auth_error", response).into()
}
