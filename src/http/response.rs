//! Response helpers.
//!
//! A handler that gives up after cancellation returns [`abandoned()`]. The
//! connection layer recognises the [`Abandoned`] marker and fails the request
//! with [`RequestAbandoned`] instead of writing anything, so the client sees
//! the connection close with no response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Response extension marking a request whose handler abandoned its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

/// Service error raised for abandoned requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request abandoned after cancellation")]
pub struct RequestAbandoned;

/// Placeholder response for a canceled handler. Never reaches the client
/// when served through the server's connection loop.
pub fn abandoned() -> Response {
    let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
    response.extensions_mut().insert(Abandoned);
    response
}

/// Whether `response` carries the [`Abandoned`] marker.
pub fn is_abandoned(response: &Response) -> bool {
    response.extensions().get::<Abandoned>().is_some()
}

/// Whether `err`, or any error in its source chain, is [`RequestAbandoned`].
pub fn caused_by_abandon(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<RequestAbandoned>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("connection error")]
    struct Wrapper(#[source] RequestAbandoned);

    #[test]
    fn abandoned_response_is_marked() {
        assert!(is_abandoned(&abandoned()));
        assert!(!is_abandoned(&StatusCode::OK.into_response()));
    }

    #[test]
    fn finds_abandon_in_source_chain() {
        let wrapped = Wrapper(RequestAbandoned);
        assert!(caused_by_abandon(&wrapped));
        assert!(caused_by_abandon(&RequestAbandoned));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "reset");
        assert!(!caused_by_abandon(&other));
    }
}
