//! API handlers module

pub mod billing;
pub mod health;
pub mod listings;
pub mod media;
pub mod reference;

use serde::Deserialize;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Cancellation scope of one request. The token fires when the handler
/// future is dropped, e.g. on client disconnect or request timeout.
pub(crate) fn request_scope() -> (CancellationToken, DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

/// `?lang=` query
#[derive(Debug, Default, Deserialize)]
pub struct LanguageQuery {
    pub lang: Option<String>,
}
