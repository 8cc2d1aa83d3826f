//! The client-side field level encryption seam.

use futures_core::future::BoxFuture;

use crate::{
    bson::{RawDocument, RawDocumentBuf},
    error::Result,
};

/// Transforms commands before they are sent and replies after they are received.
///
/// Key management and the encryption state machine live outside this crate. Errors returned from
/// either method are reported to the caller as
/// [`ErrorKind::Encryption`](crate::error::ErrorKind::Encryption).
pub trait Crypt: Send + Sync {
    /// Rewrites an assembled command addressed to `db`. The result is sent in its place.
    fn encrypt<'a>(
        &'a self,
        db: &'a str,
        command: &'a RawDocument,
    ) -> BoxFuture<'a, Result<RawDocumentBuf>>;

    /// Rewrites a reply before it is handed to the operation.
    fn decrypt<'a>(&'a self, reply: &'a RawDocument) -> BoxFuture<'a, Result<RawDocumentBuf>>;
}
