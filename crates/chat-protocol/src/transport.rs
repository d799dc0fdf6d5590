//! The REF-dialog transport trait lives here (rather than in `chat-core`,
//! which owns the client built on top of it) so that test-only
//! implementations in `chat-test-utils` don't need a dependency cycle back
//! through `chat-core`.

/// Anything that can carry one JSON envelope to the reference registry and
/// back. Implemented for a real pooled REQ socket in `chat-core`, and for
/// in-process fakes in `chat-test-utils`.
pub trait RefTransport: Send + Sync {
    fn request_text(&self, payload: Vec<u8>) -> impl std::future::Future<Output = Result<Vec<u8>, String>> + Send;
}
