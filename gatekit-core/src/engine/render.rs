use crate::error::GateKitResult;

/// Turns a connection URI into a scannable payload for `get_config`.
///
/// The engine does not know the payload format. Hosts plug in an image
/// encoder (the CLI ships a base64 SVG QR renderer); tests plug in stubs.
pub trait ConnectionRenderer: Send + Sync {
    /// Renders `uri`.
    ///
    /// # Errors
    ///
    /// Implementations return [`GateKitError`](crate::GateKitError) when the
    /// URI cannot be encoded.
    fn render(&self, uri: &str) -> GateKitResult<String>;
}

/// Renderer that returns the URI unchanged. Useful for text-only hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainUriRenderer;

impl ConnectionRenderer for PlainUriRenderer {
    fn render(&self, uri: &str) -> GateKitResult<String> {
        Ok(uri.to_string())
    }
}
