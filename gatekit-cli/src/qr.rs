//! Scannable QR payload for `gatekit config`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use gatekit_core::{ConnectionRenderer, GateKitError, GateKitResult};
use qrcode::render::svg;
use qrcode::QrCode;

const MIN_DIMENSION: u32 = 256;

/// Renders the URI as an SVG QR code, base64 encoded so it can travel
/// inside a JSON response.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgQrRenderer;

impl ConnectionRenderer for SvgQrRenderer {
    fn render(&self, uri: &str) -> GateKitResult<String> {
        let code = QrCode::new(uri.as_bytes())
            .map_err(|err| GateKitError::Validation(format!("cannot encode uri as QR: {err}")))?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
            .build();
        Ok(STANDARD.encode(image))
    }
}
