//! QR rendering for tracking URLs.
//!
//! Images always encode the tracking URL (never the destination) at error
//! correction level H, so printed codes tolerate logo overlay and wear.

use std::io::Cursor;

use anyhow::{anyhow, Result};
use qrcode::{Color, EcLevel, QrCode};

use qrwizard_core::model::ImageFormat;

/// Default output edge length in pixels.
pub const DEFAULT_SIZE_PX: u32 = 400;

/// Render `data` as a QR image in the requested format.
///
/// The format is already validated at the HTTP boundary; this returns the
/// encoded bytes.
pub fn render(data: &str, format: ImageFormat, size_px: u32) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|e| anyhow!("qr encode failed: {e}"))?;
    match format {
        ImageFormat::Png => render_png(&code, size_px),
        ImageFormat::Svg => Ok(render_svg(&code, size_px).into_bytes()),
    }
}

/// Rasterize at one pixel per module, then upsample with nearest-neighbor so
/// module edges stay razor sharp. Bilinear would anti-alias the edges and
/// hurt scanability.
fn render_png(code: &QrCode, size_px: u32) -> Result<Vec<u8>> {
    let n = code.width() as u32;
    let colors = code.to_colors();

    let modules = image::GrayImage::from_fn(n, n, |x, y| {
        match colors[(y * n + x) as usize] {
            Color::Dark => image::Luma([0u8]),
            Color::Light => image::Luma([255u8]),
        }
    });

    let scaled = image::imageops::resize(
        &modules,
        size_px,
        size_px,
        image::imageops::FilterType::Nearest,
    );

    let mut buf = Vec::new();
    image::DynamicImage::ImageLuma8(scaled)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| anyhow!("png encode failed: {e}"))?;
    Ok(buf)
}

/// Path-based SVG with a unit coordinate system: `viewBox="0 0 N N"` where N
/// is the module count, pixel width/height on the outer tag, and a solid
/// white rect backing the full viewBox. No unit suffixes anywhere — some
/// downstream renderers mis-handle them.
fn render_svg(code: &QrCode, size_px: u32) -> String {
    let n = code.width();
    let colors = code.to_colors();

    let mut path = String::new();
    for y in 0..n {
        for x in 0..n {
            if colors[y * n + x] == Color::Dark {
                path.push_str(&format!("M{x} {y}h1v1h-1z"));
            }
        }
    }

    format!(
        r#"<svg width="{size_px}" height="{size_px}" viewBox="0 0 {n} {n}" xmlns="http://www.w3.org/2000/svg"><rect width="{n}" height="{n}" fill="white"/><path d="{path}" fill="black"/></svg>"#
    )
}
