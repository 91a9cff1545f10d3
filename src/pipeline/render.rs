//! PDF rasterisation: render the first page of a document via pdfium.
//!
//! Entrants sometimes submit a poster as a PDF instead of an image. Only the
//! first page is shown in the gallery, so only the first page is rendered,
//! at one pixel per PDF point unless a scale is configured, with no alpha.
//!
//! pdfium is a blocking C++ library; callers run this inside
//! `tokio::task::spawn_blocking`.

use crate::error::ConvertError;
use image::DynamicImage;
use pdfium_bootstrap::Bootstrap;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Rasterise page 1 of the PDF at `pdf_path`.
///
/// Fails with [`ConvertError::EmptyDocument`] when the document opens but
/// has zero pages.
pub fn render_first_page(
    pdf_path: &Path,
    scale: f32,
    engine: &Bootstrap,
) -> Result<DynamicImage, ConvertError> {
    let pdfium = engine
        .bind()
        .map_err(|e| ConvertError::EngineUnavailable(e.to_string()))?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ConvertError::OpenDocument(format!("{:?}", e)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(ConvertError::EmptyDocument);
    }
    info!("PDF loaded: {} pages, rendering page 1", total_pages);

    let page = pages
        .get(0)
        .map_err(|e| ConvertError::Render(format!("{:?}", e)))?;

    let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ConvertError::Render(format!("{:?}", e)))?;

    let image = DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8());
    debug!(
        "Rendered page 1 of {} → {}x{} px",
        pdf_path.display(),
        image.width(),
        image.height()
    );

    Ok(image)
}
