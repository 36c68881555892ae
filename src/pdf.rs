//! Vector PDF decks, rasterised page by page with `hayro`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use hayro::{render, InterpreterSettings, Pdf, RenderSettings};
use image::{ImageFormat, RgbaImage};
use log::debug;

use crate::deck::{PageRenderer, PagedDocument};
use crate::error::{Error, Result};

/// A PDF held in memory. Pages are parsed again on every render so the
/// document can be shared across blocking render tasks.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    data: Arc<Vec<u8>>,
    page_count: usize,
}

impl PdfDocument {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::read(path)
            .map_err(anyhow::Error::from)
            .and_then(Self::from_bytes)
            .map_err(|source| Error::UnreadableDocument {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let data = Arc::new(bytes);
        let page_count = parse(&data)?.pages().len();
        debug!("loaded PDF with {page_count} pages");
        Ok(Self { data, page_count })
    }
}

impl PagedDocument for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }
}

fn parse(data: &Arc<Vec<u8>>) -> anyhow::Result<Pdf> {
    Pdf::new(Arc::clone(data) as Arc<dyn AsRef<[u8]> + Send + Sync>)
        .map_err(|_| anyhow!("malformed PDF"))
}

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Draws PDF pages at `scale` times their media box.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfPageRenderer;

#[async_trait]
impl PageRenderer for PdfPageRenderer {
    type Document = PdfDocument;

    async fn render_page(
        &self,
        document: &PdfDocument,
        page_index: usize,
        scale: f32,
    ) -> anyhow::Result<RgbaImage> {
        if page_index >= document.page_count {
            return Err(anyhow!("document has no page {}", page_index + 1));
        }
        let data = Arc::clone(&document.data);

        tokio::task::spawn_blocking(move || -> anyhow::Result<RgbaImage> {
            let pdf = parse(&data)?;
            let page = pdf
                .pages()
                .get(page_index)
                .ok_or_else(|| anyhow!("document has no page {}", page_index + 1))?;
            let settings = RenderSettings {
                x_scale: scale,
                y_scale: scale,
                ..Default::default()
            };
            let pixmap = render(page, &InterpreterSettings::default(), &settings);
            let png = pixmap.take_png();
            Ok(image::load_from_memory_with_format(&png, ImageFormat::Png)
                .context("rendered page is not a valid raster")?
                .to_rgba8())
        })
        .await?
    }
}
