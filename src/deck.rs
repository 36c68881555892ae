//! Turns a paged source document into the ordered slide images of a deck.

use std::cmp::Ordering;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use itertools::Itertools;
use log::{debug, info};

use crate::error::{Error, Result};

/// Pages are rasterised at twice their native size.
pub const RENDER_SCALE: f32 = 2.0;

/// Same default browsers use for `image/jpeg` canvas exports.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

pub const SLIDE_CONTENT_TYPE: &str = "image/jpeg";

/// One encoded slide. `index` is the 0-based page it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideImage {
    index: usize,
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl SlideImage {
    /// Wraps already-encoded JPEG bytes.
    pub fn from_parts(index: usize, width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            bytes,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &'static str {
        SLIDE_CONTENT_TYPE
    }
}

pub trait PagedDocument: Send + Sync {
    fn page_count(&self) -> usize;
}

/// Rasterises single pages of a document.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    type Document: PagedDocument;

    async fn render_page(
        &self,
        document: &Self::Document,
        page_index: usize,
        scale: f32,
    ) -> anyhow::Result<RgbaImage>;
}

pub struct DeckConverter<R> {
    renderer: R,
    jpeg_quality: u8,
}

impl<R: PageRenderer> DeckConverter<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Renders every page in order, one at a time.
    ///
    /// The first page that fails aborts the whole conversion with
    /// [`Error::PageRender`]; nothing rendered before it is returned.
    pub async fn convert(&self, document: &R::Document) -> Result<Vec<SlideImage>> {
        let page_count = document.page_count();
        if page_count == 0 {
            return Err(Error::EmptyDeck);
        }

        let mut slides = Vec::with_capacity(page_count);
        for page in 0..page_count {
            let raster = self
                .renderer
                .render_page(document, page, RENDER_SCALE)
                .await
                .map_err(|source| Error::PageRender { page, source })?;
            let slide = encode_jpeg(page, raster, self.jpeg_quality)
                .map_err(|source| Error::PageRender { page, source })?;
            debug!(
                "page {} rendered at {}x{} ({} bytes)",
                page + 1,
                slide.width,
                slide.height,
                slide.bytes.len()
            );
            slides.push(slide);
        }

        info!("converted {page_count} pages");
        Ok(slides)
    }
}

fn encode_jpeg(index: usize, raster: RgbaImage, quality: u8) -> anyhow::Result<SlideImage> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("renderer produced an empty raster"));
    }
    let rgb = DynamicImage::ImageRgba8(raster).to_rgb8();

    let mut bytes = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .context("jpeg encoding failed")?;

    Ok(SlideImage {
        index,
        width,
        height,
        bytes: bytes.into_inner(),
    })
}

/// A document whose pages are already raster files, one file per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterDocument {
    pages: Vec<PathBuf>,
}

impl RasterDocument {
    pub fn from_paths(pages: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
        }
    }

    /// Collects the image files of a directory in natural name order, so
    /// `page-2.png` comes before `page-10.png`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let pages = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ImageFormat::from_path(path).is_ok())
            .sorted_by(|a, b| natural_cmp(&file_name(a), &file_name(b)))
            .collect();
        Ok(Self { pages })
    }

    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }
}

impl PagedDocument for RasterDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Decodes raster pages from disk and upscales them.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterPageRenderer;

#[async_trait]
impl PageRenderer for RasterPageRenderer {
    type Document = RasterDocument;

    async fn render_page(
        &self,
        document: &RasterDocument,
        page_index: usize,
        scale: f32,
    ) -> anyhow::Result<RgbaImage> {
        let path = document
            .pages
            .get(page_index)
            .cloned()
            .ok_or_else(|| anyhow!("document has no page {}", page_index + 1))?;

        tokio::task::spawn_blocking(move || -> anyhow::Result<RgbaImage> {
            let page = image::open(&path)
                .with_context(|| format!("failed to decode {}", path.display()))?;
            let width = scaled(page.width(), scale);
            let height = scaled(page.height(), scale);
            Ok(page
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgba8())
        })
        .await?
    }
}

fn scaled(dimension: u32, scale: f32) -> u32 {
    ((dimension as f32 * scale).round() as u32).max(1)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compares names treating runs of digits as numbers.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left: String = std::iter::from_fn(|| a.next_if(char::is_ascii_digit)).collect();
                let right: String =
                    std::iter::from_fn(|| b.next_if(char::is_ascii_digit)).collect();
                let left = left.trim_start_matches('0');
                let right = right.trim_start_matches('0');
                let ord = left.len().cmp(&right.len()).then_with(|| left.cmp(right));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}
