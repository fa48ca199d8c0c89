//! MuPDF-backed document source

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use log::warn;
use mupdf::{Colorspace, Document, Matrix, Pixmap};

use super::{DocumentSource, SourceError, SourceOpener, check_page};
use crate::engine::PageGeometry;
use crate::export::lopdf_backend::page_rotations;

pub struct MupdfSource {
    path: PathBuf,
    doc: Document,
    page_count: usize,
    /// Declared `/Rotate` per page, read on first geometry query
    rotations: OnceCell<Vec<i32>>,
}

impl MupdfSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let doc = Document::open(path.to_string_lossy().as_ref()).map_err(|e| SourceError::Open {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        let page_count = usize::try_from(doc.page_count()?).unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            doc,
            page_count,
            rotations: OnceCell::new(),
        })
    }

    fn rotation(&self, page: usize) -> i32 {
        let rotations = self.rotations.get_or_init(|| {
            match lopdf::Document::load(&self.path) {
                Ok(doc) => page_rotations(&doc),
                Err(e) => {
                    warn!("Cannot read page rotations of {}: {e}", self.path.display());
                    Vec::new()
                }
            }
        });
        rotations.get(page).copied().unwrap_or(0)
    }
}

impl DocumentSource for MupdfSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_geometry(&self, page: usize) -> Result<PageGeometry, SourceError> {
        check_page(page, self.page_count)?;
        let bounds = self.doc.load_page(page as i32)?.bounds()?;
        Ok(PageGeometry::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0)
            .with_rotation(self.rotation(page)))
    }

    fn render_page(&self, page: usize, scale: f32) -> Result<RgbaImage, SourceError> {
        check_page(page, self.page_count)?;
        let page = self.doc.load_page(page as i32)?;
        let rgb = Colorspace::device_rgb();
        let pixmap = page.to_pixmap(&Matrix::new_scale(scale, scale), &rgb, false, false)?;
        pixmap_to_rgba(&pixmap)
    }
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<RgbaImage, SourceError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(SourceError::render(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width();
    let height = pixmap.height();
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width as usize * n;
    if samples.len() < stride.saturating_mul(height as usize) || row_bytes > stride {
        return Err(SourceError::render("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height as usize {
        let row = &samples[y * stride..y * stride + row_bytes];
        for px in row.chunks_exact(n) {
            out.extend_from_slice(&px[..3]);
            out.push(if n > 3 { px[3] } else { 255 });
        }
    }

    RgbaImage::from_raw(width, height, out)
        .ok_or_else(|| SourceError::render("Pixmap size does not match its samples"))
}

/// Opens a fresh [`MupdfSource`] for every caller
#[derive(Clone, Debug)]
pub struct MupdfOpener {
    path: PathBuf,
}

impl MupdfOpener {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceOpener for MupdfOpener {
    fn open(&self) -> Result<Box<dyn DocumentSource>, SourceError> {
        Ok(Box::new(MupdfSource::open(&self.path)?))
    }
}
