//! Flattening placed stamps into the output document

pub mod lopdf_backend;
pub mod projection;
pub mod vector;

use std::collections::{HashMap, HashSet};

use image::RgbaImage;
use log::{info, warn};

use crate::engine::overlay::{ImageId, Stamp, StampId};
use projection::{OutputPage, Placement, project};
use vector::VectorForm;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("page {page} outside [0, {page_count})")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("saving document: {0}")]
    Save(String),
}

/// Document mutation used by export
pub trait DocumentMutator {
    type ImageRef: Copy;

    fn page_count(&self) -> usize;

    fn page(&self, index: usize) -> Result<OutputPage, ExportError>;

    fn embed_image(&mut self, image: &RgbaImage) -> Result<Self::ImageRef, ExportError>;

    /// Embed vector content drawn into the same unit square as an image
    fn embed_form(&mut self, form: &VectorForm) -> Result<Self::ImageRef, ExportError>;

    fn draw_image(
        &mut self,
        page: usize,
        image: Self::ImageRef,
        placement: &Placement,
    ) -> Result<(), ExportError>;

    fn save(&mut self) -> Result<Vec<u8>, ExportError>;
}

/// A stamp left out of the artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedStamp {
    pub stamp: StampId,
    pub page: usize,
    pub rotation: i32,
}

#[derive(Debug)]
pub struct ExportReport {
    pub bytes: Vec<u8>,
    /// Number of stamps drawn
    pub embedded: usize,
    /// Stamps drawn from their SVG source rather than the raster
    pub vector: usize,
    pub skipped: Vec<SkippedStamp>,
}

/// Draw `stamps` (most recent first) into the document and save it.
///
/// Stamps on pages with an unsupported rotation are skipped and reported;
/// the rest of the export continues.
pub fn export_stamps<'a, M, I>(
    mutator: &mut M,
    stamps: I,
    stamp_width: f32,
) -> Result<ExportReport, ExportError>
where
    M: DocumentMutator,
    I: IntoIterator<Item = &'a Stamp>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut embedded_images: HashMap<ImageId, M::ImageRef> = HashMap::new();
    let mut embedded = 0;
    let mut vector = 0;
    let mut vector_images: HashSet<ImageId> = HashSet::new();
    let mut skipped = Vec::new();

    // back to front so the most recent stamp ends up on top
    for stamp in stamps.into_iter().rev() {
        let page = mutator.page(stamp.page)?;
        let placement = match project(stamp.bounds(stamp_width), &page) {
            Ok(placement) => placement,
            Err(unsupported) => {
                warn!(
                    "Skipping stamp {} on page {}: {unsupported}",
                    stamp.id, stamp.page
                );
                skipped.push(SkippedStamp {
                    stamp: stamp.id,
                    page: stamp.page,
                    rotation: page.rotation,
                });
                continue;
            }
        };

        let image = match embedded_images.get(&stamp.image.id()) {
            Some(image) => *image,
            None => {
                let image = match stamp.image.svg().and_then(vector::from_svg) {
                    Some(form) => {
                        vector_images.insert(stamp.image.id());
                        mutator.embed_form(&form)?
                    }
                    None => mutator.embed_image(stamp.image.raster())?,
                };
                embedded_images.insert(stamp.image.id(), image);
                image
            }
        };
        mutator.draw_image(stamp.page, image, &placement)?;
        embedded += 1;
        if vector_images.contains(&stamp.image.id()) {
            vector += 1;
        }
    }

    let bytes = mutator.save()?;
    info!(
        "Exported {embedded} stamps ({vector} as vectors, {} skipped), {} bytes",
        skipped.len(),
        bytes.len()
    );
    Ok(ExportReport {
        bytes,
        embedded,
        vector,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::Rgba;

    use super::*;
    use crate::engine::{DocPoint, StampImage};

    #[derive(Default)]
    struct RecordingMutator {
        rotations: Vec<i32>,
        embeds: usize,
        forms: usize,
        draws: Vec<(usize, Placement)>,
    }

    impl DocumentMutator for RecordingMutator {
        type ImageRef = usize;

        fn page_count(&self) -> usize {
            self.rotations.len()
        }

        fn page(&self, index: usize) -> Result<OutputPage, ExportError> {
            let rotation = *self.rotations.get(index).ok_or(ExportError::PageOutOfRange {
                page: index,
                page_count: self.rotations.len(),
            })?;
            Ok(OutputPage {
                width: 600.0,
                height: 800.0,
                rotation,
            })
        }

        fn embed_image(&mut self, _image: &RgbaImage) -> Result<usize, ExportError> {
            self.embeds += 1;
            Ok(self.embeds)
        }

        fn embed_form(&mut self, _form: &VectorForm) -> Result<usize, ExportError> {
            self.forms += 1;
            Ok(100 + self.forms)
        }

        fn draw_image(
            &mut self,
            page: usize,
            _image: usize,
            placement: &Placement,
        ) -> Result<(), ExportError> {
            self.draws.push((page, *placement));
            Ok(())
        }

        fn save(&mut self) -> Result<Vec<u8>, ExportError> {
            Ok(b"%PDF-fake".to_vec())
        }
    }

    fn stamps_on(pages: &[usize], image: &Arc<StampImage>) -> Vec<Stamp> {
        pages
            .iter()
            .enumerate()
            .map(|(i, &page)| Stamp {
                id: StampId(i as u64 + 1),
                image: image.clone(),
                position: DocPoint::new(50.0, 50.0),
                scale: 1.0,
                page,
                last_interacted_at: (pages.len() - i) as u64,
            })
            .collect()
    }

    #[test]
    fn unsupported_rotation_is_skipped_and_export_completes() {
        let image = Arc::new(StampImage::new(
            RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255])),
            None,
        ));
        let stamps = stamps_on(&[0, 1, 2, 3], &image);
        let mut mutator = RecordingMutator {
            rotations: vec![0, 90, 45, 180],
            ..RecordingMutator::default()
        };

        let report = export_stamps(&mut mutator, &stamps, 100.0).unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(report.bytes, b"%PDF-fake");
        assert_eq!(
            report.skipped.iter().map(|s| s.rotation).collect::<Vec<_>>(),
            vec![180, 45]
        );
        assert_eq!(mutator.embeds, 1, "shared image is embedded once");
        let pages: Vec<usize> = mutator.draws.iter().map(|(p, _)| *p).collect();
        assert_eq!(pages, vec![1, 0]);
    }

    #[cfg(feature = "svg")]
    #[test]
    fn svg_stamps_are_drawn_as_vectors() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="50"><rect width="100" height="50" fill="#000"/></svg>"##;
        let vector_image = Arc::new(StampImage::new(
            RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255])),
            Some(svg.to_string()),
        ));
        let raster_image = Arc::new(StampImage::new(RgbaImage::new(100, 50), None));
        let mut stamps = stamps_on(&[0, 0], &vector_image);
        stamps.extend(stamps_on(&[0], &raster_image));
        let mut mutator = RecordingMutator {
            rotations: vec![0],
            ..RecordingMutator::default()
        };

        let report = export_stamps(&mut mutator, &stamps, 100.0).unwrap();
        assert_eq!(report.embedded, 3);
        assert_eq!(report.vector, 2);
        assert_eq!((mutator.forms, mutator.embeds), (1, 1));
    }

    #[test]
    fn stamp_on_missing_page_fails() {
        let image = Arc::new(StampImage::new(RgbaImage::new(10, 10), None));
        let stamps = stamps_on(&[5], &image);
        let mut mutator = RecordingMutator {
            rotations: vec![0],
            ..RecordingMutator::default()
        };
        assert!(matches!(
            export_stamps(&mut mutator, &stamps, 100.0),
            Err(ExportError::PageOutOfRange { page: 5, .. })
        ));
    }
}
