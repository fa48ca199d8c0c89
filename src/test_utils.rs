pub mod test_helpers {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{Rgba, RgbaImage};

    use crate::engine::{
        ClientPoint, Effect, Engine, EngineConfig, Event, PageGeometry, StampImage, Viewport,
    };
    use crate::source::{DocumentSource, SourceError, SourceOpener};

    /// Solid fill used for `page`, distinct for the first 256 pages
    #[must_use]
    pub fn page_color(page: usize) -> Rgba<u8> {
        Rgba([(page * 37 % 256) as u8, 128, (255 - page % 256) as u8, 255])
    }

    /// In-memory document whose pages are solid colors
    #[derive(Clone, Debug)]
    pub struct FakeSource {
        pages: Vec<PageGeometry>,
        failing: HashSet<usize>,
        renders: Arc<AtomicUsize>,
    }

    impl FakeSource {
        /// `page_count` pages of `width` x `height` document units
        #[must_use]
        pub fn uniform(page_count: usize, width: f32, height: f32) -> Self {
            Self::with_pages(vec![PageGeometry::new(width, height); page_count])
        }

        #[must_use]
        pub fn with_pages(pages: Vec<PageGeometry>) -> Self {
            Self {
                pages,
                failing: HashSet::new(),
                renders: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Make rendering `page` fail
        #[must_use]
        pub fn failing_on(mut self, page: usize) -> Self {
            self.failing.insert(page);
            self
        }

        /// Number of `render_page` calls so far, across clones
        #[must_use]
        pub fn render_count(&self) -> usize {
            self.renders.load(Ordering::SeqCst)
        }
    }

    impl DocumentSource for FakeSource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_geometry(&self, page: usize) -> Result<PageGeometry, SourceError> {
            self.pages
                .get(page)
                .copied()
                .ok_or(SourceError::PageOutOfRange {
                    page,
                    page_count: self.pages.len(),
                })
        }

        fn render_page(&self, page: usize, scale: f32) -> Result<RgbaImage, SourceError> {
            let geometry = self.page_geometry(page)?;
            self.renders.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&page) {
                return Err(SourceError::render(format!("page {page} is corrupt")));
            }
            let width = (geometry.width * scale).round().max(1.0) as u32;
            let height = (geometry.height * scale).round().max(1.0) as u32;
            Ok(RgbaImage::from_pixel(width, height, page_color(page)))
        }
    }

    /// Hands out clones of one [`FakeSource`]; clones share the render counter
    #[derive(Clone, Debug)]
    pub struct FakeOpener {
        pub source: FakeSource,
    }

    impl FakeOpener {
        #[must_use]
        pub fn new(source: FakeSource) -> Arc<Self> {
            Arc::new(Self { source })
        }
    }

    impl SourceOpener for FakeOpener {
        fn open(&self) -> Result<Box<dyn DocumentSource>, SourceError> {
            Ok(Box::new(self.source.clone()))
        }
    }

    /// Opener that always fails, for exercising worker error paths
    #[derive(Clone, Debug, Default)]
    pub struct BrokenOpener;

    impl SourceOpener for BrokenOpener {
        fn open(&self) -> Result<Box<dyn DocumentSource>, SourceError> {
            Err(SourceError::Open {
                path: "broken.pdf".to_string(),
                detail: "not a PDF".to_string(),
            })
        }
    }

    /// Engine with a loaded document of `page_count` pages sized `width` x `height`
    pub fn loaded_engine(
        config: EngineConfig,
        viewport: Viewport,
        page_count: usize,
        width: f32,
        height: f32,
    ) -> Engine {
        let mut engine = Engine::new(config, viewport);
        engine
            .dispatch(Event::DocumentLoaded {
                page_count,
                reference: PageGeometry::new(width, height),
            })
            .expect("document loads");
        engine
    }

    /// Opaque stamp image of `width` x `height` pixels
    #[must_use]
    pub fn solid_stamp(width: u32, height: u32, color: Rgba<u8>) -> Arc<StampImage> {
        Arc::new(StampImage::new(
            RgbaImage::from_pixel(width, height, color),
            None,
        ))
    }

    /// Dispatch a press, a move and a release as one drag gesture
    pub fn drag(
        engine: &mut Engine,
        from: ClientPoint,
        to: ClientPoint,
    ) -> Result<Vec<Effect>, crate::engine::EngineError> {
        let mut effects = engine.dispatch(Event::PointerDown(from))?;
        effects.extend(engine.dispatch(Event::PointerMove(to))?);
        effects.extend(engine.dispatch(Event::PointerUp(to))?);
        Ok(effects)
    }
}
