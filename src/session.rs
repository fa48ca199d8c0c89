//! Application glue: engine, render workers, stamp library and export

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::capture::{DEFAULT_INK, StrokePad};
use crate::engine::{
    ClientPoint, DocPoint, Effect, Engine, EngineConfig, Event, PointerKind, PointerMode,
    StampImage, Viewport,
};
use crate::export::lopdf_backend::LopdfMutator;
use crate::export::{ExportReport, export_stamps};
use crate::render::{DEFAULT_CACHE_SIZE, DEFAULT_WORKERS, RenderService};
use crate::settings;
use crate::source::{SourceOpener, reference_geometry};

/// How a [`Session`] is set up
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub config: EngineConfig,
    pub viewport: Viewport,
    pub workers: usize,
    pub cache_size: usize,
    /// Longest time [`Session::settle`] waits for page content
    pub settle_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            viewport: Viewport::default(),
            workers: DEFAULT_WORKERS,
            cache_size: DEFAULT_CACHE_SIZE,
            settle_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionOptions {
    /// Options built from the loaded user settings
    #[must_use]
    pub fn from_settings() -> Self {
        let (width, height, density) = settings::get_default_viewport();
        Self {
            config: settings::engine_config(),
            viewport: Viewport::new(width, height, density),
            workers: settings::get_render_workers(),
            cache_size: settings::get_page_cache_size(),
            ..Self::default()
        }
    }
}

/// One step of a replay script
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    Viewport {
        width: f32,
        height: f32,
        #[serde(default = "default_density")]
        pixel_density: f32,
    },
    Scroll {
        top: f32,
        #[serde(default)]
        left: f32,
    },
    Zoom {
        percent: f32,
    },
    ZoomIn,
    ZoomOut,
    PointerDown {
        x: f32,
        y: f32,
    },
    PointerMove {
        x: f32,
        y: f32,
    },
    PointerUp {
        x: f32,
        y: f32,
    },
    /// Deliver up to `count` requested animation frames
    Frames {
        count: usize,
    },
    /// Place a stamp from the library; without `page` it lands on the first visible page
    Place {
        stamp: usize,
        #[serde(default)]
        page: Option<usize>,
        #[serde(default)]
        x: Option<f32>,
        #[serde(default)]
        y: Option<f32>,
        #[serde(default)]
        scale: Option<f32>,
    },
    Duplicate,
    Delete,
    Scale {
        factor: f32,
    },
    Mode {
        mode: PointerMode,
    },
    EntryPoint {
        kind: PointerKind,
    },
    Deselect,
    /// Draw a stamp on a `width x height` pad and add it to the library.
    /// Each stroke is a list of `[x, y]` pad points.
    Stroke {
        width: u32,
        height: u32,
        #[serde(default)]
        line_width: Option<f32>,
        strokes: Vec<Vec<[f32; 2]>>,
    },
    /// Wait for page content to finish rendering
    Settle,
}

fn draw_strokes(width: u32, height: u32, line_width: Option<f32>, strokes: &[Vec<[f32; 2]>]) -> StrokePad {
    let mut pad = StrokePad::new(width, height);
    if let Some(line_width) = line_width {
        pad = pad.with_line(line_width, DEFAULT_INK);
    }
    for stroke in strokes {
        let Some((&[x, y], rest)) = stroke.split_first() else {
            continue;
        };
        if pad.begin_stroke(x, y) {
            debug!("Drawing started on a {width}x{height} pad");
        }
        for &[x, y] in rest {
            pad.extend_stroke(x, y);
        }
        pad.end_stroke();
    }
    pad
}

fn default_density() -> f32 {
    1.0
}

/// Parse a replay script: a JSON array of steps
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>> {
    serde_json::from_str(text).context("parsing replay script")
}

/// An open document with its engine and render workers
pub struct Session {
    engine: Engine,
    service: RenderService,
    document: Vec<u8>,
    stamps: Vec<Arc<StampImage>>,
    frame_requested: bool,
    settle_timeout: Duration,
    failures: Vec<(usize, String)>,
}

impl Session {
    /// Load a document through `opener`; `document` is the raw file used for export
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        document: Vec<u8>,
        options: SessionOptions,
    ) -> Result<Self> {
        let source = opener.open().context("opening document")?;
        let page_count = source.page_count();
        let reference = reference_geometry(source.as_ref()).context("reading page geometry")?;
        drop(source);

        let mut session = Self {
            engine: Engine::new(options.config, options.viewport),
            service: RenderService::with_config(opener, options.workers, options.cache_size),
            document,
            stamps: Vec::new(),
            frame_requested: false,
            settle_timeout: options.settle_timeout,
            failures: Vec::new(),
        };
        session.apply(Event::DocumentLoaded {
            page_count,
            reference,
        })?;
        info!("Session opened: {page_count} pages");
        Ok(session)
    }

    #[cfg(feature = "pdf")]
    pub fn open_pdf(path: &Path, options: SessionOptions) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let opener = Arc::new(crate::source::pdf::MupdfOpener::new(path));
        Self::new(opener, bytes, options)
            .with_context(|| format!("loading {}", path.display()))
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Pages whose content failed to render, with the reason
    #[must_use]
    pub fn failures(&self) -> &[(usize, String)] {
        &self.failures
    }

    /// Add a stamp image to the library, returning its index
    pub fn add_stamp(&mut self, image: StampImage) -> usize {
        self.stamps.push(Arc::new(image));
        self.stamps.len() - 1
    }

    /// Turn a drawing into a library stamp, returning its index
    pub fn add_drawn_stamp(&mut self, pad: &StrokePad) -> Result<usize> {
        let image = pad.to_stamp().context("converting drawing to a stamp")?;
        Ok(self.add_stamp(image))
    }

    fn stamp(&self, index: usize) -> Result<Arc<StampImage>> {
        match self.stamps.get(index) {
            Some(image) => Ok(image.clone()),
            None => bail!(
                "stamp {index} not loaded ({} in library)",
                self.stamps.len()
            ),
        }
    }

    /// Feed one event to the engine and act on what it asks for
    pub fn apply(&mut self, event: Event) -> Result<Vec<Effect>> {
        let effects = self.engine.dispatch(event)?;
        self.follow(effects)
    }

    fn follow(&mut self, effects: Vec<Effect>) -> Result<Vec<Effect>> {
        let mut seen = Vec::with_capacity(effects.len());
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match &effect {
                Effect::RequestContentPass if !self.engine.is_pass_in_flight() => {
                    queue.extend(self.service.start_pass(&mut self.engine)?);
                }
                Effect::RequestAnimationFrame => self.frame_requested = true,
                Effect::RenderFailed { page, reason } => {
                    warn!("Page {page} left blank: {reason}");
                    self.failures.push((*page, reason.clone()));
                }
                _ => {}
            }
            seen.push(effect);
        }
        Ok(seen)
    }

    /// Block until no slot is waiting for page content
    pub fn settle(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.settle_timeout;
        loop {
            if !self.engine.is_pass_in_flight() {
                let effects = self.service.start_pass(&mut self.engine)?;
                self.follow(effects)?;
                if !self.engine.is_pass_in_flight() {
                    return Ok(());
                }
            }
            if self.service.pending_jobs() == 0 {
                bail!("render pass cannot complete: no jobs reached the workers");
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!(
                    "rendering did not settle within {:?} ({} jobs pending)",
                    self.settle_timeout,
                    self.service.pending_jobs()
                );
            }
            let effects = self.service.wait(&mut self.engine, remaining)?;
            self.follow(effects)?;
        }
    }

    /// Deliver up to `count` animation frames while the engine keeps asking for them
    pub fn run_frames(&mut self, count: usize) -> Result<usize> {
        let mut delivered = 0;
        while delivered < count && self.frame_requested {
            self.frame_requested = false;
            self.apply(Event::AnimationFrame)?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Place a library stamp at a known page position
    pub fn place(&mut self, stamp: usize, page: usize, position: DocPoint, scale: f32) -> Result<()> {
        let image = self.stamp(stamp)?;
        self.apply(Event::PlaceStampAt {
            image,
            page,
            position,
            scale,
        })
        .with_context(|| format!("placing stamp {stamp} on page {page}"))?;
        Ok(())
    }

    /// Run a script against the engine, then wait for rendering to settle
    pub fn replay(&mut self, steps: &[ScriptStep]) -> Result<()> {
        for (index, step) in steps.iter().enumerate() {
            debug!("Replay step {index}: {step:?}");
            self.run_step(step)
                .with_context(|| format!("replay step {index} ({step:?})"))?;
        }
        self.settle()
    }

    fn run_step(&mut self, step: &ScriptStep) -> Result<()> {
        let event = match *step {
            ScriptStep::Viewport {
                width,
                height,
                pixel_density,
            } => Event::Resized {
                width,
                height,
                pixel_density,
            },
            ScriptStep::Scroll { top, left } => Event::ScrollChanged { top, left },
            ScriptStep::Zoom { percent } => Event::ZoomChanged { percent },
            ScriptStep::ZoomIn => Event::ZoomIn,
            ScriptStep::ZoomOut => Event::ZoomOut,
            ScriptStep::PointerDown { x, y } => Event::PointerDown(ClientPoint::new(x, y)),
            ScriptStep::PointerMove { x, y } => Event::PointerMove(ClientPoint::new(x, y)),
            ScriptStep::PointerUp { x, y } => Event::PointerUp(ClientPoint::new(x, y)),
            ScriptStep::Frames { count } => {
                self.run_frames(count)?;
                return Ok(());
            }
            ScriptStep::Place {
                stamp,
                page: Some(page),
                x,
                y,
                scale,
            } => {
                let default = self.engine.config().default_stamp_position;
                let position = DocPoint::new(x.unwrap_or(default.x), y.unwrap_or(default.y));
                return self.place(stamp, page, position, scale.unwrap_or(1.0));
            }
            ScriptStep::Place {
                stamp, page: None, ..
            } => Event::PlaceStamp(self.stamp(stamp)?),
            ScriptStep::Duplicate => Event::DuplicateSelected,
            ScriptStep::Delete => Event::DeleteSelected,
            ScriptStep::Scale { factor } => Event::ResizeSelected { factor },
            ScriptStep::Mode { mode } => Event::SetPointerMode(mode),
            ScriptStep::EntryPoint { kind } => Event::EntryPointPressed(kind),
            ScriptStep::Deselect => Event::Deselect,
            ScriptStep::Settle => return self.settle(),
            ScriptStep::Stroke {
                width,
                height,
                line_width,
                ref strokes,
            } => {
                let pad = draw_strokes(width, height, line_width, strokes);
                let index = self.add_drawn_stamp(&pad)?;
                info!("Drawn stamp added to the library as {index}");
                return Ok(());
            }
        };
        self.apply(event)?;
        Ok(())
    }

    /// Write every bound page (content with overlay on top) as a PNG
    pub fn snapshot(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let mut written = Vec::new();
        for slot in self.engine.window().slots() {
            let Some(page) = slot.page() else {
                continue;
            };
            if slot.content.width() == 0 || slot.content.height() == 0 {
                continue;
            }
            let path = dir.join(format!("page-{page:04}.png"));
            slot.content
                .flatten_with(&slot.overlay)
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            written.push(path);
        }
        written.sort();
        info!("Wrote {} page snapshots to {}", written.len(), dir.display());
        Ok(written)
    }

    /// Flatten the placed stamps into a copy of the document
    pub fn export(&self) -> Result<ExportReport> {
        let mut mutator = LopdfMutator::load(&self.document).context("parsing document for export")?;
        let report = export_stamps(
            &mut mutator,
            self.engine.overlay().iter(),
            self.engine.config().stamp_width,
        )?;
        Ok(report)
    }

    /// Export and write the result to `path`
    pub fn export_to(&self, path: &Path) -> Result<ExportReport> {
        let report = self.export()?;
        fs::write(path, &report.bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(report)
    }
}
