//! PixelMap: render a Minecraft save into a top-down pixel-per-block map.
//!
//! The facade detects the save generation, builds the worker matching it
//! and runs the blocking render under a shared cooperative run flag.
//! Progress arrives through registered event callbacks, coalesced to a
//! fixed cadence.

pub mod config;
pub mod pool;
pub mod progress;
pub mod stats;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use pixelmap_render::{build_chain, BlockColor, RenderError, RenderSettings};
use pixelmap_world::light::LightSource;
use pixelmap_world::region::RegionKind;
use pixelmap_world::{save, FdGate, SaveKind, WorldError};

pub use config::{image_mode_from_name, RenderConfig};
pub use pixelmap_render::{BlendMode, ColorMode, RenderMode};
pub use progress::ProgressEvents;
pub use stats::{ErrorClass, RunSummary};

use pool::ThreadPool;
use progress::{DelayedAccumulator, EventHandler, PROGRESS_DELAY};
use stats::RunStats;
use worker::{JavaFormat, ProgressTap, RunContext};

#[derive(Error, Debug)]
pub enum PixelMapError {
    #[error("unrecognised save layout at {0}")]
    UnknownSave(PathBuf),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("run aborted")]
    Aborted(RunSummary),
}

pub struct PixelMap {
    config: RenderConfig,
    events: Arc<ProgressEvents>,
}

impl PixelMap {
    pub fn new(config: RenderConfig) -> Self {
        Self { config, events: Arc::new(ProgressEvents::default()) }
    }

    /// Event registration surface. Register before calling [`render`];
    /// handlers are invoked from worker threads.
    pub fn events(&self) -> &ProgressEvents {
        &self.events
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `input` into `output`, blocking until done. Clearing `run`
    /// from another thread aborts cooperatively: tasks finish their current
    /// step, the pool drains, and the call returns `Aborted`.
    pub fn render(
        &self,
        input: &Path,
        output: &Path,
        run: Arc<AtomicBool>,
    ) -> Result<RunSummary, PixelMapError> {
        run.store(true, Ordering::SeqCst);

        let kind = save::detect(input);
        if kind == SaveKind::Unknown {
            return Err(PixelMapError::UnknownSave(input.to_path_buf()));
        }
        let data_path = save::data_path(input, kind, self.config.dimension);
        info!(?kind, path = %data_path.display(), "rendering save");

        let colors = match &self.config.colors {
            Some(path) => {
                let table = BlockColor::read(path)?;
                if table.is_empty() {
                    warn!("no colors in {}, using the built-in table", path.display());
                    BlockColor::builtin()
                } else {
                    table
                }
            }
            None => BlockColor::builtin(),
        };
        let lights = match &self.config.lightsource {
            Some(path) => {
                let table = LightSource::read(path)?;
                if table.is_empty() {
                    warn!("no light sources in {}, using the built-in table", path.display());
                    LightSource::builtin()
                } else {
                    table
                }
            }
            None => LightSource::builtin(),
        };

        let settings = RenderSettings {
            mode: self.config.image,
            output: output.to_path_buf(),
            colors,
        };
        if settings.mode.single_file() {
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        } else {
            std::fs::create_dir_all(output)?;
        }

        let gate = FdGate::with_default_capacity();
        let threads = self.config.effective_threads(gate.capacity());
        let events = Arc::clone(&self.events);

        let total_chunks = Arc::new(EventHandler::default());
        let total_render = Arc::new(EventHandler::default());
        {
            let events2 = Arc::clone(&events);
            total_chunks.add(move |n| events2.total_chunks.call(n));
            let events2 = Arc::clone(&events);
            total_render.add(move |n| events2.total_render.call(n));
        }
        let finished_chunks = {
            let events2 = Arc::clone(&events);
            DelayedAccumulator::new(PROGRESS_DELAY, move |n| events2.finished_chunks.call(n))
        };
        let finished_render = {
            let events2 = Arc::clone(&events);
            DelayedAccumulator::new(PROGRESS_DELAY, move |n| events2.finished_render.call(n))
        };

        let ctx = Arc::new(RunContext {
            run: Arc::clone(&run),
            pool: ThreadPool::new(threads),
            settings: Arc::new(settings),
            chain: Arc::new(build_chain(&self.config.pass_options())),
            progress: Arc::new(ProgressTap {
                total_chunks,
                total_render,
                finished_chunks,
                finished_render,
            }),
            stats: Arc::new(RunStats::new()),
            gate,
            lights: Arc::new(lights),
            use_lonely: !self.config.no_lonely,
            night: self.config.night,
        });

        let result = match kind {
            SaveKind::Anvil => {
                worker::java::run(&ctx, &data_path, RegionKind::Anvil, JavaFormat::Anvil)
            }
            SaveKind::Beta => {
                worker::java::run(&ctx, &data_path, RegionKind::Beta, JavaFormat::Column)
            }
            SaveKind::Alpha => worker::alpha::run(&ctx, &data_path),
            SaveKind::Bedrock => worker::bedrock::run(&ctx, &data_path, self.config.dimension),
            SaveKind::Unknown => unreachable!(),
        };

        ctx.progress.flush();
        ctx.stats.summarize();
        self.events.done.call(());

        let summary = RunSummary::from_stats(&ctx.stats);
        let aborted = !ctx.running();
        run.store(false, Ordering::SeqCst);
        result?;
        if aborted {
            return Err(PixelMapError::Aborted(summary));
        }
        info!(chunks = summary.chunks_rendered, "render finished");
        Ok(summary)
    }
}
