//! Mounting a model preview onto a surface and tearing it down.
//!
//! A [`PreviewHandle`] owns one surface at a time. Loads run in the
//! background; every load carries the generation it was started for, and a
//! result whose generation is no longer current is dropped without touching
//! the surface. Teardown takes the surface out first, so nothing can attach
//! to it afterwards, then cancels the animation loop and releases it.

use crate::bounds::{Aabb, Normalization};
use crate::error::PreviewResult;
use crate::loader::{LoadedModel, ModelLoader};
use crate::surface::{RenderSurface, SurfaceFactory};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PreviewOptions {
    pub target_size: f32,
    pub auto_rotate: bool,
    /// Radians added per frame.
    pub rotation_step: f32,
    pub frame_interval: Duration,
    pub max_model_bytes: u64,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            target_size: 30.0,
            auto_rotate: true,
            rotation_step: 0.002,
            frame_interval: Duration::from_millis(16),
            max_model_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewStatus {
    Loading,
    Ready {
        bounds: Aabb,
        normalization: Normalization,
    },
    Failed(String),
    Unmounted,
}

impl PreviewStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, PreviewStatus::Loading)
    }
}

/// Creates previews that share one surface factory and model loader.
#[derive(Clone)]
pub struct Previewer {
    factory: Arc<dyn SurfaceFactory>,
    loader: ModelLoader,
    options: PreviewOptions,
}

impl Previewer {
    pub fn new(factory: Arc<dyn SurfaceFactory>, options: PreviewOptions) -> PreviewResult<Self> {
        let loader = ModelLoader::new(options.max_model_bytes, DEFAULT_LOAD_TIMEOUT)?;
        Ok(Self {
            factory,
            loader,
            options,
        })
    }

    /// Shows a placeholder in `container` right away and starts loading
    /// `model_url` in the background. Must be called inside a tokio runtime.
    pub fn mount(&self, container: &str, model_url: &str) -> PreviewHandle {
        let (status, _) = watch::channel(PreviewStatus::Loading);
        let shared = Arc::new(Shared {
            container: container.to_string(),
            factory: self.factory.clone(),
            loader: self.loader.clone(),
            options: self.options.clone(),
            surface: Mutex::new(None),
            tasks: Mutex::new(Tasks::default()),
            generation: AtomicU64::new(0),
            unmounted: AtomicBool::new(false),
            status,
        });
        shared.start(model_url);
        PreviewHandle { shared }
    }
}

/// Owner of a mounted preview. Dropping it unmounts.
pub struct PreviewHandle {
    shared: Arc<Shared>,
}

impl PreviewHandle {
    pub fn container(&self) -> &str {
        &self.shared.container
    }

    pub fn status(&self) -> PreviewStatus {
        self.shared.status.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<PreviewStatus> {
        self.shared.status.subscribe()
    }

    /// Waits until the current load has succeeded or failed.
    pub async fn wait_settled(&self) -> PreviewStatus {
        let mut rx = self.watch();
        let settled = match rx.wait_for(PreviewStatus::is_settled).await {
            Ok(status) => status.clone(),
            Err(_) => PreviewStatus::Unmounted,
        };
        settled
    }

    /// Tears the current surface down and mounts a fresh one for `url`.
    pub fn set_model_url(&self, url: &str) {
        if self.shared.unmounted.load(Ordering::SeqCst) {
            warn!(container = %self.shared.container, "set_model_url after unmount ignored");
            return;
        }
        self.shared.teardown();
        self.shared.start(url);
    }

    /// Cancels the animation loop, then releases the surface and its model.
    /// Returns once everything is released; safe to call more than once.
    pub fn unmount(&self) {
        if self.shared.unmounted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.teardown();
        self.shared.status.send_replace(PreviewStatus::Unmounted);
        info!(container = %self.shared.container, "Preview unmounted");
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[derive(Default)]
struct Tasks {
    load: Option<JoinHandle<()>>,
    animation: Option<JoinHandle<()>>,
}

struct Shared {
    container: String,
    factory: Arc<dyn SurfaceFactory>,
    loader: ModelLoader,
    options: PreviewOptions,
    surface: Mutex<Option<Box<dyn RenderSurface>>>,
    tasks: Mutex<Tasks>,
    generation: AtomicU64,
    unmounted: AtomicBool,
    status: watch::Sender<PreviewStatus>,
}

impl Shared {
    fn start(self: &Arc<Self>, url: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut surface = self.factory.create(&self.container);
        surface.show_placeholder();
        *self.surface.lock() = Some(surface);
        self.status.send_replace(PreviewStatus::Loading);

        let shared = self.clone();
        let url = url.to_string();
        let load = tokio::spawn(async move {
            let result = shared.loader.load(&url).await;
            shared.attach(generation, result);
        });
        self.tasks.lock().load = Some(load);
        debug!(container = %self.container, generation, "Preview mounted");
    }

    /// Applies a finished load, unless the preview moved on meanwhile.
    fn attach(self: &Arc<Self>, generation: u64, result: PreviewResult<LoadedModel>) {
        let mut guard = self.surface.lock();
        let Some(surface) = guard.as_mut() else {
            return;
        };
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(container = %self.container, generation, "Discarding superseded model load");
            return;
        }

        match result {
            Ok(model) => {
                let normalization = Normalization::fit(&model.bounds, self.options.target_size);
                surface.show_model(&model, normalization);
                if self.options.auto_rotate {
                    surface.begin_animation();
                    let animation = tokio::spawn(animate(self.clone(), generation));
                    self.tasks.lock().animation = Some(animation);
                }
                self.status.send_replace(PreviewStatus::Ready {
                    bounds: model.bounds,
                    normalization,
                });
            }
            Err(err) => {
                warn!(container = %self.container, error = %err, "Model preview failed");
                surface.show_fallback(err.fallback_text());
                self.status.send_replace(PreviewStatus::Failed(err.to_string()));
            }
        }
    }

    fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let surface = self.surface.lock().take();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        if let Some(animation) = tasks.animation {
            animation.abort();
        }
        if let Some(load) = tasks.load {
            load.abort();
        }

        if let Some(mut surface) = surface {
            surface.end_animation();
            surface.release();
        }
    }
}

async fn animate(shared: Arc<Shared>, generation: u64) {
    let mut ticker = tokio::time::interval(shared.options.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut rotation = 0.0f32;

    loop {
        ticker.tick().await;
        if !shared.render(generation, rotation) {
            break;
        }
        rotation = (rotation + shared.options.rotation_step) % std::f32::consts::TAU;
    }
}

impl Shared {
    fn render(&self, generation: u64, rotation: f32) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        match self.surface.lock().as_mut() {
            Some(surface) => {
                surface.render_frame(rotation);
                true
            }
            None => false,
        }
    }
}
