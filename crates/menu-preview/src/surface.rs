//! Renderer abstraction and a headless implementation that only keeps
//! count of what it holds.

use crate::bounds::Normalization;
use crate::loader::LoadedModel;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One drawing surface bound to a container.
///
/// `release` must be idempotent and must leave nothing behind: no model,
/// no running animation.
pub trait RenderSurface: Send {
    fn show_placeholder(&mut self);
    fn show_model(&mut self, model: &LoadedModel, normalization: Normalization);
    fn show_fallback(&mut self, message: &str);
    fn render_frame(&mut self, rotation: f32);
    fn begin_animation(&mut self);
    fn end_animation(&mut self);
    fn release(&mut self);
}

pub trait SurfaceFactory: Send + Sync {
    fn create(&self, container: &str) -> Box<dyn RenderSurface>;
}

/// Live resource counters shared by every surface of one factory.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    surfaces: AtomicUsize,
    models: AtomicUsize,
    animations: AtomicUsize,
    frames: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    pub live_surfaces: usize,
    pub live_models: usize,
    pub live_animations: usize,
    pub frames_rendered: u64,
}

impl LedgerSnapshot {
    pub fn is_idle(&self) -> bool {
        self.live_surfaces == 0 && self.live_models == 0 && self.live_animations == 0
    }
}

impl ResourceLedger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            live_surfaces: self.surfaces.load(Ordering::SeqCst),
            live_models: self.models.load(Ordering::SeqCst),
            live_animations: self.animations.load(Ordering::SeqCst),
            frames_rendered: self.frames.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceView {
    Placeholder,
    Model,
    Fallback,
    Released,
}

/// Factory for surfaces that draw nothing.
#[derive(Debug, Default, Clone)]
pub struct HeadlessSurfaceFactory {
    ledger: Arc<ResourceLedger>,
}

impl HeadlessSurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }
}

impl SurfaceFactory for HeadlessSurfaceFactory {
    fn create(&self, container: &str) -> Box<dyn RenderSurface> {
        self.ledger.surfaces.fetch_add(1, Ordering::SeqCst);
        debug!(container, "Headless surface created");
        Box::new(HeadlessSurface {
            container: container.to_string(),
            ledger: self.ledger.clone(),
            view: SurfaceView::Placeholder,
            has_model: false,
            animating: false,
        })
    }
}

struct HeadlessSurface {
    container: String,
    ledger: Arc<ResourceLedger>,
    view: SurfaceView,
    has_model: bool,
    animating: bool,
}

impl HeadlessSurface {
    fn drop_model(&mut self) {
        if std::mem::take(&mut self.has_model) {
            self.ledger.models.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl RenderSurface for HeadlessSurface {
    fn show_placeholder(&mut self) {
        if self.view == SurfaceView::Released {
            return;
        }
        self.drop_model();
        self.view = SurfaceView::Placeholder;
    }

    fn show_model(&mut self, model: &LoadedModel, normalization: Normalization) {
        if self.view == SurfaceView::Released {
            return;
        }
        if !std::mem::replace(&mut self.has_model, true) {
            self.ledger.models.fetch_add(1, Ordering::SeqCst);
        }
        self.view = SurfaceView::Model;
        debug!(
            container = %self.container,
            url = %model.url,
            scale = normalization.scale,
            "Model attached"
        );
    }

    fn show_fallback(&mut self, message: &str) {
        if self.view == SurfaceView::Released {
            return;
        }
        self.end_animation();
        self.drop_model();
        self.view = SurfaceView::Fallback;
        debug!(container = %self.container, message, "Fallback shown");
    }

    fn render_frame(&mut self, _rotation: f32) {
        if self.has_model {
            self.ledger.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn begin_animation(&mut self) {
        if self.view == SurfaceView::Released {
            return;
        }
        if !std::mem::replace(&mut self.animating, true) {
            self.ledger.animations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn end_animation(&mut self) {
        if std::mem::take(&mut self.animating) {
            self.ledger.animations.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn release(&mut self) {
        if self.view == SurfaceView::Released {
            return;
        }
        self.end_animation();
        self.drop_model();
        self.view = SurfaceView::Released;
        self.ledger.surfaces.fetch_sub(1, Ordering::SeqCst);
        debug!(container = %self.container, "Headless surface released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;

    fn model() -> LoadedModel {
        LoadedModel {
            url: "file:///dish.glb".into(),
            bytes_len: 10,
            bounds: Aabb::new([0.0; 3], [1.0; 3]),
        }
    }

    #[test]
    fn test_release_is_idempotent_and_complete() {
        let factory = HeadlessSurfaceFactory::new();
        let mut surface = factory.create("dish-1");
        surface.show_model(&model(), Normalization::IDENTITY);
        surface.show_model(&model(), Normalization::IDENTITY);
        surface.begin_animation();
        surface.render_frame(0.1);

        let live = factory.ledger().snapshot();
        assert_eq!(live.live_models, 1);
        assert_eq!(live.live_animations, 1);
        assert_eq!(live.frames_rendered, 1);

        surface.release();
        surface.release();
        assert!(factory.ledger().snapshot().is_idle());

        // A released surface ignores late work.
        surface.show_model(&model(), Normalization::IDENTITY);
        surface.begin_animation();
        assert!(factory.ledger().snapshot().is_idle());
    }

    #[test]
    fn test_fallback_drops_model() {
        let factory = HeadlessSurfaceFactory::new();
        let mut surface = factory.create("dish-2");
        surface.show_model(&model(), Normalization::IDENTITY);
        surface.begin_animation();
        surface.show_fallback("3D model could not be loaded");

        let snapshot = factory.ledger().snapshot();
        assert_eq!(snapshot.live_surfaces, 1);
        assert_eq!(snapshot.live_models, 0);
        assert_eq!(snapshot.live_animations, 0);
        surface.release();
    }
}
