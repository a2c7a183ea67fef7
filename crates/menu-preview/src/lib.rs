//! 3D model previews for menu items.
//!
//! Reads scene bounds from glTF/GLB assets, frames them with a uniform
//! [`Normalization`], and manages the lifetime of the surface a model is
//! shown on. Rendering itself sits behind [`RenderSurface`].

pub mod bounds;
pub mod error;
pub mod glb;
pub mod loader;
pub mod preview;
pub mod surface;

pub use bounds::{Aabb, Mat4, Normalization};
pub use error::{PreviewError, PreviewResult};
pub use loader::{LoadedModel, ModelLoader};
pub use preview::{PreviewHandle, PreviewOptions, PreviewStatus, Previewer};
pub use surface::{
    HeadlessSurfaceFactory, LedgerSnapshot, RenderSurface, ResourceLedger, SurfaceFactory,
};
