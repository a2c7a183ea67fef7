pub mod document;
pub mod error;
pub mod model;
pub mod price;
pub mod push;
pub mod wire;

pub use error::*;
pub use model::*;
pub use price::*;
pub use push::*;
pub use wire::*;
