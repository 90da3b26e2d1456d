//! Inline graphics: the image/placement store and its wire protocol.
//!
//! Applications transmit images over APC `G` sequences as `key=value`
//! metadata plus a base64 body. The store keeps decoded images under a
//! byte quota, places them on the grid (directly, relatively to other
//! placements, or virtually through Unicode placeholder cells), runs
//! animations, and answers every command with a coded response.

#![warn(clippy::pedantic)]

pub mod animation;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod placeholder;
pub mod placement;
pub mod store;

pub use command::{Action, Compression, DeleteSpec, GraphicsCommand, Medium, PixelFormat};
pub use dispatch::{GraphicsContext, GraphicsDispatcher, Response};
pub use error::{ErrorCode, GraphicsError};
pub use image::ImageData;
pub use placeholder::{PLACEHOLDER, PlaceholderCell, diacritic_index, diacritic_value};
pub use placement::Placement;
pub use store::{ImageStore, StoreConfig};
