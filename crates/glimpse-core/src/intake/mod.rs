//! Getting images from disk into the engine:
//! - **discovery**: expand a path into image files
//! - **validate**: existence, size and signature checks before decoding
//! - **decode**: bounded decoding on the blocking pool

pub mod decode;
pub mod discovery;
pub mod validate;

pub use decode::{format_name, DecodedImage, ImageDecoder};
pub use discovery::FileDiscovery;
pub use validate::Validator;
