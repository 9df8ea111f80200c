//! Small helpers shared across backends.

pub mod image;

pub use image::{EncodedImage, encode_image_bytes, encode_image_file};
