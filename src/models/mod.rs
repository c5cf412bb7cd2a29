/// The top-level container and its chunk list
pub mod cgfx;
/// The DATA chunk and its fixed dictionary table
pub mod data_chunk;
/// The IMAG chunk holding raw texel data
pub mod image_chunk;
/// Named value lists attached to records
pub mod metadata;
/// The header every dictionary record starts with
pub mod object;
/// Image textures
pub mod texture;
