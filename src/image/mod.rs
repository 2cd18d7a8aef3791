pub mod colormap;
pub mod filter;
pub mod image_compression;
