pub mod color;
pub mod image_job;
pub mod kernel;
pub mod pixel_grid;
pub mod slice_filter;
pub mod utils;
