pub mod pixel;
pub mod smart_pixel;
pub mod raster;
pub mod utils;
pub mod pixel_diff;
pub mod smart_blob;
pub mod blob_detector;
pub mod artifact_paths;
pub mod baseline_store;
pub mod comparison_record;
