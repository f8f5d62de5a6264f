// THEORY:
// A `SmartBlob` is the spatial summary of one difference region: a maximal,
// 4-connected cluster of marked pixels in a difference raster. It turns a cloud of
// individual red pixels into a single object with a bounding box, an area and a
// centroid, which is what a reviewer (or an enrichment service) reasons about.
//
// Like `Pixel`, it is a "dumb" data container. It is produced by the region
// clustering analyzer for a single comparison and has no memory of previous runs.

use serde::{Deserialize, Serialize};

/// A 2D coordinate on the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// One connected cluster of difference pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartBlob {
    /// Position of the blob in scan order, unique within one comparison only.
    pub id: u64,
    /// Top-left and bottom-right corners, inclusive.
    pub bounding_box: (Point, Point),
    /// Number of marked pixels in the cluster.
    pub pixel_count: usize,
    /// Unweighted mean position of the cluster's pixels.
    pub center_of_mass: (f64, f64),
}

impl SmartBlob {
    pub fn width(&self) -> u32 {
        self.bounding_box.1.x - self.bounding_box.0.x + 1
    }

    pub fn height(&self) -> u32 {
        self.bounding_box.1.y - self.bounding_box.0.y + 1
    }
}
