// THEORY:
// The `BlobDetector` is the engine of the region clustering layer. It post-processes
// a difference raster into the set of spatially contiguous, sufficiently large
// difference regions, separating "one button moved" (one sizeable region) from
// "a scatter of anti-aliasing jitter" (many tiny clusters, filtered out).
//
// Key architectural principles & algorithm steps:
// 1.  **Marker Detection**: A pixel belongs to a difference only if it carries the
//     saturated difference color (R > 200, G < 80, B < 80). Neutral backdrop pixels,
//     transparent or faded gray, never qualify.
// 2.  **Single Scan**: The raster is scanned once, left-to-right and top-to-bottom.
//     A `visited` grid covers every position the scan or a fill has touched, marked
//     or not, so each pixel is inspected at most once and the whole pass is linear.
// 3.  **Region Growing**: An unvisited marked pixel seeds an iterative flood fill over
//     its 4-connected (up/down/left/right, never diagonal) marked neighbours, using
//     an explicit stack so large regions cannot exhaust the call stack.
// 4.  **Noise Filter**: Only clusters whose pixel count reaches `min_region_size` are
//     reported. Smaller clusters stay visible in the raster and in the raw mismatch
//     count; they just do not count as regions.
// 5.  **Stateless Utility**: Like the diff engine, this is pure in-memory CPU work
//     with no knowledge of previous comparisons.

use crate::core_modules::pixel::pixel::Pixel;
use crate::core_modules::raster::RasterImage;
use crate::core_modules::smart_blob::{Point, SmartBlob};

pub mod blob_detector {
    use super::*; // Make structs from parent module available.

    /// Noise filter used when the configuration does not name one.
    pub const DEFAULT_MIN_REGION_SIZE: usize = 300;

    /// Whether a difference-raster pixel carries the difference color.
    #[inline]
    pub fn is_marked(pixel: Pixel) -> bool {
        pixel.red > 200 && pixel.green < 80 && pixel.blue < 80
    }

    /// Finds every difference region of at least `min_region_size` pixels.
    pub fn find_regions(diff_raster: &RasterImage, min_region_size: usize) -> Vec<SmartBlob> {
        let width = diff_raster.width();
        let height = diff_raster.height();
        let mut visited = vec![false; diff_raster.pixel_count()];
        let mut regions: Vec<SmartBlob> = Vec::new();

        for y in 0..height {
            for x in 0..width {
                let index = y as usize * width as usize + x as usize;
                if visited[index] {
                    continue;
                }
                visited[index] = true;
                if !is_marked(diff_raster.pixel(x, y)) {
                    continue;
                }

                let region = grow_region(Point { x, y }, diff_raster, &mut visited, regions.len() as u64);
                if region.pixel_count >= min_region_size {
                    regions.push(region);
                }
            }
        }

        regions
    }

    /// Number of difference regions of at least `min_region_size` pixels.
    pub fn count_regions(diff_raster: &RasterImage, min_region_size: usize) -> usize {
        find_regions(diff_raster, min_region_size).len()
    }

    /// Depth-first fill from an already-visited marked `seed`.
    fn grow_region(seed: Point, diff_raster: &RasterImage, visited: &mut [bool], region_id: u64) -> SmartBlob {
        let width = diff_raster.width() as i64;
        let height = diff_raster.height() as i64;
        let mut stack: Vec<Point> = vec![seed];

        let mut pixel_count = 0usize;
        let (mut min_x, mut min_y) = (seed.x, seed.y);
        let (mut max_x, mut max_y) = (seed.x, seed.y);
        let (mut sum_x, mut sum_y) = (0.0f64, 0.0f64);

        while let Some(current) = stack.pop() {
            pixel_count += 1;
            min_x = min_x.min(current.x);
            min_y = min_y.min(current.y);
            max_x = max_x.max(current.x);
            max_y = max_y.max(current.y);
            sum_x += current.x as f64;
            sum_y += current.y as f64;

            // Check all 4 direct neighbors (not diagonals).
            for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if nx < 0 || nx >= width || ny < 0 || ny >= height {
                    continue;
                }

                let neighbor_index = (ny * width + nx) as usize;
                if visited[neighbor_index] {
                    continue;
                }
                visited[neighbor_index] = true;

                let neighbor = Point {
                    x: nx as u32,
                    y: ny as u32,
                };
                if is_marked(diff_raster.pixel(neighbor.x, neighbor.y)) {
                    stack.push(neighbor);
                }
            }
        }

        SmartBlob {
            id: region_id,
            bounding_box: (Point { x: min_x, y: min_y }, Point { x: max_x, y: max_y }),
            pixel_count,
            center_of_mass: (sum_x / pixel_count as f64, sum_y / pixel_count as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::blob_detector::*;
    use crate::core_modules::pixel::pixel::Pixel;
    use crate::core_modules::pixel_diff::pixel_diff::{DIFF_COLOR, DiffOptions, diff};
    use crate::core_modules::raster::RasterImage;

    fn blank(width: u32, height: u32) -> RasterImage {
        RasterImage::filled(width, height, Pixel::TRANSPARENT)
    }

    fn mark(raster: &mut RasterImage, points: &[(u32, u32)]) {
        for &(x, y) in points {
            raster.set_pixel(x, y, DIFF_COLOR);
        }
    }

    fn block(x0: u32, y0: u32, size: u32) -> Vec<(u32, u32)> {
        (y0..y0 + size)
            .flat_map(|y| (x0..x0 + size).map(move |x| (x, y)))
            .collect()
    }

    /// 400 isolated pixels on a stride-4 lattice.
    fn scattered() -> Vec<(u32, u32)> {
        (0..20)
            .flat_map(|j| (0..20).map(move |i| (10 + i * 4, 10 + j * 4)))
            .collect()
    }

    #[test]
    fn solid_block_is_one_region() {
        let mut raster = blank(100, 100);
        mark(&mut raster, &block(30, 30, 20));
        let regions = find_regions(&raster, 300);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.pixel_count, 400);
        assert_eq!((region.width(), region.height()), (20, 20));
        assert_eq!(region.center_of_mass, (39.5, 39.5));
    }

    #[test]
    fn scattered_pixels_are_filtered_as_noise() {
        let mut raster = blank(100, 100);
        mark(&mut raster, &scattered());
        assert_eq!(count_regions(&raster, 300), 0);
        assert_eq!(count_regions(&raster, 1), 400);
    }

    #[test]
    fn zero_minimum_counts_every_isolated_pixel() {
        let mut raster = blank(10, 10);
        mark(&mut raster, &[(0, 0), (9, 9), (5, 5)]);
        assert_eq!(count_regions(&raster, 0), 3);
    }

    #[test]
    fn diagonal_neighbours_are_not_connected() {
        let mut raster = blank(5, 5);
        mark(&mut raster, &[(0, 0), (1, 1), (2, 2), (3, 3)]);
        assert_eq!(count_regions(&raster, 1), 4);
    }

    #[test]
    fn concave_shapes_are_a_single_region() {
        let mut raster = blank(10, 10);
        // A "U": two columns joined along the bottom row.
        let mut points: Vec<(u32, u32)> = (0..8).map(|y| (1, y)).collect();
        points.extend((0..8).map(|y| (7, y)));
        points.extend((1..=7).map(|x| (x, 8)));
        mark(&mut raster, &points);
        let regions = find_regions(&raster, 1);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].pixel_count, 8 + 8 + 7);
    }

    #[test]
    fn unmarked_raster_has_no_regions() {
        assert_eq!(count_regions(&blank(64, 64), 0), 0);
    }

    #[test]
    fn large_regions_do_not_recurse() {
        let mut raster = blank(600, 600);
        mark(&mut raster, &block(0, 0, 600));
        let regions = find_regions(&raster, 300);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].pixel_count, 360_000);
    }

    #[test]
    fn region_count_never_exceeds_mismatch_count() {
        let baseline = RasterImage::filled(60, 60, Pixel::new(255, 255, 255, 255));
        let mut actual = baseline.clone();
        for (x, y) in block(5, 5, 10).into_iter().chain([(40, 40), (42, 40), (50, 55)]) {
            actual.set_pixel(x, y, Pixel::new(0, 0, 0, 255));
        }
        let outcome = diff(&baseline, &actual, &DiffOptions::new(0.1).unwrap()).unwrap();
        for min_region_size in [0, 1, 2, 50, 100, 101] {
            let regions = count_regions(&outcome.diff_raster, min_region_size);
            assert!(regions as u64 <= outcome.mismatch_count);
        }
        assert_eq!(count_regions(&outcome.diff_raster, 0), 4);
        assert_eq!(count_regions(&outcome.diff_raster, 100), 1);
        assert_eq!(count_regions(&outcome.diff_raster, 101), 0);
    }
}
