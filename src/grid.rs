// Spatial lookup grids the orientator can consult besides the field aggregator

use crate::config::GridSpec;
use crate::segment::Segment;
use crate::types::Vec3;

/// Anything that can report which way local crowding increases.
pub trait DensityField: Send + Sync {
    /// Unit vector toward increasing density, or zero where there is no signal.
    fn gradient_at(&self, point: Vec3) -> Vec3;

    /// Called by the simulation after every step. Externally managed grids
    /// may keep the default and update themselves.
    fn refresh(&mut self, _segments: &[Segment]) {}
}

/// A spatially varying preferred growth direction.
pub trait DirectionField: Send + Sync {
    /// Unit bias direction at `point`, or zero where the field has no opinion.
    fn direction_at(&self, point: Vec3) -> Vec3;
}

/// 2D histogram of segment end points on the XY plane, centred on the origin.
#[derive(Clone, Debug)]
pub struct DensityGrid {
    pub width: f64,
    pub height: f64,
    pub resolution: f64,
    // rows index y, columns index x
    cells: Vec<Vec<u32>>,
}

impl DensityGrid {
    /// # Panics
    ///
    /// If the resolution is not a positive finite number.
    pub fn new(spec: GridSpec) -> Self {
        assert!(
            spec.resolution > 0.0 && spec.resolution.is_finite(),
            "density grid resolution must be positive, got {}",
            spec.resolution
        );
        let rows = (spec.height / spec.resolution) as usize;
        let cols = (spec.width / spec.resolution) as usize;
        Self {
            width: spec.width,
            height: spec.height,
            resolution: spec.resolution,
            cells: vec![vec![0; cols]; rows],
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    #[inline]
    fn cell_of(&self, point: Vec3) -> Option<(usize, usize)> {
        let i = ((point.y + self.height / 2.0) / self.resolution).floor();
        let j = ((point.x + self.width / 2.0) / self.resolution).floor();
        if i < 0.0 || j < 0.0 {
            return None;
        }
        let (i, j) = (i as usize, j as usize);
        (i < self.rows() && j < self.cols()).then_some((i, j))
    }

    /// Counts `point` in its cell. Points off the grid are dropped.
    pub fn add_point(&mut self, point: Vec3) {
        if let Some((i, j)) = self.cell_of(point) {
            self.cells[i][j] += 1;
        }
    }

    pub fn density_at(&self, point: Vec3) -> f64 {
        self.cell_of(point)
            .map_or(0.0, |(i, j)| self.cells[i][j] as f64)
    }

    pub fn clear(&mut self) {
        for row in &mut self.cells {
            row.fill(0);
        }
    }

    /// Rebuilds the counts from every segment's end, dead or alive.
    pub fn update_from(&mut self, segments: &[Segment]) {
        self.clear();
        for segment in segments {
            self.add_point(segment.end());
        }
        tracing::trace!(points = segments.len(), "density grid rebuilt");
    }
}

impl DensityField for DensityGrid {
    // Central differences; border cells have no gradient
    fn gradient_at(&self, point: Vec3) -> Vec3 {
        let Some((i, j)) = self.cell_of(point) else {
            return Vec3::ZERO;
        };
        if i < 1 || j < 1 || i + 1 >= self.rows() || j + 1 >= self.cols() {
            return Vec3::ZERO;
        }
        let c = &self.cells;
        let d_dx = (c[i][j + 1] as f64 - c[i][j - 1] as f64) / (2.0 * self.resolution);
        let d_dy = (c[i + 1][j] as f64 - c[i - 1][j] as f64) / (2.0 * self.resolution);
        Vec3::new(d_dx, d_dy, 0.0).normalized()
    }

    fn refresh(&mut self, segments: &[Segment]) {
        self.update_from(segments);
    }
}

/// 3D voxel grid of unit bias directions, centred on the origin. Every voxel
/// starts out pointing along `+X`.
#[derive(Clone, Debug)]
pub struct AnisotropyGrid {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub resolution: f64,
    dims: (usize, usize, usize),
    cells: Vec<Vec3>,
}

impl AnisotropyGrid {
    /// # Panics
    ///
    /// If the resolution is not a positive finite number.
    pub fn new(width: f64, height: f64, depth: f64, resolution: f64) -> Self {
        assert!(
            resolution > 0.0 && resolution.is_finite(),
            "anisotropy grid resolution must be positive, got {resolution}"
        );
        let dims = (
            (width / resolution) as usize,
            (height / resolution) as usize,
            (depth / resolution) as usize,
        );
        Self {
            width,
            height,
            depth,
            resolution,
            dims,
            cells: vec![Vec3::X; dims.0 * dims.1 * dims.2],
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> Option<usize> {
        let (nx, ny, nz) = self.dims;
        (i < nx && j < ny && k < nz).then(|| (i * ny + j) * nz + k)
    }

    fn voxel_of(&self, point: Vec3) -> Option<usize> {
        let i = ((point.x + self.width / 2.0) / self.resolution).floor();
        let j = ((point.y + self.height / 2.0) / self.resolution).floor();
        let k = ((point.z + self.depth / 2.0) / self.resolution).floor();
        if i < 0.0 || j < 0.0 || k < 0.0 {
            return None;
        }
        self.index(i as usize, j as usize, k as usize)
    }

    pub fn set_uniform_direction(&mut self, direction: Vec3) {
        let unit = direction.normalized();
        self.cells.fill(unit);
    }

    /// Sets one voxel. Returns false when the indices are off the grid.
    pub fn set_direction(&mut self, i: usize, j: usize, k: usize, direction: Vec3) -> bool {
        match self.index(i, j, k) {
            Some(idx) => {
                self.cells[idx] = direction.normalized();
                true
            }
            None => false,
        }
    }
}

impl DirectionField for AnisotropyGrid {
    fn direction_at(&self, point: Vec3) -> Vec3 {
        self.voxel_of(point)
            .map_or(Vec3::ZERO, |idx| self.cells[idx].normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, SegmentId};

    fn grid() -> DensityGrid {
        DensityGrid::new(GridSpec {
            width: 10.0,
            height: 10.0,
            resolution: 1.0,
        })
    }

    #[test]
    fn points_land_in_centred_cells() {
        let mut g = grid();
        assert_eq!((g.rows(), g.cols()), (10, 10));
        g.add_point(Vec3::new(0.2, 0.3, 7.0));
        g.add_point(Vec3::new(0.9, 0.1, -3.0));
        g.add_point(Vec3::new(50.0, 0.0, 0.0));
        assert_eq!(g.density_at(Vec3::new(0.5, 0.5, 0.0)), 2.0);
        assert_eq!(g.density_at(Vec3::new(-0.5, 0.5, 0.0)), 0.0);
        assert_eq!(g.density_at(Vec3::new(-50.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn gradient_points_toward_crowding() {
        let mut g = grid();
        for _ in 0..4 {
            g.add_point(Vec3::new(1.5, 0.5, 0.0));
        }
        let grad = g.gradient_at(Vec3::new(0.5, 0.5, 0.0));
        assert!(grad.distance_to(Vec3::X) < 1e-12);
        // border cells report nothing
        assert_eq!(g.gradient_at(Vec3::new(-4.5, -4.5, 0.0)), Vec3::ZERO);
    }

    #[test]
    fn update_replaces_previous_counts() {
        let mut g = grid();
        g.add_point(Vec3::new(3.5, 3.5, 0.0));
        let segments = vec![
            Segment::seed(SegmentId(0), Vec3::ZERO, Vec3::Z, Color::default()),
            Segment::seed(SegmentId(1), Vec3::new(-2.5, 1.5, 0.0), Vec3::Z, Color::default()),
        ];
        g.refresh(&segments);
        assert_eq!(g.density_at(Vec3::new(3.5, 3.5, 0.0)), 0.0);
        assert_eq!(g.density_at(Vec3::ZERO), 1.0);
        assert_eq!(g.density_at(Vec3::new(-2.5, 1.5, 0.0)), 1.0);
    }

    #[test]
    fn anisotropy_defaults_to_x_and_is_silent_outside() {
        let mut a = AnisotropyGrid::new(20.0, 20.0, 20.0, 5.0);
        assert_eq!(a.dims(), (4, 4, 4));
        assert_eq!(a.direction_at(Vec3::ZERO), Vec3::X);
        assert_eq!(a.direction_at(Vec3::new(0.0, 0.0, 11.0)), Vec3::ZERO);

        a.set_uniform_direction(Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(a.direction_at(Vec3::new(-9.0, 9.0, 0.0)), Vec3::Y);

        assert!(a.set_direction(0, 0, 0, Vec3::new(0.0, 0.0, -2.0)));
        assert!(!a.set_direction(4, 0, 0, Vec3::Z));
        assert_eq!(a.direction_at(Vec3::new(-9.0, -9.0, -9.0)), Vec3::DOWN);
    }

    #[test]
    #[should_panic(expected = "resolution must be positive")]
    fn anisotropy_grid_refuses_zero_resolution() {
        AnisotropyGrid::new(10.0, 10.0, 10.0, 0.0);
    }

    #[test]
    #[should_panic(expected = "resolution must be positive")]
    fn density_grid_refuses_negative_resolution() {
        DensityGrid::new(GridSpec {
            width: 10.0,
            height: 10.0,
            resolution: -1.0,
        });
    }
}
