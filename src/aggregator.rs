//! Composes many field sources into one queryable field.

use rayon::prelude::*;

use crate::field::{FieldSource, SegmentSource, SourceId};
use crate::types::{SegmentId, Vec3};

struct FieldEntry {
    id: SourceId,
    source: Box<dyn FieldSource>,
}

/// One independent query for [`FieldAggregator::compute_field_batch`].
#[derive(Clone, Debug, Default)]
pub struct FieldRequest {
    pub point: Vec3,
    pub exclude: Vec<SourceId>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldResponse {
    pub field: f64,
    pub gradient: Vec3,
}

/// Sum of all registered sources, with optional neighbour-radius culling.
///
/// Fixed sources persist; segment sources are replaced wholesale by
/// [`set_segment_sources`](Self::set_segment_sources) whenever the network is rebuilt.
#[derive(Default)]
pub struct FieldAggregator {
    entries: Vec<FieldEntry>,
    neighbour_radius: Option<f64>,
    next_fixed: u32,
}

impl FieldAggregator {
    pub fn new(neighbour_radius: Option<f64>) -> Self {
        Self {
            neighbour_radius: neighbour_radius.filter(|r| *r > 0.0),
            ..Self::default()
        }
    }

    pub fn neighbour_radius(&self) -> Option<f64> {
        self.neighbour_radius
    }

    pub fn set_neighbour_radius(&mut self, radius: Option<f64>) {
        self.neighbour_radius = radius.filter(|r| *r > 0.0);
    }

    /// Registers a persistent source and returns its identity.
    pub fn add_source(&mut self, source: impl FieldSource + 'static) -> SourceId {
        let id = SourceId::Fixed(self.next_fixed);
        self.next_fixed += 1;
        self.entries.push(FieldEntry {
            id,
            source: Box::new(source),
        });
        id
    }

    /// Returns false when no source has that id.
    pub fn remove_source(&mut self, id: SourceId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Drops every segment-backed source and installs `sources` in their place.
    pub fn set_segment_sources(&mut self, sources: impl IntoIterator<Item = (SegmentId, SegmentSource)>) {
        self.entries
            .retain(|e| !matches!(e.id, SourceId::Segment(_)));
        self.entries
            .extend(sources.into_iter().map(|(id, source)| FieldEntry {
                id: SourceId::Segment(id),
                source: Box::new(source),
            }));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn segment_source_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.id, SourceId::Segment(_)))
            .count()
    }

    fn active<'a>(
        &'a self,
        point: Vec3,
        exclude: &'a [SourceId],
    ) -> impl Iterator<Item = &'a FieldEntry> + 'a {
        let radius = self.neighbour_radius;
        self.entries.iter().filter(move |e| {
            if exclude.contains(&e.id) {
                return false;
            }
            match (radius, e.source.anchor()) {
                (Some(r), Some(anchor)) => point.distance_to(anchor) <= r,
                _ => true,
            }
        })
    }

    /// Scalar sum and unit gradient at `point`, skipping `exclude` and
    /// sources outside the neighbour radius. A vanishing gradient stays zero.
    pub fn compute_field(&self, point: Vec3, exclude: &[SourceId]) -> (f64, Vec3) {
        let mut total = 0.0;
        let mut gradient = Vec3::ZERO;
        for entry in self.active(point, exclude) {
            total += entry.source.field(point);
            gradient += entry.source.gradient(point);
        }
        (total, gradient.normalized())
    }

    /// Scalar part of [`compute_field`](Self::compute_field) only.
    pub fn field_value(&self, point: Vec3, exclude: &[SourceId]) -> f64 {
        self.active(point, exclude)
            .map(|e| e.source.field(point))
            .sum()
    }

    /// Hyphal density: the summed contribution of segment sources only.
    pub fn segment_density(&self, point: Vec3, exclude: &[SourceId]) -> f64 {
        self.active(point, exclude)
            .filter(|e| matches!(e.id, SourceId::Segment(_)))
            .map(|e| e.source.field(point))
            .sum()
    }

    /// Six-point finite-difference Laplacian:
    /// `sum(f(p +/- eps * axis) - f(p)) / eps^2`.
    pub fn compute_field_curvature(&self, point: Vec3, epsilon: f64) -> f64 {
        self.compute_field_curvature_excluding(point, epsilon, &[])
    }

    pub fn compute_field_curvature_excluding(
        &self,
        point: Vec3,
        epsilon: f64,
        exclude: &[SourceId],
    ) -> f64 {
        let center = self.field_value(point, exclude);
        let mut sum = 0.0;
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            for sign in [1.0, -1.0] {
                sum += self.field_value(point + axis * (sign * epsilon), exclude) - center;
            }
        }
        sum / (epsilon * epsilon)
    }

    /// Evaluates independent requests in parallel. Results keep request order.
    pub fn compute_field_batch(&self, requests: &[FieldRequest]) -> Vec<FieldResponse> {
        requests
            .par_iter()
            .map(|req| {
                let (field, gradient) = self.compute_field(req.point, &req.exclude);
                FieldResponse { field, gradient }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{NutrientSource, PointSource};

    #[test]
    fn empty_aggregator_is_silent() {
        let agg = FieldAggregator::new(None);
        let (field, gradient) = agg.compute_field(Vec3::new(3.0, -1.0, 2.0), &[]);
        assert_eq!(field, 0.0);
        assert_eq!(gradient, Vec3::ZERO);
    }

    #[test]
    fn contributions_add_and_gradient_is_unit() {
        let mut agg = FieldAggregator::new(None);
        agg.add_source(PointSource::new(Vec3::ZERO, 1.0, 1.0));
        agg.add_source(PointSource::new(Vec3::new(4.0, 0.0, 0.0), 1.0, 1.0));
        let (field, gradient) = agg.compute_field(Vec3::new(1.0, 0.0, 0.0), &[]);
        assert!((field - (0.5 + 0.25)).abs() < 1e-12);
        assert!((gradient.length() - 1.0).abs() < 1e-12);
        // the nearer source dominates: pushed away from the origin
        assert!(gradient.x > 0.0);
    }

    #[test]
    fn excluded_segment_is_ignored() {
        let mut agg = FieldAggregator::new(None);
        agg.set_segment_sources([
            (SegmentId(0), SegmentSource::new(Vec3::ZERO, Vec3::Z, 1.0, 1.0)),
            (SegmentId(1), SegmentSource::new(Vec3::X, Vec3::X + Vec3::Z, 1.0, 1.0)),
        ]);
        let p = Vec3::Z;
        let all = agg.field_value(p, &[]);
        let without_self = agg.field_value(p, &[SourceId::Segment(SegmentId(0))]);
        assert!((all - without_self - 1.0).abs() < 1e-12);
        assert!((without_self - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rebuild_replaces_only_segment_sources() {
        let mut agg = FieldAggregator::new(None);
        let nutrient = agg.add_source(NutrientSource::attractor(Vec3::ZERO, 1.0, 1.0));
        agg.set_segment_sources([(SegmentId(0), SegmentSource::new(Vec3::ZERO, Vec3::Z, 1.0, 1.0))]);
        agg.set_segment_sources([
            (SegmentId(1), SegmentSource::new(Vec3::ZERO, Vec3::X, 1.0, 1.0)),
            (SegmentId(2), SegmentSource::new(Vec3::ZERO, Vec3::Y, 1.0, 1.0)),
        ]);
        assert_eq!(agg.len(), 3);
        assert_eq!(agg.segment_source_count(), 2);
        assert_eq!(nutrient, SourceId::Fixed(0));

        assert!(agg.remove_source(nutrient));
        assert!(!agg.remove_source(nutrient));
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn neighbour_radius_culls_far_sources() {
        let mut agg = FieldAggregator::new(Some(5.0));
        agg.add_source(PointSource::new(Vec3::new(100.0, 0.0, 0.0), 1.0, 0.0));
        agg.add_source(PointSource::new(Vec3::new(1.0, 0.0, 0.0), 1.0, 0.0));
        assert_eq!(agg.field_value(Vec3::ZERO, &[]), 1.0);
        agg.set_neighbour_radius(None);
        assert_eq!(agg.field_value(Vec3::ZERO, &[]), 2.0);
    }

    #[test]
    fn segment_density_skips_fixed_sources() {
        let mut agg = FieldAggregator::new(None);
        agg.add_source(PointSource::new(Vec3::ZERO, 10.0, 1.0));
        agg.set_segment_sources([(SegmentId(3), SegmentSource::new(Vec3::ZERO, Vec3::Z, 1.0, 1.0))]);
        assert!((agg.segment_density(Vec3::ZERO, &[]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn curvature_of_uniform_field_is_zero_and_peak_is_negative() {
        let mut agg = FieldAggregator::new(None);
        agg.add_source(PointSource::new(Vec3::ZERO, 1.0, 0.0));
        assert!(agg.compute_field_curvature(Vec3::new(2.0, 3.0, 4.0), 1.0).abs() < 1e-12);

        let mut peaked = FieldAggregator::new(None);
        peaked.add_source(PointSource::new(Vec3::ZERO, 1.0, 1.0));
        // every neighbour of the peak is lower: (0.5 - 1) * 6 / 1
        assert!((peaked.compute_field_curvature(Vec3::ZERO, 1.0) + 3.0).abs() < 1e-12);
    }

    #[test]
    fn batch_matches_sequential_queries() {
        let mut agg = FieldAggregator::new(None);
        agg.add_source(PointSource::new(Vec3::ZERO, 1.0, 1.0));
        agg.add_source(NutrientSource::repellent(Vec3::new(5.0, 5.0, 0.0), 2.0, 0.3));
        let requests: Vec<FieldRequest> = (0..32)
            .map(|i| FieldRequest {
                point: Vec3::new(i as f64 * 0.5, 1.0, -2.0),
                exclude: if i % 2 == 0 { vec![SourceId::Fixed(1)] } else { vec![] },
            })
            .collect();
        let batch = agg.compute_field_batch(&requests);
        for (req, resp) in requests.iter().zip(&batch) {
            let (field, gradient) = agg.compute_field(req.point, &req.exclude);
            assert_eq!(resp.field, field);
            assert_eq!(resp.gradient, gradient);
        }
    }
}
