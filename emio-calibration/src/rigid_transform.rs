use emio_core::{PointCoordinates, Real};
use sophus::nalgebra::{Matrix3, Matrix4};

// relative size of the second singular value below which the source
// cloud is treated as a line
const COLLINEARITY_TOLERANCE: Real = 1e-12;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransformError {
    #[error("point sets differ in size: {source_len} source vs {target_len} target")]
    MismatchedSets { source_len: usize, target_len: usize },
    #[error("at least 3 correspondences are required, got {0}")]
    TooFewPoints(usize),
    #[error("source points are collinear or coincident")]
    Collinear,
    #[error("singular value decomposition did not converge")]
    DecompositionFailed,
}

/// A proper rotation followed by a translation, `p' = R·p + t`.
///
/// Built whole by [`estimate_rigid_transform`] or [`RigidTransform::new`];
/// there are no setters for the parts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RigidTransform {
    rotation: Matrix3<Real>,
    translation: PointCoordinates,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    pub fn new(rotation: Matrix3<Real>, translation: PointCoordinates) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), PointCoordinates::zeros())
    }

    pub fn rotation(&self) -> &Matrix3<Real> {
        &self.rotation
    }

    pub fn translation(&self) -> &PointCoordinates {
        &self.translation
    }

    pub fn apply(&self, point: &PointCoordinates) -> PointCoordinates {
        self.rotation * point + self.translation
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.transpose();
        Self::new(rotation, -(rotation * self.translation))
    }

    pub fn to_homogeneous(&self) -> Matrix4<Real> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

/// Least-squares rigid registration (Kabsch): finds `(R, t)` minimising
/// `Σ |R·source_i + t - target_i|²` with `det(R) = +1`.
pub fn estimate_rigid_transform(
    source: &[PointCoordinates],
    target: &[PointCoordinates],
) -> Result<RigidTransform, TransformError> {
    if source.len() != target.len() {
        return Err(TransformError::MismatchedSets {
            source_len: source.len(),
            target_len: target.len(),
        });
    }
    if source.len() < 3 {
        return Err(TransformError::TooFewPoints(source.len()));
    }

    let n = source.len() as Real;
    let centroid_source = source.iter().sum::<PointCoordinates>() / n;
    let centroid_target = target.iter().sum::<PointCoordinates>() / n;

    let mut spread = Matrix3::<Real>::zeros();
    let mut covariance = Matrix3::<Real>::zeros();
    for (s, t) in source.iter().zip(target) {
        let s = s - centroid_source;
        let t = t - centroid_target;
        spread += s * s.transpose();
        covariance += s * t.transpose();
    }

    let mut extent = spread.symmetric_eigenvalues();
    extent
        .as_mut_slice()
        .sort_by(|a, b| b.total_cmp(a));
    if extent[0] <= 0.0 || extent[1] <= COLLINEARITY_TOLERANCE * extent[0] {
        return Err(TransformError::Collinear);
    }

    let svd = covariance.svd(true, true);
    let u = svd.u.ok_or(TransformError::DecompositionFailed)?;
    let mut v_t = svd.v_t.ok_or(TransformError::DecompositionFailed)?;

    let mut rotation = v_t.transpose() * u.transpose();
    if rotation.determinant() < 0.0 {
        // flip the axis of least correlation to turn the reflection into a rotation
        let weakest = svd.singular_values.imin();
        log::debug!("registration produced a reflection, negating singular vector {weakest}");
        for col in 0..3 {
            v_t[(weakest, col)] = -v_t[(weakest, col)];
        }
        rotation = v_t.transpose() * u.transpose();
    }

    let translation = centroid_target - rotation * centroid_source;
    Ok(RigidTransform::new(rotation, translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sophus::nalgebra::Rotation3;

    fn cloud() -> Vec<PointCoordinates> {
        vec![
            PointCoordinates::new(0.0, 0.0, 0.0),
            PointCoordinates::new(120.0, 5.0, -3.0),
            PointCoordinates::new(-30.0, 80.0, 12.0),
            PointCoordinates::new(45.0, -60.0, 90.0),
            PointCoordinates::new(10.0, 25.0, -70.0),
        ]
    }

    fn moved(points: &[PointCoordinates], t: &RigidTransform) -> Vec<PointCoordinates> {
        points.iter().map(|p| t.apply(p)).collect()
    }

    #[test]
    fn recovers_known_motions() {
        let source = cloud();
        for (roll, pitch, yaw) in [(0.0, 0.0, 0.0), (0.3, -1.1, 2.4), (3.0, 0.2, -0.7)] {
            let truth = RigidTransform::new(
                Rotation3::from_euler_angles(roll, pitch, yaw).into_inner(),
                PointCoordinates::new(15.0, -305.5, 42.0),
            );
            let target = moved(&source, &truth);

            let estimated = estimate_rigid_transform(&source, &target).unwrap();
            assert_relative_eq!(estimated.rotation(), truth.rotation(), epsilon = 1e-9);
            assert_relative_eq!(estimated.translation(), truth.translation(), epsilon = 1e-7);
            assert_relative_eq!(estimated.rotation().determinant(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn minimal_triangle_is_enough() {
        let source = &cloud()[..3];
        let truth = RigidTransform::new(
            Rotation3::from_euler_angles(0.1, 0.2, 0.3).into_inner(),
            PointCoordinates::new(1.0, 2.0, 3.0),
        );
        let estimated = estimate_rigid_transform(source, &moved(source, &truth)).unwrap();
        assert_relative_eq!(estimated.rotation(), truth.rotation(), epsilon = 1e-9);
    }

    #[test]
    fn mirrored_target_still_yields_a_rotation() {
        let source = cloud();
        let mirrored: Vec<_> = source
            .iter()
            .map(|p| PointCoordinates::new(-p.x, p.y, p.z))
            .collect();

        let estimated = estimate_rigid_transform(&source, &mirrored).unwrap();
        assert_relative_eq!(estimated.rotation().determinant(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(
            estimated.rotation() * estimated.rotation().transpose(),
            Matrix3::identity(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let source = cloud();
        assert_eq!(
            estimate_rigid_transform(&source, &source[..4]),
            Err(TransformError::MismatchedSets {
                source_len: 5,
                target_len: 4
            })
        );
        assert_eq!(
            estimate_rigid_transform(&source[..2], &source[..2]),
            Err(TransformError::TooFewPoints(2))
        );

        let line: Vec<_> = (0..4)
            .map(|i| PointCoordinates::new(i as Real, 2.0 * i as Real, -(i as Real)))
            .collect();
        assert_eq!(
            estimate_rigid_transform(&line, &line),
            Err(TransformError::Collinear)
        );
    }

    #[test]
    fn inverse_undoes_the_transform() {
        let t = RigidTransform::new(
            Rotation3::from_euler_angles(-0.4, 0.9, 0.05).into_inner(),
            PointCoordinates::new(-8.0, 3.5, 100.0),
        );
        let p = PointCoordinates::new(7.0, -1.0, 2.0);
        assert_relative_eq!(t.inverse().apply(&t.apply(&p)), p, epsilon = 1e-9);

        let h = t.to_homogeneous();
        let mapped = h * p.push(1.0);
        assert_relative_eq!(mapped.xyz(), t.apply(&p), epsilon = 1e-9);
        assert_eq!(h[(3, 3)], 1.0);
    }
}
