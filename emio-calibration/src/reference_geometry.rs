use emio_core::{PointCoordinates, Real};
use serde::{Deserialize, Serialize};

/// Physical size of the calibration fixture, in millimetres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardDimensions {
    pub width: Real,
    pub thickness: Real,
    pub depth: Real,
}

impl Default for BoardDimensions {
    fn default() -> Self {
        Self {
            width: 100.0,
            thickness: 3.0,
            depth: 100.0,
        }
    }
}

/// Where the calibration anchors sit in the robot frame. Anchor `i` pairs
/// with the `i`-th persisted correspondence.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceGeometry {
    anchors: Vec<PointCoordinates>,
}

impl ReferenceGeometry {
    pub fn from_points(anchors: Vec<PointCoordinates>) -> Self {
        Self { anchors }
    }

    /// Nine anchors of a square board seen as a diamond: the four vertices
    /// at half the diagonal, the four edge midpoints, then the centre, all
    /// on the board's top face.
    pub fn diamond_board(dims: &BoardDimensions) -> Self {
        let h = (dims.width * dims.width + dims.depth * dims.depth).sqrt() / 2.0;
        let y = dims.thickness;
        let vertices = [
            PointCoordinates::new(-h, y, 0.0),
            PointCoordinates::new(0.0, y, -h),
            PointCoordinates::new(h, y, 0.0),
            PointCoordinates::new(0.0, y, h),
        ];

        let mut anchors = vertices.to_vec();
        for i in 0..4 {
            anchors.push((vertices[i] + vertices[(i + 1) % 4]) / 2.0);
        }
        anchors.push(PointCoordinates::new(0.0, y, 0.0));
        Self { anchors }
    }

    /// Eight anchors whose index is a bit pattern `(x, y, z)` selecting a
    /// corner of a box of the given dimensions centred on the origin.
    pub fn id_encoded(dims: &BoardDimensions) -> Self {
        let size = PointCoordinates::new(dims.width, dims.thickness, dims.depth);
        let anchors = (0..8u32)
            .map(|id| {
                let bits = PointCoordinates::new(
                    (id & 1) as Real,
                    ((id >> 1) & 1) as Real,
                    ((id >> 2) & 1) as Real,
                );
                (bits - PointCoordinates::repeat(0.5)).component_mul(&size)
            })
            .collect();
        Self { anchors }
    }

    pub fn anchors(&self) -> &[PointCoordinates] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// Deserialisable choice of geometry, so deployments inject theirs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum GeometryCfg {
    DiamondBoard { dimensions: BoardDimensions },
    IdEncoded { dimensions: BoardDimensions },
    Points { anchors: Vec<[Real; 3]> },
}

impl Default for GeometryCfg {
    fn default() -> Self {
        GeometryCfg::DiamondBoard {
            dimensions: BoardDimensions::default(),
        }
    }
}

impl GeometryCfg {
    pub fn build(&self) -> ReferenceGeometry {
        match self {
            GeometryCfg::DiamondBoard { dimensions } => ReferenceGeometry::diamond_board(dimensions),
            GeometryCfg::IdEncoded { dimensions } => ReferenceGeometry::id_encoded(dimensions),
            GeometryCfg::Points { anchors } => ReferenceGeometry::from_points(
                anchors
                    .iter()
                    .map(|[x, y, z]| PointCoordinates::new(*x, *y, *z))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn diamond_board_matches_the_fixture() {
        let geometry = ReferenceGeometry::diamond_board(&BoardDimensions::default());
        let a = geometry.anchors();
        assert_eq!(a.len(), 9);

        let h = 50.0 * 2f64.sqrt();
        assert_relative_eq!(a[0], PointCoordinates::new(-h, 3.0, 0.0));
        assert_relative_eq!(a[3], PointCoordinates::new(0.0, 3.0, h));
        assert_relative_eq!(a[4], PointCoordinates::new(-h / 2.0, 3.0, -h / 2.0));
        assert_relative_eq!(a[7], PointCoordinates::new(-h / 2.0, 3.0, h / 2.0));
        assert_relative_eq!(a[8], PointCoordinates::new(0.0, 3.0, 0.0));
        assert!(a.iter().all(|p| p.y == 3.0));
    }

    #[test]
    fn id_bits_select_box_corners() {
        let dims = BoardDimensions {
            width: 200.0,
            thickness: 40.0,
            depth: 100.0,
        };
        let geometry = ReferenceGeometry::id_encoded(&dims);
        assert_eq!(geometry.len(), 8);
        assert_relative_eq!(geometry.anchors()[0], PointCoordinates::new(-100.0, -20.0, -50.0));
        assert_relative_eq!(geometry.anchors()[5], PointCoordinates::new(100.0, -20.0, 50.0));
        assert_relative_eq!(geometry.anchors()[6], PointCoordinates::new(-100.0, 20.0, 50.0));
        let centroid = geometry.anchors().iter().sum::<PointCoordinates>() / 8.0;
        assert_relative_eq!(centroid, PointCoordinates::zeros());
    }

    #[test]
    fn geometry_cfg_builds_injected_points() {
        let cfg = GeometryCfg::Points {
            anchors: vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
        };
        let geometry = cfg.build();
        assert_eq!(geometry.len(), 2);
        assert_eq!(geometry.anchors()[1], PointCoordinates::new(4.0, 5.0, 6.0));
        assert_eq!(GeometryCfg::default().build().len(), 9);
    }
}
