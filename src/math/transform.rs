//! Tile transforms between voxel, texture and stage coordinates

use crate::core::types::{DMat4, DVec3, UVec3};

/// Stage coordinates are stored in nanometers; everything public is in micrometers.
pub const NANOMETERS_PER_MICROMETER: f64 = 1000.0;

/// The eight corners of an axis-aligned box.
///
/// Order is x fastest, then y, then z: index bit 0 selects max x, bit 1 max y,
/// bit 2 max z. Brick corner lists everywhere use this order.
pub fn box_corners(min: DVec3, max: DVec3) -> [DVec3; 8] {
    std::array::from_fn(|i| {
        DVec3::new(
            if i & 1 != 0 { max.x } else { min.x },
            if i & 2 != 0 { max.y } else { min.y },
            if i & 4 != 0 { max.z } else { min.z },
        )
    })
}

/// Homogeneous 5x5 voxel-to-stage transform of a manifest tile.
///
/// Rows and columns are (x, y, z, channel, w); positions are in nanometers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileTransform {
    rows: [[f64; 5]; 5],
}

impl TileTransform {
    /// Parse a row-major list of exactly 25 values
    pub fn from_row_major(values: &[f64]) -> Option<Self> {
        if values.len() != 25 {
            return None;
        }
        let rows = std::array::from_fn(|i| std::array::from_fn(|j| values[5 * i + j]));
        Some(Self { rows })
    }

    /// Pure scale-and-offset transform, handy for synthetic tiles
    pub fn from_scale_offset(voxel_nm: DVec3, origin_nm: DVec3) -> Self {
        let mut rows = [[0.0; 5]; 5];
        for axis in 0..3 {
            rows[axis][axis] = voxel_nm[axis];
            rows[axis][4] = origin_nm[axis];
        }
        rows[3][3] = 1.0;
        rows[4][4] = 1.0;
        Self { rows }
    }

    /// Row-major values, as stored in the manifest
    pub fn to_row_major(&self) -> [f64; 25] {
        std::array::from_fn(|k| self.rows[k / 5][k % 5])
    }

    /// 4x4 affine voxel-to-stage-nanometer matrix, channel row and column removed
    pub fn stage_nm_from_voxel(&self) -> DMat4 {
        const KEEP: [usize; 4] = [0, 1, 2, 4];
        let rows: [[f64; 4]; 4] = std::array::from_fn(|i| std::array::from_fn(|j| self.rows[KEEP[i]][KEEP[j]]));
        DMat4::from_cols_array_2d(&rows).transpose()
    }

    /// Stage position in micrometers of a (possibly fractional) voxel corner
    pub fn voxel_to_stage_um(&self, voxel: DVec3) -> DVec3 {
        let column = [voxel.x, voxel.y, voxel.z, 0.0, 1.0];
        let mut out = [0.0; 3];
        for (i, value) in out.iter_mut().enumerate() {
            *value = (0..5).map(|j| self.rows[i][j] * column[j]).sum::<f64>() / NANOMETERS_PER_MICROMETER;
        }
        DVec3::from_array(out)
    }

    /// Stage positions in micrometers of the raster corners of a `dims` sized tile
    pub fn raster_corners_um(&self, dims: UVec3) -> [DVec3; 8] {
        box_corners(DVec3::ZERO, dims.as_dvec3()).map(|voxel| self.voxel_to_stage_um(voxel))
    }

    /// Matrix taking normalized texture coordinates [0,1]^3 to stage micrometers
    pub fn world_from_texcoord(&self, dims: UVec3) -> DMat4 {
        let um_from_nm = DMat4::from_scale(DVec3::splat(1.0 / NANOMETERS_PER_MICROMETER));
        let voxel_from_texcoord = DMat4::from_scale(dims.as_dvec3());
        um_from_nm * self.stage_nm_from_voxel() * voxel_from_texcoord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sample tile from a tilebase cache, flipped x and y axes
    fn sample_transform() -> TileTransform {
        TileTransform::from_row_major(&[
            -377.607422, 0.0, 0.0, 0.0, 85320872.0,
            0.0, -260.144531, 0.0, 0.0, 17912676.0,
            0.0, 0.485852, 995.024902, 0.0, 9909023.0,
            0.0, 0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 1.0,
        ])
        .unwrap()
    }

    #[test]
    fn test_box_corner_order() {
        let corners = box_corners(DVec3::ZERO, DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(corners[0], DVec3::ZERO);
        assert_eq!(corners[1], DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(corners[2], DVec3::new(0.0, 2.0, 0.0));
        assert_eq!(corners[4], DVec3::new(0.0, 0.0, 3.0));
        assert_eq!(corners[7], DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(TileTransform::from_row_major(&[0.0; 24]).is_none());
        assert!(TileTransform::from_row_major(&[0.0; 26]).is_none());
    }

    #[test]
    fn test_voxel_origin_maps_to_offset() {
        let t = sample_transform();
        let origin = t.voxel_to_stage_um(DVec3::ZERO);
        assert!((origin - DVec3::new(85320.872, 17912.676, 9909.023)).length() < 1e-9);
    }

    #[test]
    fn test_world_from_texcoord_matches_corners() {
        let t = sample_transform();
        let dims = UVec3::new(1024, 2048, 201);
        let m = t.world_from_texcoord(dims);

        let corners = t.raster_corners_um(dims);
        let far = m.transform_point3(DVec3::ONE);
        assert!((far - corners[7]).length() < 1e-6);
        let near = m.transform_point3(DVec3::ZERO);
        assert!((near - corners[0]).length() < 1e-6);
    }

    #[test]
    fn test_scale_offset_roundtrip_values() {
        let t = TileTransform::from_scale_offset(DVec3::new(250.0, 250.0, 1000.0), DVec3::new(1000.0, 0.0, 0.0));
        let values = t.to_row_major();
        assert_eq!(values[0], 250.0);
        assert_eq!(values[4], 1000.0);
        assert_eq!(values[18], 1.0);
        assert_eq!(t.voxel_to_stage_um(DVec3::new(4.0, 0.0, 1.0)), DVec3::new(2.0, 0.0, 1.0));
    }
}
