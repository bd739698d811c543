use glam::Vec3;
use ndarray::ArrayView3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Map a normalized coordinate onto continuous texel space using the
    /// texel-centre convention of GPU samplers, clamped to the edge texels.
    #[inline]
    pub(crate) fn texel_coordinate(coord: f32, size: usize) -> f32 {
        let texel = coord * size as f32 - 0.5;
        texel.max(0.0).min((size - 1) as f32)
    }

    /// Trilinear interpolation at a continuous (z, y, x) texel position.
    /// Positions must already be clamped to the volume.
    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<u8>, z: f32, y: f32, x: f32) -> f32 {
        let (depth, height, width) = volume.dim();

        let z0 = z.floor() as usize;
        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f32;
        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;
        let one_minus_dz = 1.0 - dz;

        let at = |z: usize, y: usize, x: usize| f32::from(volume[[z, y, x]]);

        let c00 = at(z0, y0, x0).mul_add(one_minus_dx, at(z0, y0, x1) * dx);
        let c01 = at(z0, y1, x0).mul_add(one_minus_dx, at(z0, y1, x1) * dx);
        let c10 = at(z1, y0, x0).mul_add(one_minus_dx, at(z1, y0, x1) * dx);
        let c11 = at(z1, y1, x0).mul_add(one_minus_dx, at(z1, y1, x1) * dx);

        let c0 = c00.mul_add(one_minus_dy, c01 * dy);
        let c1 = c10.mul_add(one_minus_dy, c11 * dy);

        c0.mul_add(one_minus_dz, c1 * dz)
    }

    /// Central difference along each texture axis (x, y, z).
    pub(crate) fn central_difference(sample: impl Fn(Vec3) -> f32, at: Vec3, step: f32) -> Vec3 {
        Vec3::new(
            sample(at + Vec3::X * step) - sample(at - Vec3::X * step),
            sample(at + Vec3::Y * step) - sample(at - Vec3::Y * step),
            sample(at + Vec3::Z * step) - sample(at - Vec3::Z * step),
        )
    }
}
