// CIRCLE MASK - CPU reference of the fragment programs
//
// Mirrors the GLSL in `shaders` step for step so the software backend and
// the tests see exactly what the GPU computes per pixel.
//
// The inside tests differ at the rim: the YUV program keeps a pixel at
// r == 1.0, the RGB and OES programs drop it.

use crate::geometry::TexMatrix;
use crate::shaders::ShaderVariant;

/// x scale applied before the YUV radius, roughly 16:9
pub const YUV_ASPECT_CORRECTION: f32 = 1.77;

/// Colour written outside the circle
pub const TRANSPARENT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

/// `(texMatrix * vec4(tc, 0, 1)).xy`, matrix column-major
pub fn transform_tex_coord(m: &TexMatrix, tc: [f32; 2]) -> [f32; 2] {
    [
        m[0] * tc[0] + m[4] * tc[1] + m[12],
        m[1] * tc[0] + m[5] * tc[1] + m[13],
    ]
}

/// Maps [0, 1] texture space onto [-1, 1] centred space
pub fn centered(tc: [f32; 2]) -> [f32; 2] {
    [-1.0 + 2.0 * tc[0], -1.0 + 2.0 * tc[1]]
}

/// Distance from the texture centre as the variant's shader measures it
pub fn mask_radius(variant: ShaderVariant, tc: [f32; 2]) -> f32 {
    let mut p = centered(tc);
    if variant == ShaderVariant::Yuv {
        p[0] *= YUV_ASPECT_CORRECTION;
    }
    (p[0] * p[0] + p[1] * p[1]).sqrt()
}

pub fn is_inside(variant: ShaderVariant, radius: f32) -> bool {
    match variant {
        ShaderVariant::Yuv => radius <= 1.0,
        ShaderVariant::Rgb | ShaderVariant::Oes => radius < 1.0,
    }
}

/// YCbCr to RGB with U/V centred on 0.5, alpha forced to 1. Not clamped.
pub fn yuv_to_rgba(y: f32, u: f32, v: f32) -> [f32; 4] {
    let u = u - 0.5;
    let v = v - 0.5;
    [
        y + 1.403 * v,
        y - 0.344 * u - 0.714 * v,
        y + 1.77 * u,
        1.0,
    ]
}

/// YUV fragment program. `sample(plane, tc)` returns the `.r` of plane 0 (Y), 1 (U) or 2 (V).
pub fn shade_yuv(tc: [f32; 2], mut sample: impl FnMut(usize, [f32; 2]) -> f32) -> [f32; 4] {
    if !is_inside(ShaderVariant::Yuv, mask_radius(ShaderVariant::Yuv, tc)) {
        return TRANSPARENT;
    }
    yuv_to_rgba(sample(0, tc), sample(1, tc), sample(2, tc))
}

/// RGB / OES fragment program. `sample(tc)` reads the texture on unit 0.
pub fn shade_direct(
    variant: ShaderVariant,
    tc: [f32; 2],
    sample: impl FnOnce([f32; 2]) -> [f32; 4],
) -> [f32; 4] {
    if is_inside(variant, mask_radius(variant, tc)) {
        sample(tc)
    } else {
        TRANSPARENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::IDENTITY_MATRIX;

    #[test]
    fn test_yuv_mid_grey() {
        assert_eq!(yuv_to_rgba(0.5, 0.5, 0.5), [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_yuv_not_clamped() {
        let [r, _, b, a] = yuv_to_rgba(1.0, 1.0, 1.0);
        assert!(r > 1.0);
        assert!(b > 1.0);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn test_boundary_asymmetry() {
        // Rim handling is inconsistent between the programs: YUV keeps
        // r == 1.0, RGB/OES drop it. Pinned here so either shader changing shows up.
        let top_edge = [0.5, 1.0];
        assert_eq!(mask_radius(ShaderVariant::Yuv, top_edge), 1.0);
        assert!(is_inside(ShaderVariant::Yuv, 1.0));

        let right_edge = [1.0, 0.5];
        assert_eq!(mask_radius(ShaderVariant::Rgb, right_edge), 1.0);
        assert_eq!(mask_radius(ShaderVariant::Oes, right_edge), 1.0);
        assert!(!is_inside(ShaderVariant::Rgb, 1.0));
        assert!(!is_inside(ShaderVariant::Oes, 1.0));
    }

    #[test]
    fn test_yuv_aspect_correction() {
        // Right edge is outside for YUV because x is stretched by 1.77.
        assert!((mask_radius(ShaderVariant::Yuv, [1.0, 0.5]) - 1.77).abs() < 1e-6);
        let edge_x = 0.5 + 0.5 / YUV_ASPECT_CORRECTION;
        assert!(mask_radius(ShaderVariant::Yuv, [edge_x - 0.001, 0.5]) < 1.0);
    }

    #[test]
    fn test_shade_yuv_reads_planes_in_order() {
        let planes = [0.5, 0.25, 0.75];
        let color = shade_yuv([0.5, 0.5], |plane, _| planes[plane]);
        assert_eq!(color, yuv_to_rgba(0.5, 0.25, 0.75));

        let corner = shade_yuv([0.0, 0.0], |_, _| panic!("sampled outside the circle"));
        assert_eq!(corner, TRANSPARENT);
    }

    #[test]
    fn test_shade_direct() {
        let red = [1.0, 0.0, 0.0, 1.0];
        assert_eq!(shade_direct(ShaderVariant::Rgb, [0.5, 0.5], |_| red), red);
        assert_eq!(shade_direct(ShaderVariant::Oes, [1.0, 0.5], |_| red), TRANSPARENT);
        assert_eq!(shade_direct(ShaderVariant::Oes, [0.02, 0.02], |_| red), TRANSPARENT);
    }

    #[test]
    fn test_identity_transform() {
        assert_eq!(transform_tex_coord(&IDENTITY_MATRIX, [0.3, 0.7]), [0.3, 0.7]);
    }
}
