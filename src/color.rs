//! Color space conversion utilities
//!
//! This module converts between:
//! - sRGB (8-bit display color space)
//! - XYZ (device-independent color space, D65 white point)
//! - CIE L*a*b* (one lightness plane, two chrominance planes)
//!
//! Images are converted to a planar `LabImage` so the colorization pipeline
//! can swap chrominance planes while keeping the lightness plane intact.

use cgmath::{Matrix3, Vector3};
use image::{Rgb, RgbImage};

/// Linear sRGB to XYZ conversion matrix (D65 white point), row-major
/// Source: IEC 61966-2-1:1999 (sRGB standard)
const SRGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412_456_4, 0.357_576_1, 0.180_437_5],
    [0.212_672_9, 0.715_152_2, 0.072_175_0],
    [0.019_333_9, 0.119_192_0, 0.950_304_1],
];

/// XYZ to linear sRGB conversion matrix (D65 white point), row-major
const XYZ_TO_SRGB: [[f32; 3]; 3] = [
    [3.240_454_2, -1.537_138_5, -0.498_531_4],
    [-0.969_266_0, 1.876_010_8, 0.041_556_0],
    [0.055_643_4, -0.204_025_9, 1.057_225_2],
];

/// D65 reference white
const WHITE_X: f32 = 0.950_47;
const WHITE_Y: f32 = 1.0;
const WHITE_Z: f32 = 1.088_83;

/// CIE constants: delta = 6/29
const DELTA: f32 = 6.0 / 29.0;

/// Build a cgmath matrix from a row-major array (cgmath is column-major)
fn from_rows(m: [[f32; 3]; 3]) -> Matrix3<f32> {
    Matrix3::new(
        m[0][0], m[1][0], m[2][0], // Column 0
        m[0][1], m[1][1], m[2][1], // Column 1
        m[0][2], m[1][2], m[2][2], // Column 2
    )
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// Converts pixels in both directions, holding the matrices and a gamma lookup table
struct LabConverter {
    to_xyz: Matrix3<f32>,
    to_rgb: Matrix3<f32>,
    /// 8-bit sRGB value -> linear intensity
    linear: [f32; 256],
}

impl LabConverter {
    fn new() -> Self {
        let mut linear = [0.0f32; 256];
        for (value, slot) in linear.iter_mut().enumerate() {
            *slot = srgb_to_linear(value as f32 / 255.0);
        }

        Self {
            to_xyz: from_rows(SRGB_TO_XYZ),
            to_rgb: from_rows(XYZ_TO_SRGB),
            linear,
        }
    }

    fn rgb_to_lab(&self, pixel: [u8; 3]) -> [f32; 3] {
        let rgb = Vector3::new(
            self.linear[pixel[0] as usize],
            self.linear[pixel[1] as usize],
            self.linear[pixel[2] as usize],
        );
        let xyz = self.to_xyz * rgb;

        let fx = lab_f(xyz.x / WHITE_X);
        let fy = lab_f(xyz.y / WHITE_Y);
        let fz = lab_f(xyz.z / WHITE_Z);

        [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
    }

    fn lab_to_rgb(&self, lab: [f32; 3]) -> [u8; 3] {
        let fy = (lab[0] + 16.0) / 116.0;
        let fx = fy + lab[1] / 500.0;
        let fz = fy - lab[2] / 200.0;

        let xyz = Vector3::new(
            WHITE_X * lab_f_inv(fx),
            WHITE_Y * lab_f_inv(fy),
            WHITE_Z * lab_f_inv(fz),
        );
        let rgb = self.to_rgb * xyz;

        let encode = |c: f32| -> u8 {
            let v = linear_to_srgb(c.clamp(0.0, 1.0));
            (v * 255.0).round().clamp(0.0, 255.0) as u8
        };
        [encode(rgb.x), encode(rgb.y), encode(rgb.z)]
    }
}

/// Convert a single sRGB pixel to L*a*b*
pub fn rgb_to_lab(pixel: [u8; 3]) -> [f32; 3] {
    LabConverter::new().rgb_to_lab(pixel)
}

/// Convert a single L*a*b* triple to an sRGB pixel (out-of-gamut values are clipped)
pub fn lab_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    LabConverter::new().lab_to_rgb(lab)
}

/// Planar L*a*b* image
///
/// Planes are row-major with `width * height` samples each.
#[derive(Debug, Clone, PartialEq)]
pub struct LabImage {
    pub width: u32,
    pub height: u32,
    /// Lightness, 0..=100
    pub l: Vec<f32>,
    /// Green-red chrominance
    pub a: Vec<f32>,
    /// Blue-yellow chrominance
    pub b: Vec<f32>,
}

impl LabImage {
    /// Split an RGB image into lightness and chrominance planes
    pub fn from_rgb(image: &RgbImage) -> Self {
        let converter = LabConverter::new();
        let len = (image.width() as usize) * (image.height() as usize);

        let mut l = Vec::with_capacity(len);
        let mut a = Vec::with_capacity(len);
        let mut b = Vec::with_capacity(len);

        for pixel in image.pixels() {
            let lab = converter.rgb_to_lab(pixel.0);
            l.push(lab[0]);
            a.push(lab[1]);
            b.push(lab[2]);
        }

        Self {
            width: image.width(),
            height: image.height(),
            l,
            a,
            b,
        }
    }

    /// Number of samples each plane should hold
    pub fn sample_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// True when all three planes match the declared dimensions
    pub fn is_consistent(&self) -> bool {
        let n = self.sample_count();
        self.l.len() == n && self.a.len() == n && self.b.len() == n
    }

    /// Render back to RGB
    ///
    /// Returns `None` if the planes do not match the declared dimensions.
    pub fn to_rgb(&self) -> Option<RgbImage> {
        if !self.is_consistent() {
            return None;
        }

        let converter = LabConverter::new();
        let mut image = RgbImage::new(self.width, self.height);
        for (idx, pixel) in image.pixels_mut().enumerate() {
            *pixel = Rgb(converter.lab_to_rgb([self.l[idx], self.a[idx], self.b[idx]]));
        }
        Some(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} ± {tolerance}, got {actual}"
        );
    }

    #[test]
    fn test_matrices_are_inverse() {
        let product = from_rows(XYZ_TO_SRGB) * from_rows(SRGB_TO_XYZ);
        let identity = Matrix3::<f32>::identity();
        for col in 0..3 {
            for row in 0..3 {
                assert_close(product[col][row], identity[col][row], 1e-3);
            }
        }
    }

    #[test]
    fn test_black_and_white() {
        let black = rgb_to_lab([0, 0, 0]);
        assert_close(black[0], 0.0, 1e-3);

        let white = rgb_to_lab([255, 255, 255]);
        assert_close(white[0], 100.0, 0.05);
        assert_close(white[1], 0.0, 0.05);
        assert_close(white[2], 0.0, 0.05);
    }

    #[test]
    fn test_gray_has_no_chrominance() {
        for value in [16u8, 64, 128, 200] {
            let lab = rgb_to_lab([value, value, value]);
            assert_close(lab[1], 0.0, 0.05);
            assert_close(lab[2], 0.0, 0.05);
        }
        assert_close(rgb_to_lab([128, 128, 128])[0], 53.59, 0.05);
    }

    #[test]
    fn test_known_red() {
        let red = rgb_to_lab([255, 0, 0]);
        assert_close(red[0], 53.24, 0.1);
        assert_close(red[1], 80.09, 0.2);
        assert_close(red[2], 67.20, 0.2);
    }

    #[test]
    fn test_pixel_round_trip() {
        for pixel in [[0, 0, 0], [255, 255, 255], [12, 200, 99], [250, 10, 180], [90, 90, 90]] {
            let back = lab_to_rgb(rgb_to_lab(pixel));
            for c in 0..3 {
                assert!(
                    (back[c] as i16 - pixel[c] as i16).abs() <= 1,
                    "{pixel:?} came back as {back:?}"
                );
            }
        }
    }

    #[test]
    fn test_out_of_gamut_is_clipped() {
        let rgb = lab_to_rgb([50.0, 127.0, -127.0]);
        // Saturated magenta-ish: red and blue dominate, nothing wraps around
        assert!(rgb[0] > rgb[1]);
        assert!(rgb[2] > rgb[1]);
    }

    #[test]
    fn test_planar_image() {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(2, 1, Rgb([255, 0, 0]));

        let lab = LabImage::from_rgb(&image);
        assert_eq!(lab.sample_count(), 6);
        assert!(lab.is_consistent());
        // Row-major: (x=2, y=1) lands at index 5
        assert_close(lab.l[5], 53.24, 0.1);
        assert_close(lab.l[0], 0.0, 1e-3);

        let back = lab.to_rgb().unwrap();
        assert_eq!(back.dimensions(), (3, 2));
        assert_eq!(back.get_pixel(2, 1), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_inconsistent_planes_do_not_render() {
        let lab = LabImage {
            width: 2,
            height: 2,
            l: vec![50.0; 4],
            a: vec![0.0; 3],
            b: vec![0.0; 4],
        };
        assert!(!lab.is_consistent());
        assert!(lab.to_rgb().is_none());
    }
}
