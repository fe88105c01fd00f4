//! Data Augmentation Module
//!
//! Random geometric transforms applied on the fly to training images.
//!
//! # Augmentation Strategy
//!
//! - **Training**: rotation, width/height shift, shear, zoom and horizontal flip
//! - **Validation/Evaluation**: never augmented
//!
//! All transforms are combined into one affine map and applied with bilinear
//! sampling. Pixels that fall outside the source take the nearest edge value.

use image::{imageops, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// Maximum rotation in degrees (applies ±rotation_range)
    pub rotation_range: f32,
    /// Maximum horizontal shift as a fraction of the width
    pub width_shift_range: f32,
    /// Maximum vertical shift as a fraction of the height
    pub height_shift_range: f32,
    /// Maximum shear angle in degrees
    pub shear_range: f32,
    /// Zoom factors are drawn from `[1 - zoom_range, 1 + zoom_range]`
    pub zoom_range: f32,
    /// Flip horizontally with probability 0.5
    pub horizontal_flip: bool,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_range: 40.0,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
        }
    }
}

/// Parameters of one sampled transform
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineParams {
    /// Rotation in degrees
    pub theta: f32,
    /// Row shift in pixels
    pub tx: f32,
    /// Column shift in pixels
    pub ty: f32,
    /// Shear in degrees
    pub shear: f32,
    /// Row zoom factor
    pub zx: f32,
    /// Column zoom factor
    pub zy: f32,
    pub flip_horizontal: bool,
}

impl AffineParams {
    pub fn identity() -> Self {
        Self {
            theta: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
            flip_horizontal: false,
        }
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Draw transform parameters for an image of the given size
    pub fn sample_params(&self, width: u32, height: u32, rng: &mut ChaCha8Rng) -> AffineParams {
        let c = &self.config;
        let mut symmetric = |range: f32| {
            if range > 0.0 {
                rng.gen_range(-range..=range)
            } else {
                0.0
            }
        };

        let theta = symmetric(c.rotation_range);
        let tx = symmetric(c.height_shift_range) * height as f32;
        let ty = symmetric(c.width_shift_range) * width as f32;
        let shear = symmetric(c.shear_range);
        let (zx, zy) = if c.zoom_range > 0.0 {
            (
                rng.gen_range(1.0 - c.zoom_range..=1.0 + c.zoom_range),
                rng.gen_range(1.0 - c.zoom_range..=1.0 + c.zoom_range),
            )
        } else {
            (1.0, 1.0)
        };
        let flip_horizontal = c.horizontal_flip && rng.gen::<f32>() < 0.5;

        AffineParams {
            theta,
            tx,
            ty,
            shear,
            zx,
            zy,
            flip_horizontal,
        }
    }

    /// Apply a random transform
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let params = self.sample_params(img.width(), img.height(), rng);
        apply_transform(img, &params)
    }
}

/// Apply `params` to `img`, keeping its size
pub fn apply_transform(img: &RgbImage, params: &AffineParams) -> RgbImage {
    let (width, height) = img.dimensions();
    let geometric = params.theta != 0.0
        || params.tx != 0.0
        || params.ty != 0.0
        || params.shear != 0.0
        || params.zx != 1.0
        || params.zy != 1.0;

    let mut output = if geometric {
        warp(img, params)
    } else {
        img.clone()
    };

    if params.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut output);
    }
    output
}

/// Inverse-map every output pixel through rotation · shift · shear · zoom about the centre
fn warp(img: &RgbImage, params: &AffineParams) -> RgbImage {
    let (width, height) = img.dimensions();
    let center_row = (height as f32 - 1.0) / 2.0;
    let center_col = (width as f32 - 1.0) / 2.0;

    let (sin_t, cos_t) = params.theta.to_radians().sin_cos();
    let (sin_s, cos_s) = params.shear.to_radians().sin_cos();

    let mut output = RgbImage::new(width, height);
    for row in 0..height {
        for col in 0..width {
            // zoom
            let r = (row as f32 - center_row) * params.zx;
            let c = (col as f32 - center_col) * params.zy;
            // shear
            let (r, c) = (r - sin_s * c, cos_s * c);
            // shift
            let (r, c) = (r + params.tx, c + params.ty);
            // rotation
            let src_row = cos_t * r - sin_t * c + center_row;
            let src_col = sin_t * r + cos_t * c + center_col;

            output.put_pixel(col, row, bilinear_sample(img, src_col, src_row));
        }
    }
    output
}

/// Sample a pixel using bilinear interpolation, clamping to the nearest edge
fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}
