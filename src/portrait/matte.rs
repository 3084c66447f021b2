// src/portrait/matte.rs
use image::{imageops, DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbaImage};
use log::debug;
use std::io::Cursor;
use thiserror::Error;

/// Standard deviation of the feathering blur, in pixels
pub const FEATHER_SIGMA: f32 = 1.2;

const BACKGROUND: u8 = 0;
const FOREGROUND: u8 = 255;

#[derive(Debug, Error)]
pub enum MatteError {
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),
    #[error("failed to encode matte as PNG: {0}")]
    ImageEncode(#[source] image::ImageError),
    #[error("invalid chroma color '{0}', expected #RRGGBB")]
    InvalidColor(String),
}

/// Screen color to remove and the largest RGB distance still counted as screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaKeySpec {
    pub color: Rgb<u8>,
    pub tolerance: u32,
}

impl ChromaKeySpec {
    pub fn new(color: Rgb<u8>, tolerance: u32) -> Self {
        Self { color, tolerance }
    }

    /// Build from a `#RRGGBB` string (the `#` is optional)
    pub fn from_hex(hex: &str, tolerance: u32) -> Result<Self, MatteError> {
        Ok(Self::new(parse_hex_color(hex)?, tolerance))
    }

    /// Squared RGB distance between `pixel` and the key color
    pub fn distance_sq(&self, pixel: [u8; 3]) -> u32 {
        pixel
            .iter()
            .zip(self.color.0.iter())
            .map(|(&p, &k)| {
                let d = p as i32 - k as i32;
                (d * d) as u32
            })
            .sum()
    }

    pub fn is_background(&self, pixel: [u8; 3]) -> bool {
        let tolerance = self.tolerance as u64;
        self.distance_sq(pixel) as u64 <= tolerance * tolerance
    }
}

pub fn parse_hex_color(hex: &str) -> Result<Rgb<u8>, MatteError> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(MatteError::InvalidColor(hex.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| MatteError::InvalidColor(hex.to_string()))
    };
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Hard selection: 0 where the pixel is within tolerance of the key, 255 elsewhere
pub fn background_mask(image: &RgbaImage, spec: &ChromaKeySpec) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let p = image.get_pixel(x, y);
        if spec.is_background([p[0], p[1], p[2]]) {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Make pixels close to the key color transparent with a feathered edge.
///
/// Returns a new buffer of the same size. RGB values are copied unchanged and
/// the alpha channel is replaced by the blurred selection mask. No despill is
/// done, so a faint fringe of the key color can remain on the edge.
pub fn chroma_key_matte(image: &RgbaImage, spec: &ChromaKeySpec) -> RgbaImage {
    debug!(
        "chroma key {}x{} color={:?} tolerance={}",
        image.width(),
        image.height(),
        spec.color.0,
        spec.tolerance
    );

    let mask = background_mask(image, spec);
    let feathered = imageops::blur(&mask, FEATHER_SIGMA);

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        pixel[3] = feathered.get_pixel(x, y)[0];
    }
    out
}

/// Decode any supported image format, matte it and encode the result as PNG
pub fn matte_bytes(bytes: &[u8], spec: &ChromaKeySpec) -> Result<Vec<u8>, MatteError> {
    let source = image::load_from_memory(bytes)
        .map_err(MatteError::ImageDecode)?
        .to_rgba8();
    let matte = chroma_key_matte(&source, spec);
    encode_png(matte)
}

pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>, MatteError> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)
        .map_err(MatteError::ImageEncode)?;
    Ok(buffer)
}
