use adforge_contracts::CreativeError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Square-canvas JPEG normaliser for generated images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessor {
    pub canvas: u32,
    pub quality: u8,
}

impl PostProcessor {
    pub fn new(canvas: u32, quality: u8) -> Self {
        Self {
            canvas: canvas.max(1),
            quality: quality.clamp(1, 100),
        }
    }

    /// Contains the source inside the canvas on a white background and
    /// re-encodes it as JPEG. Only undecodable input fails.
    pub fn normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, CreativeError> {
        let source = image::load_from_memory(bytes)
            .map_err(|err| CreativeError::Encode(format!("cannot decode image: {err}")))?;
        let (width, height) = source.dimensions();
        let fitted = if width == self.canvas && height == self.canvas {
            source
        } else {
            source.resize(self.canvas, self.canvas, FilterType::Lanczos3)
        };

        let mut canvas = RgbaImage::from_pixel(self.canvas, self.canvas, BACKGROUND);
        let x = i64::from((self.canvas - fitted.width()) / 2);
        let y = i64::from((self.canvas - fitted.height()) / 2);
        imageops::overlay(&mut canvas, &fitted.to_rgba8(), x, y);
        let flattened = DynamicImage::ImageRgba8(canvas).to_rgb8();

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        encoder
            .encode_image(&DynamicImage::ImageRgb8(flattened))
            .map_err(|err| CreativeError::Encode(format!("jpeg encode failed: {err}")))?;
        Ok(out)
    }
}
