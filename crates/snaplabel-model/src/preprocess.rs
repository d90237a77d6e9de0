//! Upload normalization: decode, orientation correction, RGB conversion

use image::metadata::Orientation;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use snaplabel_core::{Error, Result};
use std::io::Cursor;
use tracing::debug;

/// Formats accepted at the upload boundary
pub const SUPPORTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Tiff,
];

/// An upload turned into an upright, 3-channel RGB raster
#[derive(Debug, Clone)]
pub struct InputImage {
    rgb: RgbImage,
    format: ImageFormat,
    source_color: ColorType,
    orientation: Orientation,
}

impl InputImage {
    /// The normalized raster
    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn into_rgb(self) -> RgbImage {
        self.rgb
    }

    /// Container format of the upload
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Color type before conversion
    pub fn source_color(&self) -> ColorType {
        self.source_color
    }

    /// Orientation found in the upload's metadata
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Encode the normalized raster as PNG, for redisplay
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.rgb
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| Error::image_conversion(format!("cannot encode PNG: {}", e)))?;
        Ok(out.into_inner())
    }
}

/// Decode, orient and convert raw upload bytes.
///
/// Steps run in a fixed order:
/// 1. decode (unsupported or corrupt data is an `ImageDecode` error)
/// 2. apply the embedded orientation, if any
/// 3. convert to 8-bit RGB when the decoded mode differs
pub fn preprocess(bytes: &[u8]) -> Result<InputImage> {
    let (image, format, orientation) = decode(bytes)?;
    let source_color = image.color();

    let image = orient(image, orientation);
    let rgb = to_rgb(image)?;

    debug!(
        format = ?format,
        color = ?source_color,
        orientation = ?orientation,
        width = rgb.width(),
        height = rgb.height(),
        "Image preprocessed"
    );

    Ok(InputImage {
        rgb,
        format,
        source_color,
        orientation,
    })
}

fn decode(bytes: &[u8]) -> Result<(DynamicImage, ImageFormat, Orientation)> {
    if bytes.is_empty() {
        return Err(Error::image_decode("upload is empty"));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::image_decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| Error::image_decode("unrecognized image format"))?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(Error::image_decode(format!(
            "unsupported image format {}",
            format_name(format)
        )));
    }

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| Error::image_decode(e.to_string()))?;

    // Unreadable metadata is treated like absent metadata
    let orientation = decoder.orientation().unwrap_or_else(|e| {
        debug!("Ignoring unreadable orientation metadata: {}", e);
        Orientation::NoTransforms
    });

    let image =
        DynamicImage::from_decoder(decoder).map_err(|e| Error::image_decode(e.to_string()))?;

    Ok((image, format, orientation))
}

fn orient(mut image: DynamicImage, orientation: Orientation) -> DynamicImage {
    image.apply_orientation(orientation);
    image
}

fn to_rgb(image: DynamicImage) -> Result<RgbImage> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::image_conversion("image has no pixels"));
    }

    Ok(match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    })
}

fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbaImage, Rgba};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_rgb_png_passes_through() {
        let img = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));
        let input = preprocess(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)).unwrap();

        assert_eq!(input.format(), ImageFormat::Png);
        assert_eq!(input.source_color(), ColorType::Rgb8);
        assert_eq!(input.orientation(), Orientation::NoTransforms);
        assert_eq!((input.width(), input.height()), (4, 3));
        assert_eq!(input.rgb().get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_grayscale_becomes_rgb() {
        let img = GrayImage::from_pixel(5, 5, Luma([200]));
        let input = preprocess(&encode(DynamicImage::ImageLuma8(img), ImageFormat::Png)).unwrap();

        assert_eq!(input.source_color(), ColorType::L8);
        assert_eq!(input.rgb().get_pixel(2, 2), &Rgb([200, 200, 200]));
        assert_eq!(input.rgb().as_raw().len(), 5 * 5 * 3);
    }

    #[test]
    fn test_rgba_drops_alpha() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 128, 255, 40]));
        let input = preprocess(&encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)).unwrap();

        assert_eq!(input.source_color(), ColorType::Rgba8);
        assert_eq!(input.rgb().get_pixel(1, 1), &Rgb([0, 128, 255]));
    }

    #[test]
    fn test_jpeg_is_accepted() {
        let img = RgbImage::from_pixel(16, 8, Rgb([90, 90, 90]));
        let input = preprocess(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)).unwrap();
        assert_eq!(input.format(), ImageFormat::Jpeg);
        assert_eq!((input.width(), input.height()), (16, 8));
    }

    #[test]
    fn test_bmp_is_rejected() {
        // 1x1 24-bit BMP
        let mut bmp = Vec::new();
        bmp.extend_from_slice(b"BM");
        bmp.extend_from_slice(&58u32.to_le_bytes());
        bmp.extend_from_slice(&[0, 0, 0, 0]);
        bmp.extend_from_slice(&54u32.to_le_bytes());
        bmp.extend_from_slice(&40u32.to_le_bytes());
        bmp.extend_from_slice(&1i32.to_le_bytes());
        bmp.extend_from_slice(&1i32.to_le_bytes());
        bmp.extend_from_slice(&1u16.to_le_bytes());
        bmp.extend_from_slice(&24u16.to_le_bytes());
        bmp.extend_from_slice(&[0; 24]);
        bmp.extend_from_slice(&[0, 0, 255, 0]);

        let err = preprocess(&bmp).unwrap_err();
        assert_eq!(err.kind(), snaplabel_core::ErrorKind::ImageDecode);
        assert!(err.to_string().contains("bmp"), "{}", err);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = preprocess(b"definitely not an image").unwrap_err();
        assert_eq!(err.kind(), snaplabel_core::ErrorKind::ImageDecode);

        let err = preprocess(&[]).unwrap_err();
        assert_eq!(err.kind(), snaplabel_core::ErrorKind::ImageDecode);
    }

    #[test]
    fn test_truncated_png_is_rejected() {
        let img = RgbImage::from_pixel(32, 32, Rgb([1, 2, 3]));
        let bytes = encode(DynamicImage::ImageRgb8(img), ImageFormat::Png);

        let err = preprocess(&bytes[..bytes.len() / 2]).unwrap_err();
        assert_eq!(err.kind(), snaplabel_core::ErrorKind::ImageDecode);
    }

    #[test]
    fn test_png_round_trip_for_redisplay() {
        let img = RgbImage::from_pixel(3, 2, Rgb([7, 8, 9]));
        let input = preprocess(&encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)).unwrap();

        let again = preprocess(&input.to_png().unwrap()).unwrap();
        assert_eq!(again.rgb(), input.rgb());
    }
}
