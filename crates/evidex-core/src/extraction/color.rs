//! Sample-to-RGBA8 conversion for raster images.

use super::FigureError;
use crate::source::{ColorSpace, RasterImage};

/// Bytes per packed row.
fn row_bytes(width: u32, components: usize, bits: u8) -> usize {
    (width as usize * components * usize::from(bits)).div_ceil(8)
}

fn check_length(image: &RasterImage, components: usize) -> Result<(), FigureError> {
    if image.width == 0 || image.height == 0 {
        return Err(FigureError::EmptyImage);
    }
    let expected = row_bytes(image.width, components, image.bits_per_component) * image.height as usize;
    if image.data.len() != expected {
        return Err(FigureError::BufferLength { expected, actual: image.data.len() });
    }
    Ok(())
}

/// Reads bit `x` of a packed 1-bit row, most significant bit first.
fn bit_at(row: &[u8], x: usize) -> bool {
    row[x / 8] & (0x80 >> (x % 8)) != 0
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let inv_k = 255 - u16::from(k);
    let channel = |v: u8| ((255 - u16::from(v)) * inv_k / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

/// Converts an image's samples to an RGBA8 buffer.
///
/// 8-bit gray, RGB, CMYK and RGBA are supported, plus 1-bit gray.
///
/// # Errors
/// Returns an error for an unsupported bit depth, an empty image, or a buffer
/// whose length does not match the declared dimensions.
pub fn to_rgba(image: &RasterImage) -> Result<Vec<u8>, FigureError> {
    let components = image.color_space.components();

    match (image.bits_per_component, image.color_space) {
        (8, _) => {
            check_length(image, components)?;
            let mut out = Vec::with_capacity(image.width as usize * image.height as usize * 4);
            for px in image.data.chunks_exact(components) {
                match image.color_space {
                    ColorSpace::Gray => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
                    ColorSpace::Rgb => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
                    ColorSpace::Rgba => out.extend_from_slice(px),
                    ColorSpace::Cmyk => {
                        let [r, g, b] = cmyk_to_rgb(px[0], px[1], px[2], px[3]);
                        out.extend_from_slice(&[r, g, b, 255]);
                    }
                }
            }
            Ok(out)
        }
        (1, ColorSpace::Gray) => {
            check_length(image, 1)?;
            let stride = row_bytes(image.width, 1, 1);
            let mut out = Vec::with_capacity(image.width as usize * image.height as usize * 4);
            for row in image.data.chunks_exact(stride) {
                for x in 0..image.width as usize {
                    let v = if bit_at(row, x) { 255 } else { 0 };
                    out.extend_from_slice(&[v, v, v, 255]);
                }
            }
            Ok(out)
        }
        (bits, color_space) => Err(FigureError::UnsupportedBitDepth { bits, color_space }),
    }
}

/// Converts a stencil mask to RGBA8: painted samples become opaque black,
/// the rest fully transparent.
///
/// A 1-bit sample of 0 paints. For 8-bit masks, samples below 128 paint.
///
/// # Errors
/// Same conditions as [`to_rgba`].
pub fn mask_to_rgba(image: &RasterImage) -> Result<Vec<u8>, FigureError> {
    let painted = |on: bool| if on { [0, 0, 0, 255] } else { [0, 0, 0, 0] };

    match image.bits_per_component {
        1 => {
            check_length(image, 1)?;
            let stride = row_bytes(image.width, 1, 1);
            let mut out = Vec::with_capacity(image.width as usize * image.height as usize * 4);
            for row in image.data.chunks_exact(stride) {
                for x in 0..image.width as usize {
                    out.extend_from_slice(&painted(!bit_at(row, x)));
                }
            }
            Ok(out)
        }
        8 => {
            check_length(image, 1)?;
            Ok(image.data.iter().flat_map(|&v| painted(v < 128)).collect())
        }
        bits => Err(FigureError::UnsupportedBitDepth { bits, color_space: image.color_space }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(width: u32, height: u32, color_space: ColorSpace, bits: u8, data: Vec<u8>) -> RasterImage {
        RasterImage { width, height, color_space, bits_per_component: bits, data }
    }

    #[test]
    fn test_gray_and_rgb() {
        let gray = image(2, 1, ColorSpace::Gray, 8, vec![0, 200]);
        assert_eq!(to_rgba(&gray).unwrap(), vec![0, 0, 0, 255, 200, 200, 200, 255]);

        let rgb = image(1, 1, ColorSpace::Rgb, 8, vec![10, 20, 30]);
        assert_eq!(to_rgba(&rgb).unwrap(), vec![10, 20, 30, 255]);

        let rgba = image(1, 1, ColorSpace::Rgba, 8, vec![1, 2, 3, 4]);
        assert_eq!(to_rgba(&rgba).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_cmyk() {
        let img = image(3, 1, ColorSpace::Cmyk, 8, vec![0, 0, 0, 0, 0, 0, 0, 255, 255, 0, 0, 0]);
        assert_eq!(
            to_rgba(&img).unwrap(),
            vec![255, 255, 255, 255, 0, 0, 0, 255, 0, 255, 255, 255]
        );
    }

    #[test]
    fn test_one_bit_gray_with_row_padding() {
        // 3 pixels wide, 2 rows, each row padded to one byte
        let img = image(3, 2, ColorSpace::Gray, 1, vec![0b1010_0000, 0b0100_0000]);
        let out = to_rgba(&img).unwrap();
        let values: Vec<u8> = out.chunks(4).map(|px| px[0]).collect();
        assert_eq!(values, vec![255, 0, 255, 0, 255, 0]);
    }

    #[test]
    fn test_mask() {
        let img = image(2, 1, ColorSpace::Gray, 1, vec![0b0100_0000]);
        assert_eq!(mask_to_rgba(&img).unwrap(), vec![0, 0, 0, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn test_length_mismatch() {
        let img = image(2, 2, ColorSpace::Rgb, 8, vec![0; 11]);
        assert_eq!(to_rgba(&img), Err(FigureError::BufferLength { expected: 12, actual: 11 }));
    }

    #[test]
    fn test_unsupported_depths() {
        let sixteen = image(1, 1, ColorSpace::Rgb, 16, vec![0; 6]);
        assert!(matches!(to_rgba(&sixteen), Err(FigureError::UnsupportedBitDepth { bits: 16, .. })));

        let one_bit_rgb = image(8, 1, ColorSpace::Rgb, 1, vec![0; 3]);
        assert!(matches!(to_rgba(&one_bit_rgb), Err(FigureError::UnsupportedBitDepth { bits: 1, .. })));
    }

    #[test]
    fn test_empty_image() {
        let img = image(0, 4, ColorSpace::Gray, 8, Vec::new());
        assert_eq!(to_rgba(&img), Err(FigureError::EmptyImage));
    }
}
