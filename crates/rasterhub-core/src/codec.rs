//! Image payload encoding and decoding.
//!
//! Backends ship bitmaps as base64 inside result lines. Decoding is lenient
//! about what the backend chose to send: raw `width*height` bytes, a full
//! binary PGM (P5), a PNG, or an `identifier` naming an image file on disk.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use camino::Utf8Path;

use crate::bitmap::Bitmap;
use crate::error::{RenderError, Result};
use crate::job::RenderingOutput;

/// Binary PGM (P5) with an 8-bit maxval.
pub fn encode_pgm(bitmap: &Bitmap) -> Vec<u8> {
    let header = format!("P5\n{} {}\n255\n", bitmap.width(), bitmap.height());
    let mut out = Vec::with_capacity(header.len() + bitmap.pixels().len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(bitmap.pixels());
    out
}

/// 8-bit grayscale PNG.
pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>> {
    let image = image::GrayImage::from_raw(bitmap.width(), bitmap.height(), bitmap.pixels().to_vec())
        .ok_or_else(|| RenderError::Decode("pixel buffer does not match dimensions".into()))?;
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| RenderError::Decode(format!("PNG encoding failed: {e}")))?;
    Ok(out.into_inner())
}

pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| RenderError::Decode(format!("base64: {e}")))
}

/// Encode a bitmap for a result line in the requested format.
pub fn encode_rendering(bitmap: &Bitmap, format: &str) -> Result<RenderingOutput> {
    let bytes = match format {
        "pgm" => encode_pgm(bitmap),
        "png" => encode_png(bitmap)?,
        other => {
            return Err(RenderError::InvalidInput(format!(
                "unsupported output format: {other}"
            )))
        }
    };
    Ok(RenderingOutput {
        format: format.to_string(),
        encoding: "base64".to_string(),
        data: Some(encode_base64(&bytes)),
        identifier: None,
        width: bitmap.width(),
        height: bitmap.height(),
        actual_bbox: bitmap.bounding_box(),
    })
}

/// Decode a result's payload into a bitmap of the advertised size.
pub fn decode_rendering(output: &RenderingOutput) -> Result<Bitmap> {
    let (width, height) = (output.width, output.height);

    if let Some(data) = output.data.as_deref().filter(|d| !d.is_empty()) {
        let bytes = decode_base64(data)?;
        let bitmap = if output.format == "png" || bytes.starts_with(PNG_MAGIC) {
            decode_png(&bytes)?
        } else {
            decode_pgm_or_raw(&bytes, width, height)?
        };
        bitmap.ensure_shape(width, height).map_err(|_| {
            RenderError::Decode(format!(
                "payload is {}x{}, result claims {}x{}",
                bitmap.width(),
                bitmap.height(),
                width,
                height
            ))
        })?;
        return Ok(bitmap);
    }

    if let Some(identifier) = output.identifier.as_deref() {
        let bitmap = decode_file(Utf8Path::new(identifier))?;
        bitmap.ensure_shape(width, height).map_err(|e| {
            RenderError::Decode(format!("image file {identifier}: {e}"))
        })?;
        return Ok(bitmap);
    }

    Err(RenderError::Decode(
        "result carries neither image data nor an identifier".into(),
    ))
}

const PNG_MAGIC: &[u8] = b"\x89PNG";

/// Raw pixel bytes or a full P5 file.
pub fn decode_pgm_or_raw(bytes: &[u8], width: u32, height: u32) -> Result<Bitmap> {
    let expected = width as usize * height as usize;
    if bytes.starts_with(b"P5") {
        match decode_pgm(bytes) {
            Ok(bitmap) => return Ok(bitmap),
            // Raw pixels that happen to start with "P5"
            Err(_) if bytes.len() == expected => {}
            Err(e) => return Err(e),
        }
    }
    if bytes.len() == expected {
        return Bitmap::from_pixels(width, height, bytes.to_vec());
    }
    Err(RenderError::Decode(format!(
        "expected {} raw bytes or a P5 image for {}x{}, got {} bytes",
        expected,
        width,
        height,
        bytes.len()
    )))
}

/// Parse a binary PGM (P5) image with maxval 255.
pub fn decode_pgm(bytes: &[u8]) -> Result<Bitmap> {
    let mut pos = 0usize;
    let mut fields = [0u32; 3];

    let magic = next_token(bytes, &mut pos)?;
    if magic != b"P5" {
        return Err(RenderError::Decode(format!(
            "expected P5 magic, got '{}'",
            String::from_utf8_lossy(magic)
        )));
    }
    for field in fields.iter_mut() {
        let token = next_token(bytes, &mut pos)?;
        *field = std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                RenderError::Decode(format!(
                    "bad PGM header field '{}'",
                    String::from_utf8_lossy(token)
                ))
            })?;
    }
    let [width, height, maxval] = fields;
    if maxval != 255 {
        return Err(RenderError::Decode(format!(
            "unsupported PGM maxval {maxval}"
        )));
    }
    // Exactly one whitespace byte separates the header from the raster.
    let body = bytes.get(pos + 1..).unwrap_or_default();
    Bitmap::from_pixels(width, height, body.to_vec())
}

fn next_token<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos < bytes.len() && bytes[*pos] == b'#' {
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            continue;
        }
        break;
    }
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
    if start == *pos {
        return Err(RenderError::Decode("truncated PGM header".into()));
    }
    Ok(&bytes[start..*pos])
}

pub fn decode_png(bytes: &[u8]) -> Result<Bitmap> {
    let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .map_err(|e| RenderError::Decode(format!("PNG: {e}")))?
        .into_luma8();
    let (width, height) = image.dimensions();
    Bitmap::from_pixels(width, height, image.into_raw())
}

/// Load a PGM or PNG image file.
pub fn decode_file(path: &Utf8Path) -> Result<Bitmap> {
    let bytes = std::fs::read(path.as_std_path())
        .map_err(|e| RenderError::Decode(format!("cannot read image file {path}: {e}")))?;
    if bytes.starts_with(b"P5") {
        decode_pgm(&bytes)
    } else {
        decode_png(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bitmap {
        Bitmap::from_pixels(3, 2, vec![0, 10, 20, 30, 40, 255]).unwrap()
    }

    fn output(data: Option<String>, format: &str) -> RenderingOutput {
        RenderingOutput {
            format: format.into(),
            encoding: "base64".into(),
            data,
            identifier: None,
            width: 3,
            height: 2,
            actual_bbox: (0, 0, 0, 0),
        }
    }

    #[test]
    fn test_pgm_header() {
        let pgm = encode_pgm(&sample());
        assert!(pgm.starts_with(b"P5\n3 2\n255\n"));
        assert_eq!(pgm.len(), 11 + 6);
    }

    #[test]
    fn test_decode_full_pgm_payload() {
        let encoded = encode_base64(&encode_pgm(&sample()));
        let bitmap = decode_rendering(&output(Some(encoded), "pgm")).unwrap();
        assert_eq!(bitmap, sample());
    }

    #[test]
    fn test_decode_raw_payload() {
        let encoded = encode_base64(sample().pixels());
        let bitmap = decode_rendering(&output(Some(encoded), "pgm")).unwrap();
        assert_eq!(bitmap.shape(), (2, 3));
    }

    #[test]
    fn test_decode_png_payload() {
        let encoded = encode_base64(&encode_png(&sample()).unwrap());
        let bitmap = decode_rendering(&output(Some(encoded), "png")).unwrap();
        assert_eq!(bitmap, sample());
    }

    #[test]
    fn test_byte_count_mismatch_is_decode_error() {
        let encoded = encode_base64(&[1, 2, 3]);
        assert!(matches!(
            decode_rendering(&output(Some(encoded), "pgm")),
            Err(RenderError::Decode(_))
        ));
    }

    #[test]
    fn test_pgm_with_comment() {
        let mut bytes = b"P5\n# made by hand\n2 1\n255\n".to_vec();
        bytes.extend_from_slice(&[7, 9]);
        let bitmap = decode_pgm(&bytes).unwrap();
        assert_eq!(bitmap.pixels(), &[7, 9]);
    }

    #[test]
    fn test_decode_identifier_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glyph.pgm");
        std::fs::write(&path, encode_pgm(&sample())).unwrap();

        let mut out = output(None, "pgm");
        out.identifier = Some(path.to_string_lossy().into_owned());
        assert_eq!(decode_rendering(&out).unwrap(), sample());
    }

    #[test]
    fn test_missing_payload() {
        assert!(decode_rendering(&output(None, "pgm")).is_err());
    }

    #[test]
    fn test_encode_rendering_records_bbox() {
        let out = encode_rendering(&sample(), "pgm").unwrap();
        assert_eq!(out.actual_bbox, (0, 0, 3, 2));
        assert!(encode_rendering(&sample(), "svg").is_err());
    }
}
