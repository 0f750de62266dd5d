use std::io::Cursor;

use anyhow::Context as _;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Png,
    Jpeg,
    Other,
}

pub fn detect_format(bytes: &[u8]) -> SourceFormat {
    if bytes.starts_with(PNG_MAGIC) {
        SourceFormat::Png
    } else if bytes.starts_with(JPEG_MAGIC) {
        SourceFormat::Jpeg
    } else {
        SourceFormat::Other
    }
}

/// Baseline RGB JPEG ready to be embedded with `DCTDecode`.
#[derive(Debug, Clone)]
pub struct EmbeddableImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

pub fn prepare_for_pdf(bytes: &[u8]) -> anyhow::Result<EmbeddableImage> {
    match detect_format(bytes) {
        SourceFormat::Jpeg => passthrough_jpeg(bytes),
        SourceFormat::Png => {
            let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)
                .context("decode png")?;
            encode_jpeg(&img)
        }
        SourceFormat::Other => {
            let img = image::load_from_memory(bytes).context("decode image from memory")?;
            encode_jpeg(&img)
        }
    }
}

fn passthrough_jpeg(bytes: &[u8]) -> anyhow::Result<EmbeddableImage> {
    let reader = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Jpeg);
    let decoded = reader.decode().context("decode jpeg")?;
    // CMYK and YCCK decode to Rgb8 too; only the frame header shows what
    // DCTDecode will see.
    if jpeg_components(bytes) != Some(3) || decoded.color() != image::ColorType::Rgb8 {
        tracing::debug!(components = ?jpeg_components(bytes), "re-encoding jpeg as rgb");
        return encode_jpeg(&decoded);
    }
    Ok(EmbeddableImage {
        width: decoded.width(),
        height: decoded.height(),
        jpeg: bytes.to_vec(),
    })
}

/// Component count from the first frame header: 1 gray, 3 YCbCr, 4 CMYK or YCCK.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        if marker == 0xFF {
            i += 1;
            continue;
        }
        let is_frame_header =
            (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame_header {
            return bytes.get(i + 9).copied();
        }
        let len = usize::from(u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]));
        if matches!(marker, 0xD9 | 0xDA) || len < 2 {
            return None;
        }
        i += 2 + len;
    }
    None
}

fn encode_jpeg(img: &DynamicImage) -> anyhow::Result<EmbeddableImage> {
    let rgb = flatten_on_white(img);
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        anyhow::bail!("image has no pixels");
    }

    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    rgb.write_with_encoder(encoder).context("encode jpeg")?;

    Ok(EmbeddableImage {
        width,
        height,
        jpeg,
    })
}

fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, px) in rgba.enumerate_pixels() {
        let a = px[3] as u16;
        let blend = |c: u8| ((c as u16 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scales an image to cover the whole canvas, centered. Overflow is cropped by
/// the page box.
pub fn cover_rect(image_width: u32, image_height: u32, canvas_width: f32, canvas_height: f32) -> Rect {
    let iw = image_width.max(1) as f32;
    let ih = image_height.max(1) as f32;
    let scale = (canvas_width / iw).max(canvas_height / ih);
    let width = iw * scale;
    let height = ih * scale;
    Rect {
        x: (canvas_width - width) / 2.0,
        y: (canvas_height - height) / 2.0,
        width,
        height,
    }
}
