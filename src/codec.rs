//! PNG and JPEG bridge over the `image` crate.
//!
//! All transfer loops convert between the codec's pixel order and the
//! buffer's native layout (grey / R,G,B / A,R,G,B) using the channel
//! conversion rules from the pixel module.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::buffer::Channels;
use crate::error::{SparkleError, SparkleResult};
use crate::pixel::Argb8;

pub(crate) fn read_png_into(
    path: &Path,
    w: i32,
    h: i32,
    channels: Channels,
) -> SparkleResult<Vec<u8>> {
    let img = image::ImageReader::open(path)
        .map_err(|e| SparkleError::codec(format!("Failed to open PNG file: {e}")))?
        .decode()
        .map_err(|e| SparkleError::codec(format!("Failed to decode PNG file: {e}")))?;
    if img.width() != w as u32 || img.height() != h as u32 {
        return Err(SparkleError::codec(
            "PNG file mismatches dimensions of buffer",
        ));
    }

    let rgba = img.to_rgba8();
    let mut out = Vec::with_capacity(w as usize * h as usize * channels.count());
    for px in rgba.pixels() {
        let c = Argb8::new(px[3], px[0], px[1], px[2]);
        match channels {
            Channels::Argb => out.extend_from_slice(&[c.a, c.r, c.g, c.b]),
            Channels::Rgb => {
                let f = c.down_rgb();
                out.extend_from_slice(&[f.r, f.g, f.b]);
            }
            Channels::Gray => out.push(c.down_gray()),
        }
    }
    Ok(out)
}

pub(crate) fn read_jpeg_into(
    path: &Path,
    w: i32,
    h: i32,
    channels: Channels,
) -> SparkleResult<Vec<u8>> {
    let file = File::open(path).map_err(|_| SparkleError::codec("Failed to open JPEG file"))?;
    decode_jpeg_reader(BufReader::new(file), w, h, channels)
}

/// Decode one JPEG frame starting at `offset` within a raw MJPEG stream.
pub(crate) fn read_jpeg_frame_into(
    path: &Path,
    offset: u64,
    w: i32,
    h: i32,
    channels: Channels,
) -> SparkleResult<Vec<u8>> {
    let mut file = File::open(path).map_err(|_| SparkleError::codec("Failed to open JPEG file"))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|_| SparkleError::codec("MJPEG seek error"))?;
    decode_jpeg_reader(BufReader::new(file), w, h, channels)
}

fn decode_jpeg_reader(
    reader: BufReader<File>,
    w: i32,
    h: i32,
    channels: Channels,
) -> SparkleResult<Vec<u8>> {
    let img = image::ImageReader::with_format(reader, image::ImageFormat::Jpeg)
        .decode()
        .map_err(|e| SparkleError::codec(format!("Failed to decode JPEG file: {e}")))?;
    if img.width() != w as u32 || img.height() != h as u32 {
        return Err(SparkleError::codec(
            "JPEG file mismatches dimensions of buffer",
        ));
    }

    let mut out = Vec::with_capacity(w as usize * h as usize * channels.count());
    match img {
        image::DynamicImage::ImageLuma8(gray) => {
            for px in gray.pixels() {
                let v = px[0];
                match channels {
                    Channels::Gray => out.push(v),
                    Channels::Rgb => out.extend_from_slice(&[v, v, v]),
                    Channels::Argb => out.extend_from_slice(&[255, v, v, v]),
                }
            }
        }
        other => {
            let rgb = other.to_rgb8();
            for px in rgb.pixels() {
                let (r, g, b) = (px[0], px[1], px[2]);
                match channels {
                    Channels::Gray => out.push(Argb8::new(255, r, g, b).down_gray()),
                    Channels::Rgb => out.extend_from_slice(&[r, g, b]),
                    Channels::Argb => out.extend_from_slice(&[255, r, g, b]),
                }
            }
        }
    }
    Ok(out)
}

pub(crate) fn write_png(
    path: &Path,
    w: i32,
    h: i32,
    channels: Channels,
    data: &[u8],
) -> SparkleResult<()> {
    let (bytes, color): (Cow<'_, [u8]>, image::ExtendedColorType) = match channels {
        Channels::Argb => {
            let mut rgba = Vec::with_capacity(data.len());
            for px in data.chunks_exact(4) {
                rgba.extend_from_slice(&[px[1], px[2], px[3], px[0]]);
            }
            (Cow::Owned(rgba), image::ExtendedColorType::Rgba8)
        }
        Channels::Rgb => (Cow::Borrowed(data), image::ExtendedColorType::Rgb8),
        Channels::Gray => (Cow::Borrowed(data), image::ExtendedColorType::L8),
    };
    image::save_buffer_with_format(
        path,
        &bytes,
        w as u32,
        h as u32,
        color,
        image::ImageFormat::Png,
    )
    .map_err(|e| SparkleError::codec(format!("Failed to write PNG file: {e}")))
}

/// Write one complete JPEG stream, overwriting or appending.
///
/// Append mode is how raw MJPEG sequences are produced.
pub(crate) fn write_jpeg(
    path: &Path,
    w: i32,
    h: i32,
    channels: Channels,
    data: &[u8],
    append: bool,
    quality: i32,
) -> SparkleResult<()> {
    let q = quality.clamp(1, 100) as u8;
    let (bytes, color): (Cow<'_, [u8]>, image::ExtendedColorType) = match channels {
        Channels::Argb => {
            let mut rgb = Vec::with_capacity(data.len() / 4 * 3);
            for px in data.chunks_exact(4) {
                let f = Argb8::new(px[0], px[1], px[2], px[3]).down_rgb();
                rgb.extend_from_slice(&[f.r, f.g, f.b]);
            }
            (Cow::Owned(rgb), image::ExtendedColorType::Rgb8)
        }
        Channels::Rgb => (Cow::Borrowed(data), image::ExtendedColorType::Rgb8),
        Channels::Gray => (Cow::Borrowed(data), image::ExtendedColorType::L8),
    };

    let file = if append {
        OpenOptions::new().append(true).create(true).open(path)
    } else {
        File::create(path)
    }
    .map_err(|_| SparkleError::codec("Failed to create JPEG file"))?;

    let mut writer = BufWriter::new(file);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, q);
    encoder
        .encode(&bytes, w as u32, h as u32, color)
        .map_err(|e| SparkleError::codec(format!("Failed to encode JPEG file: {e}")))?;
    writer
        .flush()
        .map_err(|e| SparkleError::codec(format!("Failed to write JPEG file: {e}")))
}
