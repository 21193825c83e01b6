//! Motion-JPEG index files.
//!
//! An index is a sequence of big-endian signed 64-bit integers: a count K
//! followed by K strictly ascending, non-negative byte offsets of JPEG
//! frames within the companion stream. The stream path is the index path
//! with its last `.`-suffix stripped.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{SparkleError, SparkleResult};

/// Derive the companion stream path from an index path.
///
/// The searchable portion is terminated by forward or back slashes; the
/// path must contain a `.` after any separator and not as its first
/// character.
pub fn stream_path(index_path: &str) -> SparkleResult<String> {
    let mut last_dot: Option<usize> = None;
    let mut last_sep: Option<usize> = None;
    for (i, b) in index_path.bytes().enumerate() {
        match b {
            b'.' => last_dot = Some(i),
            b'/' | b'\\' => last_sep = Some(i),
            _ => {}
        }
    }
    let dot = match last_dot {
        Some(d) if d > 0 => d,
        _ => return Err(SparkleError::codec("Invalid index file path")),
    };
    if let Some(sep) = last_sep
        && sep > dot
    {
        return Err(SparkleError::codec("Invalid index file path"));
    }
    Ok(index_path[..dot].to_owned())
}

/// Read and validate a complete index file.
pub fn read_index(path: &Path) -> SparkleResult<Vec<u64>> {
    let file = File::open(path).map_err(|_| SparkleError::codec("Failed to open index file"))?;
    let mut reader = BufReader::new(file);

    let count = read_be(&mut reader)?;
    if count < 0 {
        return Err(SparkleError::codec("Invalid index file"));
    }

    let mut offsets = Vec::new();
    let mut prev: Option<i64> = None;
    for _ in 0..count {
        let v = read_be(&mut reader)?;
        if v < 0 || prev.is_some_and(|p| v <= p) {
            return Err(SparkleError::codec("Invalid index file"));
        }
        prev = Some(v);
        offsets.push(v as u64);
    }
    Ok(offsets)
}

/// Write an index file in the canonical big-endian layout.
pub fn write_index(path: &Path, offsets: &[u64]) -> SparkleResult<()> {
    let file = File::create(path)
        .map_err(|e| SparkleError::codec(format!("Failed to create index file: {e}")))?;
    let mut writer = BufWriter::new(file);
    write_be(&mut writer, offsets.len() as i64)?;
    for &o in offsets {
        write_be(&mut writer, o as i64)?;
    }
    writer
        .flush()
        .map_err(|e| SparkleError::codec(format!("Failed to write index file: {e}")))
}

/// Byte offset of frame `f` within the stream, if the index covers it.
pub fn frame_offset(offsets: &[u64], f: i32) -> Option<u64> {
    if f < 0 {
        return None;
    }
    offsets.get(f as usize).copied()
}

fn read_be(r: &mut impl Read) -> SparkleResult<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)
        .map_err(|_| SparkleError::codec("Invalid index file"))?;
    Ok(i64::from_be_bytes(buf))
}

fn write_be(w: &mut impl Write, v: i64) -> SparkleResult<()> {
    w.write_all(&v.to_be_bytes())
        .map_err(|e| SparkleError::codec(format!("Failed to write index file: {e}")))
}
