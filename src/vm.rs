//! The Sparkle virtual machine: buffer and matrix register arenas plus the
//! last-reason string reported with script diagnostics.
//!
//! Register-index and value-range violations on these entry points are
//! programming errors (the script layer validates before calling) and
//! panic; I/O and decode problems are returned as errors and recorded as
//! the last reason.

use std::path::Path;

use crate::buffer::{Channels, PixelBuffer};
use crate::codec;
use crate::error::{SparkleError, SparkleResult};
use crate::matrix::Matrix;
use crate::mjpeg;
use crate::pixel::Argb8;

/// Most buffer registers an instance may be initialized with.
pub const MAX_BUF_COUNT: i32 = 4096;

/// Most matrix registers an instance may be initialized with.
pub const MAX_MAT_COUNT: i32 = 4096;

pub struct Vm {
    buffers: Vec<PixelBuffer>,
    matrices: Vec<Matrix>,
    last_reason: Option<String>,
}

impl Vm {
    /// Construct a VM with fixed-size register arenas.
    ///
    /// Buffers start as 1x1 grayscale, unloaded; matrices start as the
    /// identity with a cached identity inverse.
    pub fn new(bufc: i32, matc: i32) -> Self {
        assert!(
            (0..=MAX_BUF_COUNT).contains(&bufc) && (0..=MAX_MAT_COUNT).contains(&matc),
            "register counts out of range"
        );
        Self {
            buffers: vec![PixelBuffer::new(); bufc as usize],
            matrices: vec![Matrix::identity(); matc as usize],
            last_reason: None,
        }
    }

    pub fn bufc(&self) -> i32 {
        self.buffers.len() as i32
    }

    pub fn matc(&self) -> i32 {
        self.matrices.len() as i32
    }

    /// The reason from the most recent failed operation.
    pub fn reason(&self) -> &str {
        self.last_reason.as_deref().unwrap_or("No error")
    }

    fn fail(&mut self, msg: impl Into<String>) -> SparkleError {
        let msg = msg.into();
        self.last_reason = Some(msg.clone());
        SparkleError::vm(msg)
    }

    fn record<T>(&mut self, r: SparkleResult<T>) -> SparkleResult<T> {
        r.map_err(|e| self.fail(e.message()))
    }

    pub(crate) fn buffer(&self, i: i32) -> &PixelBuffer {
        assert!(i >= 0 && i < self.bufc(), "buffer register index out of range");
        &self.buffers[i as usize]
    }

    fn buffer_mut(&mut self, i: i32) -> &mut PixelBuffer {
        assert!(i >= 0 && i < self.bufc(), "buffer register index out of range");
        &mut self.buffers[i as usize]
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut [PixelBuffer] {
        &mut self.buffers
    }

    pub fn dim(&self, i: i32) -> (i32, i32) {
        self.buffer(i).dim()
    }

    pub fn channels(&self, i: i32) -> Channels {
        self.buffer(i).channels()
    }

    pub fn is_loaded(&self, i: i32) -> bool {
        self.buffer(i).is_loaded()
    }

    /// Read-only view of a buffer's pixel storage, if loaded.
    pub fn buffer_bytes(&self, i: i32) -> Option<&[u8]> {
        self.buffer(i).data()
    }

    /// Mutable view of a buffer's pixel storage, if loaded.
    pub fn buffer_bytes_mut(&mut self, i: i32) -> Option<&mut [u8]> {
        self.buffer_mut(i).data_mut()
    }

    /// Re-declare a buffer register, releasing any pixel storage.
    pub fn reset(&mut self, i: i32, w: i32, h: i32, channels: Channels) {
        self.buffer_mut(i).reset(w, h, channels);
    }

    /// Fill a buffer with a solid colour, allocating storage if needed.
    ///
    /// The colour is down-converted to the buffer's channel layout.
    pub fn fill(&mut self, i: i32, color: Argb8) {
        let buf = self.buffer_mut(i);
        let channels = buf.channels();
        let data = buf.ensure_data();
        match channels {
            Channels::Argb => {
                for px in data.chunks_exact_mut(4) {
                    px.copy_from_slice(&[color.a, color.r, color.g, color.b]);
                }
            }
            Channels::Rgb => {
                let f = color.down_rgb();
                for px in data.chunks_exact_mut(3) {
                    px.copy_from_slice(&[f.r, f.g, f.b]);
                }
            }
            Channels::Gray => {
                data.fill(color.down_gray());
            }
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub fn load_png(&mut self, i: i32, path: &Path) -> SparkleResult<()> {
        let (w, h) = self.dim(i);
        let channels = self.channels(i);
        match codec::read_png_into(path, w, h, channels) {
            Ok(data) => {
                self.buffer_mut(i).set_data(data);
                Ok(())
            }
            Err(e) => {
                self.buffer_mut(i).unload();
                Err(self.fail(e.message()))
            }
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub fn load_jpeg(&mut self, i: i32, path: &Path) -> SparkleResult<()> {
        let (w, h) = self.dim(i);
        let channels = self.channels(i);
        match codec::read_jpeg_into(path, w, h, channels) {
            Ok(data) => {
                self.buffer_mut(i).set_data(data);
                Ok(())
            }
            Err(e) => {
                self.buffer_mut(i).unload();
                Err(self.fail(e.message()))
            }
        }
    }

    /// Load frame `f` (0-based) of a raw MJPEG sequence via its index file.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn load_frame(&mut self, i: i32, f: i32, index_path: &str) -> SparkleResult<()> {
        let (w, h) = self.dim(i);
        let channels = self.channels(i);
        let result = Self::locate_and_decode_frame(index_path, f, w, h, channels);
        match result {
            Ok(data) => {
                self.buffer_mut(i).set_data(data);
                Ok(())
            }
            Err(e) => {
                self.buffer_mut(i).unload();
                Err(self.fail(e.message()))
            }
        }
    }

    fn locate_and_decode_frame(
        index_path: &str,
        f: i32,
        w: i32,
        h: i32,
        channels: Channels,
    ) -> SparkleResult<Vec<u8>> {
        let stream = mjpeg::stream_path(index_path)?;
        let offsets = mjpeg::read_index(Path::new(index_path))?;
        let offset = mjpeg::frame_offset(&offsets, f)
            .ok_or_else(|| SparkleError::vm("Invalid frame index"))?;
        codec::read_jpeg_frame_into(Path::new(&stream), offset, w, h, channels)
    }

    pub fn store_png(&mut self, i: i32, path: &Path) -> SparkleResult<()> {
        let (w, h) = self.dim(i);
        let channels = self.channels(i);
        let r = match self.buffer(i).data() {
            Some(data) => codec::write_png(path, w, h, channels, data),
            None => Err(SparkleError::vm("Buffer must be full to store")),
        };
        self.record(r)
    }

    /// Store as JPEG; `append` concatenates a complete stream onto the
    /// file, which is how raw MJPEG sequences are produced.
    pub fn store_jpeg(&mut self, i: i32, path: &Path, append: bool, q: i32) -> SparkleResult<()> {
        let (w, h) = self.dim(i);
        let channels = self.channels(i);
        let q = q.clamp(0, 100);
        let r = match self.buffer(i).data() {
            Some(data) => codec::write_jpeg(path, w, h, channels, data, append, q),
            None => Err(SparkleError::vm("Buffer must be full to store")),
        };
        self.record(r)
    }

    /// Invert every colour channel of a loaded buffer, leaving alpha alone.
    pub fn color_invert(&mut self, i: i32) -> SparkleResult<()> {
        if !self.is_loaded(i) {
            return Err(self.fail("Buffer must be full to invert"));
        }
        let buf = self.buffer_mut(i);
        let channels = buf.channels();
        let data = buf.data_mut().unwrap();
        match channels {
            Channels::Gray | Channels::Rgb => {
                for b in data {
                    *b = 255 - *b;
                }
            }
            Channels::Argb => {
                for px in data.chunks_exact_mut(4) {
                    px[1] = 255 - px[1];
                    px[2] = 255 - px[2];
                    px[3] = 255 - px[3];
                }
            }
        }
        Ok(())
    }

    pub fn matrix(&self, m: i32) -> &Matrix {
        assert!(m >= 0 && m < self.matc(), "matrix register index out of range");
        &self.matrices[m as usize]
    }

    pub(crate) fn matrix_mut(&mut self, m: i32) -> &mut Matrix {
        assert!(m >= 0 && m < self.matc(), "matrix register index out of range");
        &mut self.matrices[m as usize]
    }

    pub fn matrix_reset(&mut self, m: i32) {
        *self.matrix_mut(m) = Matrix::identity();
    }

    /// `m <- a * b`. The destination must differ from both operands; the
    /// operands may alias each other.
    pub fn matrix_multiply(&mut self, m: i32, a: i32, b: i32) {
        assert!(
            m != a && m != b,
            "multiply destination must differ from operands"
        );
        let r = Matrix::multiply(*self.matrix(a), *self.matrix(b));
        *self.matrix_mut(m) = r;
    }

    pub fn matrix_translate(&mut self, m: i32, tx: f64, ty: f64) {
        self.matrix_mut(m).translate(tx, ty);
    }

    pub fn matrix_scale(&mut self, m: i32, sx: f64, sy: f64) {
        self.matrix_mut(m).scale(sx, sy);
    }

    pub fn matrix_rotate(&mut self, m: i32, deg: f64) {
        self.matrix_mut(m).rotate(deg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_vm_has_unloaded_1x1_buffers_and_identity_matrices() {
        let vm = Vm::new(2, 1);
        assert_eq!(vm.bufc(), 2);
        assert_eq!(vm.matc(), 1);
        assert_eq!(vm.dim(0), (1, 1));
        assert!(!vm.is_loaded(0));
        assert!(vm.matrix(0).is_inverse_cached());
        assert_eq!(vm.reason(), "No error");
    }

    #[test]
    fn fill_converts_to_buffer_channels() {
        let mut vm = Vm::new(3, 0);
        vm.reset(0, 2, 1, Channels::Argb);
        vm.fill(0, Argb8::new(128, 255, 0, 0));
        assert_eq!(vm.buffer_bytes(0).unwrap(), &[128, 255, 0, 0, 128, 255, 0, 0]);

        vm.reset(1, 2, 1, Channels::Rgb);
        vm.fill(1, Argb8::new(255, 10, 20, 30));
        assert_eq!(vm.buffer_bytes(1).unwrap(), &[10, 20, 30, 10, 20, 30]);

        vm.reset(2, 1, 1, Channels::Gray);
        vm.fill(2, Argb8::new(255, 10, 20, 30));
        assert_eq!(vm.buffer_bytes(2).unwrap(), &[18]);
    }

    #[test]
    fn reset_unloads_and_resizes() {
        let mut vm = Vm::new(1, 0);
        vm.reset(0, 4, 4, Channels::Rgb);
        vm.fill(0, Argb8::new(255, 1, 2, 3));
        assert!(vm.is_loaded(0));
        vm.reset(0, 2, 2, Channels::Gray);
        assert!(!vm.is_loaded(0));
        assert_eq!(vm.dim(0), (2, 2));
    }

    #[test]
    fn color_invert_skips_alpha() {
        let mut vm = Vm::new(1, 0);
        vm.reset(0, 1, 1, Channels::Argb);
        vm.fill(0, Argb8::new(100, 0, 128, 255));
        vm.color_invert(0).unwrap();
        assert_eq!(vm.buffer_bytes(0).unwrap(), &[100, 255, 127, 0]);
    }

    #[test]
    fn color_invert_requires_loaded_buffer() {
        let mut vm = Vm::new(1, 0);
        assert!(vm.color_invert(0).is_err());
        assert_eq!(vm.reason(), "Buffer must be full to invert");
    }

    #[test]
    fn failed_load_unloads_buffer_and_records_reason() {
        let mut vm = Vm::new(1, 0);
        vm.reset(0, 2, 2, Channels::Rgb);
        vm.fill(0, Argb8::new(255, 9, 9, 9));
        let err = vm.load_png(0, Path::new("/nonexistent/sparkle.png"));
        assert!(err.is_err());
        assert!(!vm.is_loaded(0));
        assert_ne!(vm.reason(), "No error");
    }

    #[test]
    fn store_requires_loaded_buffer() {
        let mut vm = Vm::new(1, 0);
        let err = vm.store_png(0, Path::new("/tmp/sparkle_unloaded.png"));
        assert!(err.is_err());
        assert_eq!(vm.reason(), "Buffer must be full to store");
    }

    #[test]
    fn matrix_multiply_rejects_aliased_destination() {
        let mut vm = Vm::new(0, 2);
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            vm.matrix_multiply(0, 0, 1);
        }));
        assert!(caught.is_err());
    }
}
