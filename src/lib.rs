#![forbid(unsafe_code)]

mod buffer;
mod codec;
mod error;
mod matrix;
mod mjpeg;
mod pixel;
mod sample;
mod script;
mod vm;

pub use buffer::{Channels, MAX_DIM, PixelBuffer};
pub use error::{SparkleError, SparkleResult};
pub use matrix::{Inverse, Matrix};
pub use mjpeg::{frame_offset, read_index, stream_path, write_index};
pub use pixel::{Argb8, ArgbPremul, gray_to_argb, gray_to_rgb, quant_unit, rgb_to_argb};
pub use sample::{Algorithm, MaskMode, SampleParams, SrcRect, XSide, YSide};
pub use script::{
    Cell, MAX_OP_NAME, OpCtx, OpFn, OperatorRegistry, STACK_HEIGHT, SamplerConfig, ScriptStack,
    run_script,
};
pub use vm::{MAX_BUF_COUNT, MAX_MAT_COUNT, Vm};
