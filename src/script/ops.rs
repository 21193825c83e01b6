//! Operator registry and the built-in operator set.
//!
//! Operators read their arguments from the top of the interpreter stack
//! through typed accessors and pop them only on success. The sticky sample
//! configuration lives here, in the script layer; each `sample` invocation
//! marshals it into a fresh parameter block for the stateless engine.

use std::collections::HashMap;
use std::path::Path;

use crate::buffer::{Channels, MAX_DIM};
use crate::error::{SparkleError, SparkleResult};
use crate::pixel::Argb8;
use crate::sample::{Algorithm, MaskMode, SampleParams, SrcRect, XSide, YSide};
use crate::script::stack::ScriptStack;
use crate::vm::Vm;

/// Longest registrable operator name in bytes.
pub const MAX_OP_NAME: usize = 255;

pub type OpFn = fn(&mut OpCtx<'_>) -> SparkleResult<()>;

/// Everything an operator may touch during one invocation.
pub struct OpCtx<'a> {
    pub vm: &'a mut Vm,
    pub stack: &'a mut ScriptStack,
    pub sampler: &'a mut SamplerConfig,
    pub module: &'a str,
    pub line: u64,
}

/// Name-to-function operator table. Registration is init-time only;
/// invalid or duplicate names are programming errors.
#[derive(Default)]
pub struct OperatorRegistry {
    map: HashMap<&'static str, OpFn>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in operator installed.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        register_core(&mut reg);
        register_sample(&mut reg);
        reg
    }

    pub fn register(&mut self, name: &'static str, f: OpFn) {
        assert!(valid_op_name(name), "invalid operator name: {name}");
        let prev = self.map.insert(name, f);
        assert!(prev.is_none(), "operator registered twice: {name}");
    }

    pub fn get(&self, name: &str) -> Option<OpFn> {
        self.map.get(name).copied()
    }
}

fn valid_op_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_OP_NAME
        && name.as_bytes()[0].is_ascii_alphabetic()
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Sticky sample configuration owned by the script layer.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    src: Option<i32>,
    subarea: Option<Subarea>,
    target: Option<i32>,
    matrix: Option<i32>,
    mask: MaskSel,
    algorithm: Algorithm,
}

#[derive(Debug, Clone, Copy)]
struct Subarea {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    /// Source dimensions captured when the subarea was configured; the
    /// sample operator re-checks them.
    buf_w: i32,
    buf_h: i32,
}

#[derive(Debug, Clone, Copy)]
enum MaskSel {
    Proc {
        x_boundary: f64,
        y_boundary: f64,
        right: bool,
        below: bool,
    },
    Raster(i32),
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            src: None,
            subarea: None,
            target: None,
            matrix: None,
            mask: MaskSel::Proc {
                x_boundary: 0.0,
                y_boundary: 0.0,
                right: false,
                below: false,
            },
            algorithm: Algorithm::Bilinear,
        }
    }
}

impl SamplerConfig {
    fn raster_mask(&self) -> Option<i32> {
        match self.mask {
            MaskSel::Raster(i) => Some(i),
            MaskSel::Proc { .. } => None,
        }
    }

    /// Fail if a raster mask is configured; the procedural mask operators
    /// may not run underneath one.
    fn require_procedural(&self) -> SparkleResult<()> {
        if self.raster_mask().is_some() {
            return Err(SparkleError::script(
                "Can't adjust procedural mask when raster mask set",
            ));
        }
        Ok(())
    }
}

fn check_buf_index(vm: &Vm, i: i32) -> SparkleResult<()> {
    if i < 0 || i >= vm.bufc() {
        return Err(SparkleError::script("Buffer register index out of range"));
    }
    Ok(())
}

fn check_mat_index(vm: &Vm, m: i32) -> SparkleResult<()> {
    if m < 0 || m >= vm.matc() {
        return Err(SparkleError::script("Matrix register index out of range"));
    }
    Ok(())
}

fn check_channel_byte(v: i32) -> SparkleResult<()> {
    if !(0..=255).contains(&v) {
        return Err(SparkleError::script("Channel values out of range"));
    }
    Ok(())
}

fn op_failed(op: &str, vm: &Vm) -> SparkleError {
    SparkleError::script(format!("{op} fail: {}", vm.reason()))
}

/*
 * Core operators
 */

/// `[message:str] print -`
fn op_print(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(1, "print")?;
    let msg = cx.stack.get_str(0, "print")?;
    eprintln!("{}: [Script at line {}] {}", cx.module, cx.line, msg);
    cx.stack.popn(1);
    Ok(())
}

/// `[i] [w] [h] [c] reset -`
fn op_reset(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(4, "reset")?;
    let i = cx.stack.get_int(3, "reset")?;
    let w = cx.stack.get_int(2, "reset")?;
    let h = cx.stack.get_int(1, "reset")?;
    let c = cx.stack.get_int(0, "reset")?;
    check_buf_index(cx.vm, i)?;
    if !(1..=MAX_DIM).contains(&w) || !(1..=MAX_DIM).contains(&h) {
        return Err(SparkleError::script("Dimensions out of range"));
    }
    let channels =
        Channels::from_count(c).ok_or_else(|| SparkleError::script("Invalid channel count"))?;
    cx.vm.reset(i, w, h, channels);
    cx.stack.popn(4);
    Ok(())
}

/// `[i] [a] [r] [g] [b] fill -`
fn op_fill(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(5, "fill")?;
    let i = cx.stack.get_int(4, "fill")?;
    let a = cx.stack.get_int(3, "fill")?;
    let r = cx.stack.get_int(2, "fill")?;
    let g = cx.stack.get_int(1, "fill")?;
    let b = cx.stack.get_int(0, "fill")?;
    check_buf_index(cx.vm, i)?;
    for v in [a, r, g, b] {
        check_channel_byte(v)?;
    }
    cx.vm.fill(i, Argb8::new(a as u8, r as u8, g as u8, b as u8));
    cx.stack.popn(5);
    Ok(())
}

/// `[i] [path] load_png -`
fn op_load_png(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(2, "load_png")?;
    let i = cx.stack.get_int(1, "load_png")?;
    check_buf_index(cx.vm, i)?;
    let path = cx.stack.get_str(0, "load_png")?;
    if cx.vm.load_png(i, Path::new(path)).is_err() {
        return Err(op_failed("load_png", cx.vm));
    }
    cx.stack.popn(2);
    Ok(())
}

/// `[i] [path] load_jpeg -`
fn op_load_jpeg(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(2, "load_jpeg")?;
    let i = cx.stack.get_int(1, "load_jpeg")?;
    check_buf_index(cx.vm, i)?;
    let path = cx.stack.get_str(0, "load_jpeg")?;
    if cx.vm.load_jpeg(i, Path::new(path)).is_err() {
        return Err(op_failed("load_jpeg", cx.vm));
    }
    cx.stack.popn(2);
    Ok(())
}

/// `[i] [f] [path] load_frame -`
fn op_load_frame(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(3, "load_frame")?;
    let i = cx.stack.get_int(2, "load_frame")?;
    let f = cx.stack.get_int(1, "load_frame")?;
    check_buf_index(cx.vm, i)?;
    let path = cx.stack.get_str(0, "load_frame")?;
    if cx.vm.load_frame(i, f, path).is_err() {
        return Err(op_failed("load_frame", cx.vm));
    }
    cx.stack.popn(3);
    Ok(())
}

/// `[i] [path] store_png -`
fn op_store_png(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(2, "store_png")?;
    let i = cx.stack.get_int(1, "store_png")?;
    check_buf_index(cx.vm, i)?;
    let path = cx.stack.get_str(0, "store_png")?;
    if cx.vm.store_png(i, Path::new(path)).is_err() {
        return Err(op_failed("store_png", cx.vm));
    }
    cx.stack.popn(2);
    Ok(())
}

fn store_jpeg_common(cx: &mut OpCtx<'_>, op: &str, append: bool) -> SparkleResult<()> {
    cx.stack.want(3, op)?;
    let i = cx.stack.get_int(2, op)?;
    let q = cx.stack.get_int(0, op)?;
    check_buf_index(cx.vm, i)?;
    let path = cx.stack.get_str(1, op)?;
    if cx
        .vm
        .store_jpeg(i, Path::new(path), append, q.clamp(0, 100))
        .is_err()
    {
        return Err(op_failed(op, cx.vm));
    }
    cx.stack.popn(3);
    Ok(())
}

/// `[i] [path] [q] store_jpeg -`
fn op_store_jpeg(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    store_jpeg_common(cx, "store_jpeg", false)
}

/// `[i] [path] [q] store_mjpg -` (append mode)
fn op_store_mjpg(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    store_jpeg_common(cx, "store_mjpg", true)
}

/// `[i] color_invert -`
fn op_color_invert(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(1, "color_invert")?;
    let i = cx.stack.get_int(0, "color_invert")?;
    check_buf_index(cx.vm, i)?;
    if cx.vm.color_invert(i).is_err() {
        return Err(op_failed("color_invert", cx.vm));
    }
    cx.stack.popn(1);
    Ok(())
}

/// `[m] identity -`
fn op_identity(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(1, "identity")?;
    let m = cx.stack.get_int(0, "identity")?;
    check_mat_index(cx.vm, m)?;
    cx.vm.matrix_reset(m);
    cx.stack.popn(1);
    Ok(())
}

/// `[m] [a] [b] multiply -`
fn op_multiply(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(3, "multiply")?;
    let m = cx.stack.get_int(2, "multiply")?;
    let a = cx.stack.get_int(1, "multiply")?;
    let b = cx.stack.get_int(0, "multiply")?;
    for r in [m, a, b] {
        check_mat_index(cx.vm, r)?;
    }
    if m == a || m == b {
        return Err(SparkleError::script(
            "Multiply result register must differ from operands",
        ));
    }
    cx.vm.matrix_multiply(m, a, b);
    cx.stack.popn(3);
    Ok(())
}

/// `[m] [tx] [ty] translate -`
fn op_translate(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(3, "translate")?;
    let m = cx.stack.get_int(2, "translate")?;
    let tx = cx.stack.get_float(1, "translate")?;
    let ty = cx.stack.get_float(0, "translate")?;
    check_mat_index(cx.vm, m)?;
    cx.vm.matrix_translate(m, tx, ty);
    cx.stack.popn(3);
    Ok(())
}

/// `[m] [sx] [sy] scale -`
fn op_scale(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(3, "scale")?;
    let m = cx.stack.get_int(2, "scale")?;
    let sx = cx.stack.get_float(1, "scale")?;
    let sy = cx.stack.get_float(0, "scale")?;
    check_mat_index(cx.vm, m)?;
    if sx == 0.0 || sy == 0.0 {
        return Err(SparkleError::script("Scale factors must be non-zero"));
    }
    cx.vm.matrix_scale(m, sx, sy);
    cx.stack.popn(3);
    Ok(())
}

/// `[m] [deg] rotate -`
fn op_rotate(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(2, "rotate")?;
    let m = cx.stack.get_int(1, "rotate")?;
    let deg = cx.stack.get_float(0, "rotate")?;
    check_mat_index(cx.vm, m)?;
    cx.vm.matrix_rotate(m, deg);
    cx.stack.popn(2);
    Ok(())
}

/*
 * Sample operators
 */

/// `[i] sample_source -` (whole-buffer mode; clears any subarea)
fn op_sample_source(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(1, "sample_source")?;
    let i = cx.stack.get_int(0, "sample_source")?;
    check_buf_index(cx.vm, i)?;
    cx.sampler.src = Some(i);
    cx.sampler.subarea = None;
    cx.stack.popn(1);
    Ok(())
}

/// `[i] [x] [y] [w] [h] sample_source_area -`
fn op_sample_source_area(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(5, "sample_source_area")?;
    let i = cx.stack.get_int(4, "sample_source_area")?;
    let x = cx.stack.get_int(3, "sample_source_area")?;
    let y = cx.stack.get_int(2, "sample_source_area")?;
    let w = cx.stack.get_int(1, "sample_source_area")?;
    let h = cx.stack.get_int(0, "sample_source_area")?;
    check_buf_index(cx.vm, i)?;
    if w < 1 || h < 1 {
        return Err(SparkleError::script("Subarea dimensions must be positive"));
    }
    let (buf_w, buf_h) = cx.vm.dim(i);
    if x < 0 || x >= buf_w || y < 0 || y >= buf_h {
        return Err(SparkleError::script("Subarea outside of buffer boundaries"));
    }
    if x > buf_w - w || y > buf_h - h {
        return Err(SparkleError::script(
            "Subarea extent outside of buffer boundaries",
        ));
    }
    cx.sampler.src = Some(i);
    cx.sampler.subarea = Some(Subarea {
        x,
        y,
        w,
        h,
        buf_w,
        buf_h,
    });
    cx.stack.popn(5);
    Ok(())
}

/// `[i] sample_target -`
fn op_sample_target(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(1, "sample_target")?;
    let i = cx.stack.get_int(0, "sample_target")?;
    check_buf_index(cx.vm, i)?;
    cx.sampler.target = Some(i);
    cx.stack.popn(1);
    Ok(())
}

/// `[m] sample_matrix -`
fn op_sample_matrix(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(1, "sample_matrix")?;
    let m = cx.stack.get_int(0, "sample_matrix")?;
    check_mat_index(cx.vm, m)?;
    cx.sampler.matrix = Some(m);
    cx.stack.popn(1);
    Ok(())
}

/// `- sample_mask_none -` (reset to the all-pass procedural mask)
fn op_sample_mask_none(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.sampler.mask = MaskSel::Proc {
        x_boundary: 0.0,
        y_boundary: 0.0,
        right: false,
        below: false,
    };
    Ok(())
}

fn mask_boundary_arg(cx: &mut OpCtx<'_>, op: &str) -> SparkleResult<f64> {
    cx.stack.want(1, op)?;
    let v = cx.stack.get_float(0, op)?;
    cx.sampler.require_procedural()?;
    if !(0.0..=1.0).contains(&v) {
        return Err(SparkleError::script(
            "Procedural mask boundary must be in [0.0, 1.0]",
        ));
    }
    Ok(v)
}

/// `[v] sample_mask_x -`
fn op_sample_mask_x(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    let v = mask_boundary_arg(cx, "sample_mask_x")?;
    if let MaskSel::Proc { x_boundary, .. } = &mut cx.sampler.mask {
        *x_boundary = v;
    }
    cx.stack.popn(1);
    Ok(())
}

/// `[v] sample_mask_y -`
fn op_sample_mask_y(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    let v = mask_boundary_arg(cx, "sample_mask_y")?;
    if let MaskSel::Proc { y_boundary, .. } = &mut cx.sampler.mask {
        *y_boundary = v;
    }
    cx.stack.popn(1);
    Ok(())
}

fn set_mask_side(cx: &mut OpCtx<'_>, set_right: Option<bool>, set_below: Option<bool>) -> SparkleResult<()> {
    cx.sampler.require_procedural()?;
    if let MaskSel::Proc { right, below, .. } = &mut cx.sampler.mask {
        if let Some(v) = set_right {
            *right = v;
        }
        if let Some(v) = set_below {
            *below = v;
        }
    }
    Ok(())
}

/// `- sample_mask_left -`
fn op_sample_mask_left(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    set_mask_side(cx, Some(false), None)
}

/// `- sample_mask_right -`
fn op_sample_mask_right(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    set_mask_side(cx, Some(true), None)
}

/// `- sample_mask_above -`
fn op_sample_mask_above(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    set_mask_side(cx, None, Some(false))
}

/// `- sample_mask_below -`
fn op_sample_mask_below(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    set_mask_side(cx, None, Some(true))
}

/// `[i] sample_mask_raster -`
fn op_sample_mask_raster(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.stack.want(1, "sample_mask_raster")?;
    let i = cx.stack.get_int(0, "sample_mask_raster")?;
    check_buf_index(cx.vm, i)?;
    cx.sampler.mask = MaskSel::Raster(i);
    cx.stack.popn(1);
    Ok(())
}

/// `- sample_nearest -`
fn op_sample_nearest(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.sampler.algorithm = Algorithm::Nearest;
    Ok(())
}

/// `- sample_bilinear -`
fn op_sample_bilinear(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.sampler.algorithm = Algorithm::Bilinear;
    Ok(())
}

/// `- sample_bicubic -`
fn op_sample_bicubic(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    cx.sampler.algorithm = Algorithm::Bicubic;
    Ok(())
}

/// `- sample -`
///
/// Validates the sticky configuration against the current register state,
/// then marshals it into one engine invocation.
fn op_sample(cx: &mut OpCtx<'_>) -> SparkleResult<()> {
    let s = &cx.sampler;
    let src = s
        .src
        .ok_or_else(|| SparkleError::script("Source must be configured before sample"))?;
    let target = s
        .target
        .ok_or_else(|| SparkleError::script("Target must be configured before sample"))?;
    let matrix = s
        .matrix
        .ok_or_else(|| SparkleError::script("Matrix must be configured before sample"))?;

    if src == target {
        return Err(SparkleError::script(
            "Sample source and target must be different",
        ));
    }
    if let Some(mask) = s.raster_mask() {
        if mask == src {
            return Err(SparkleError::script(
                "Sample source and mask must be different",
            ));
        }
        if mask == target {
            return Err(SparkleError::script(
                "Sample target and mask must be different",
            ));
        }
    }

    if !cx.vm.is_loaded(src) {
        return Err(SparkleError::script("Sample source buffer is not loaded"));
    }
    if !cx.vm.is_loaded(target) {
        return Err(SparkleError::script("Sample target buffer is not loaded"));
    }
    if let Some(mask) = s.raster_mask() {
        if !cx.vm.is_loaded(mask) {
            return Err(SparkleError::script("Mask buffer is not loaded"));
        }
        if cx.vm.channels(mask) != Channels::Gray {
            return Err(SparkleError::script("Mask buffer must be grayscale"));
        }
        if cx.vm.dim(mask) != cx.vm.dim(target) {
            return Err(SparkleError::script(
                "Mask buffer must match target dimensions",
            ));
        }
    }
    if let Some(sub) = s.subarea
        && cx.vm.dim(src) != (sub.buf_w, sub.buf_h)
    {
        return Err(SparkleError::script("Subarea no longer valid for source"));
    }

    let params = SampleParams {
        src_buf: src,
        target_buf: target,
        src_area: s.subarea.map(|a| SrcRect {
            x: a.x,
            y: a.y,
            w: a.w,
            h: a.h,
        }),
        t_matrix: matrix,
        mask: match s.mask {
            MaskSel::Raster(i) => MaskMode::Raster { mask_buf: i },
            MaskSel::Proc {
                x_boundary,
                y_boundary,
                right,
                below,
            } => MaskMode::Procedural {
                x_boundary,
                y_boundary,
                x_side: if right { XSide::Right } else { XSide::Left },
                y_side: if below { YSide::Below } else { YSide::Above },
            },
        },
        algorithm: s.algorithm,
    };
    cx.vm.sample(&params);
    Ok(())
}

fn register_core(reg: &mut OperatorRegistry) {
    reg.register("print", op_print);
    reg.register("reset", op_reset);
    reg.register("fill", op_fill);
    reg.register("load_png", op_load_png);
    reg.register("load_jpeg", op_load_jpeg);
    reg.register("load_frame", op_load_frame);
    reg.register("store_png", op_store_png);
    reg.register("store_jpeg", op_store_jpeg);
    reg.register("store_mjpg", op_store_mjpg);
    reg.register("color_invert", op_color_invert);
    reg.register("identity", op_identity);
    reg.register("multiply", op_multiply);
    reg.register("translate", op_translate);
    reg.register("scale", op_scale);
    reg.register("rotate", op_rotate);
}

fn register_sample(reg: &mut OperatorRegistry) {
    reg.register("sample", op_sample);
    reg.register("sample_source", op_sample_source);
    reg.register("sample_source_area", op_sample_source_area);
    reg.register("sample_target", op_sample_target);
    reg.register("sample_matrix", op_sample_matrix);
    reg.register("sample_mask_none", op_sample_mask_none);
    reg.register("sample_mask_x", op_sample_mask_x);
    reg.register("sample_mask_y", op_sample_mask_y);
    reg.register("sample_mask_left", op_sample_mask_left);
    reg.register("sample_mask_right", op_sample_mask_right);
    reg.register("sample_mask_above", op_sample_mask_above);
    reg.register("sample_mask_below", op_sample_mask_below);
    reg.register("sample_mask_raster", op_sample_mask_raster);
    reg.register("sample_nearest", op_sample_nearest);
    reg.register("sample_bilinear", op_sample_bilinear);
    reg.register("sample_bicubic", op_sample_bicubic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::stack::STACK_HEIGHT;

    fn ctx_parts() -> (Vm, ScriptStack, SamplerConfig) {
        (Vm::new(4, 2), ScriptStack::new(STACK_HEIGHT), SamplerConfig::default())
    }

    fn run(
        vm: &mut Vm,
        stack: &mut ScriptStack,
        sampler: &mut SamplerConfig,
        op: OpFn,
    ) -> SparkleResult<()> {
        op(&mut OpCtx {
            vm,
            stack,
            sampler,
            module: "test",
            line: 1,
        })
    }

    #[test]
    fn builtin_registry_is_complete() {
        let reg = OperatorRegistry::with_builtins();
        for name in [
            "print",
            "reset",
            "fill",
            "load_png",
            "load_jpeg",
            "load_frame",
            "store_png",
            "store_jpeg",
            "store_mjpg",
            "color_invert",
            "identity",
            "multiply",
            "translate",
            "scale",
            "rotate",
            "sample",
            "sample_source",
            "sample_source_area",
            "sample_target",
            "sample_matrix",
            "sample_mask_none",
            "sample_mask_x",
            "sample_mask_y",
            "sample_mask_left",
            "sample_mask_right",
            "sample_mask_above",
            "sample_mask_below",
            "sample_mask_raster",
            "sample_nearest",
            "sample_bilinear",
            "sample_bicubic",
        ] {
            assert!(reg.get(name).is_some(), "missing operator {name}");
        }
        assert!(reg.get("no_such_op").is_none());
    }

    #[test]
    fn reset_validates_arguments() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        for v in [0, 2, 2, 2] {
            stack.push_int(v).unwrap();
        }
        assert!(run(&mut vm, &mut stack, &mut sampler, op_reset).is_err());
        // arguments stay on the stack after a failed operator
        assert_eq!(stack.len(), 4);
    }

    #[test]
    fn reset_pops_on_success() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        for v in [0, 2, 2, 3] {
            stack.push_int(v).unwrap();
        }
        run(&mut vm, &mut stack, &mut sampler, op_reset).unwrap();
        assert!(stack.is_empty());
        assert_eq!(vm.dim(0), (2, 2));
    }

    #[test]
    fn mask_x_accepts_integers_and_checks_range() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        stack.push_int(1).unwrap();
        run(&mut vm, &mut stack, &mut sampler, op_sample_mask_x).unwrap();

        stack.push_float(1.5).unwrap();
        assert!(run(&mut vm, &mut stack, &mut sampler, op_sample_mask_x).is_err());
    }

    #[test]
    fn procedural_ops_fail_under_raster_mask() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        stack.push_int(2).unwrap();
        run(&mut vm, &mut stack, &mut sampler, op_sample_mask_raster).unwrap();
        assert!(run(&mut vm, &mut stack, &mut sampler, op_sample_mask_left).is_err());
        stack.push_float(0.5).unwrap();
        assert!(run(&mut vm, &mut stack, &mut sampler, op_sample_mask_x).is_err());
        stack.popn(1);
        // releasing the raster mask re-enables them
        run(&mut vm, &mut stack, &mut sampler, op_sample_mask_none).unwrap();
        run(&mut vm, &mut stack, &mut sampler, op_sample_mask_left).unwrap();
    }

    #[test]
    fn sample_requires_configuration_and_distinct_registers() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        let e = run(&mut vm, &mut stack, &mut sampler, op_sample).unwrap_err();
        assert!(e.message().contains("Source"));

        sampler.src = Some(0);
        sampler.target = Some(0);
        sampler.matrix = Some(0);
        let e = run(&mut vm, &mut stack, &mut sampler, op_sample).unwrap_err();
        assert!(e.message().contains("must be different"));

        sampler.target = Some(1);
        let e = run(&mut vm, &mut stack, &mut sampler, op_sample).unwrap_err();
        assert!(e.message().contains("not loaded"));
    }

    #[test]
    fn sample_rejects_stale_subarea() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        vm.reset(0, 4, 4, Channels::Rgb);
        vm.fill(0, Argb8::new(255, 1, 2, 3));
        vm.reset(1, 4, 4, Channels::Rgb);
        vm.fill(1, Argb8::new(255, 0, 0, 0));
        for v in [0, 1, 1, 2, 2] {
            stack.push_int(v).unwrap();
        }
        run(&mut vm, &mut stack, &mut sampler, op_sample_source_area).unwrap();
        sampler.target = Some(1);
        sampler.matrix = Some(0);

        vm.reset(0, 8, 8, Channels::Rgb);
        vm.fill(0, Argb8::new(255, 1, 2, 3));
        let e = run(&mut vm, &mut stack, &mut sampler, op_sample).unwrap_err();
        assert!(e.message().contains("Subarea no longer valid"));
    }

    #[test]
    fn subarea_bounds_are_checked() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        vm.reset(0, 4, 4, Channels::Rgb);
        for v in [0, 3, 3, 2, 2] {
            stack.push_int(v).unwrap();
        }
        let e = run(&mut vm, &mut stack, &mut sampler, op_sample_source_area).unwrap_err();
        assert!(e.message().contains("extent"));
    }

    #[test]
    fn algorithm_selectors_are_distinct() {
        let (mut vm, mut stack, mut sampler) = ctx_parts();
        run(&mut vm, &mut stack, &mut sampler, op_sample_nearest).unwrap();
        assert_eq!(sampler.algorithm, Algorithm::Nearest);
        run(&mut vm, &mut stack, &mut sampler, op_sample_bicubic).unwrap();
        assert_eq!(sampler.algorithm, Algorithm::Bicubic);
        run(&mut vm, &mut stack, &mut sampler, op_sample_bilinear).unwrap();
        assert_eq!(sampler.algorithm, Algorithm::Bilinear);
    }
}
