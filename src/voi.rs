//! The VOI transform and the composition of the output value chain.
//!
//! This is the rendering core: modality values enter, device-ready output
//! codes leave. Four mutually exclusive VOI branches (no transform, linear
//! window, sigmoid window, VOI LUT) are composed with an optional
//! presentation LUT and an optional display calibration LUT.
//!
//! Every branch resolves its parameters once per frame and then runs a
//! single per-pixel mapping, either directly or through an optimization
//! LUT precomputed over the modality value domain when the domain is
//! small compared to the pixel count. An inverted output range
//! (`low > high`) flips the polarity of all branches.

use std::convert::TryFrom;
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use snafu::Snafu;
use tracing::{debug, warn};

use crate::display::{DisplayFunction, DisplayLut};
use crate::lut::LookupTable;
use crate::pixel::Sample;

/// A VOI window, as a center/width pair.
///
/// A width below 1 is the supplement 33 sentinel for "no window active";
/// it is not representable here, the pipeline tracks it as the absence of
/// a window.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Window {
    /// The window center.
    pub center: f64,
    /// The window width (>= 1).
    pub width: f64,
}

/// A known VOI LUT function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VoiLutFunction {
    /// The LINEAR windowing function.
    Linear,
    /// The SIGMOID windowing function.
    Sigmoid,
}

impl Default for VoiLutFunction {
    fn default() -> Self {
        VoiLutFunction::Linear
    }
}

/// Unrecognized VOI LUT function name.
#[derive(Debug, Copy, Clone, PartialEq, Snafu)]
pub struct FromVoiLutFunctionError {
    _private: (),
}

impl TryFrom<&str> for VoiLutFunction {
    type Error = FromVoiLutFunctionError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim() {
            "LINEAR" => Ok(Self::Linear),
            "SIGMOID" => Ok(Self::Sigmoid),
            _ => Err(FromVoiLutFunctionError { _private: () }),
        }
    }
}

/// A presentation LUT shape.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PresentationLutShape {
    /// No shape explicitly set.
    Default,
    /// The IDENTITY shape: output polarity follows the photometric
    /// interpretation.
    Identity,
    /// The INVERSE shape: opposite output polarity.
    Inverse,
}

impl Default for PresentationLutShape {
    fn default() -> Self {
        PresentationLutShape::Default
    }
}

/// Unrecognized presentation LUT shape name.
#[derive(Debug, Copy, Clone, PartialEq, Snafu)]
pub struct FromPresentationLutShapeError {
    _private: (),
}

impl TryFrom<&str> for PresentationLutShape {
    type Error = FromPresentationLutShapeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim() {
            "IDENTITY" => Ok(Self::Identity),
            "INVERSE" => Ok(Self::Inverse),
            _ => Err(FromPresentationLutShapeError { _private: () }),
        }
    }
}

/// The active VOI branch for one rendering pass.
#[derive(Debug)]
pub(crate) enum VoiMode<'a> {
    /// No VOI transform: scale the absolute modality range linearly.
    None,
    /// A window, applied with the given function.
    Window(Window, VoiLutFunction),
    /// A VOI lookup table.
    Lut(&'a LookupTable),
}

/// All parameters of one frame rendering pass.
#[derive(Debug)]
pub(crate) struct FrameParams<'a> {
    /// offset of the first pixel of the frame in the modality buffer
    pub start: usize,
    /// size of the output frame buffer in pixels
    pub frame_size: usize,
    /// absolute minimum of the modality value domain
    pub abs_min: f64,
    /// number of representable modality values
    pub abs_range: f64,
    /// effective bit depth of the modality values
    pub inter_bits: u16,
    pub voi: VoiMode<'a>,
    pub plut: Option<&'a LookupTable>,
    pub display: Option<&'a DisplayFunction>,
    /// output code for the lower window border (may exceed `high`)
    pub low: u32,
    /// output code for the upper window border
    pub high: u32,
}

/// Render one frame of modality values into output codes.
///
/// The output buffer always has `frame_size` elements; when fewer input
/// pixels than `frame_size` are available, the excess is left at zero.
pub(crate) fn render_frame<I: Sample, O: Sample>(values: &[I], params: &FrameParams<'_>) -> Vec<O> {
    match &params.voi {
        VoiMode::Lut(vlut) => {
            debug!("applying VOI transformation with LUT ({} entries)", vlut.count());
            voi_lut_frame(values, params, vlut)
        }
        VoiMode::Window(window, VoiLutFunction::Linear) => {
            debug!(
                "applying linear VOI transformation with window center = {}, width = {}",
                window.center, window.width
            );
            window_frame(values, params, window.center, window.width)
        }
        VoiMode::Window(window, VoiLutFunction::Sigmoid) => {
            debug!(
                "applying sigmoid VOI transformation with window center = {}, width = {}",
                window.center, window.width
            );
            sigmoid_frame(values, params, window.center, window.width)
        }
        VoiMode::None => {
            debug!("applying no VOI transformation (linear scaling)");
            no_window_frame(values, params)
        }
    }
}

/// Resolve the display LUT for the given input bit width,
/// ignoring the display transformation when it cannot be built.
fn display_lut(display: Option<&DisplayFunction>, bits: u16) -> Option<Arc<DisplayLut>> {
    let display = display?;
    if !display.is_valid() {
        return None;
    }
    match display.lookup_table(bits) {
        Some(lut) => {
            debug!("using display transformation");
            Some(lut)
        }
        None => {
            warn!("cannot create display LUT, ignoring display transformation");
            None
        }
    }
}

/// Run the per-pixel mapping over one frame, zero-filling any excess.
///
/// When the modality value domain is small compared to the pixel count,
/// the mapping is precomputed for every representable value once and
/// applied by table lookup.
fn apply<I: Sample, O: Sample>(
    values: &[I],
    start: usize,
    frame_size: usize,
    abs_min: f64,
    abs_range: f64,
    f: impl Fn(f64) -> f64 + Sync,
) -> Vec<O> {
    let count = frame_size.min(values.len().saturating_sub(start));
    let mut out = vec![O::ZERO; frame_size];
    if count == 0 {
        return out;
    }
    let ocnt = abs_range as usize;
    if std::mem::size_of::<I>() <= 2 && count > 3 * ocnt && ocnt > 0 {
        debug!("using optimized routine with additional LUT ({} entries)", ocnt);
        #[cfg(feature = "rayon")]
        let iter = (0..ocnt).into_par_iter();
        #[cfg(not(feature = "rayon"))]
        let iter = 0..ocnt;
        let table: Vec<O> = iter.map(|i| O::from_f64(f(i as f64 + abs_min))).collect();
        for (o, v) in out[..count].iter_mut().zip(&values[start..start + count]) {
            let index = (v.to_f64().unwrap_or(0.0) - abs_min) as usize;
            *o = table[index.min(ocnt - 1)];
        }
    } else {
        for (o, v) in out[..count].iter_mut().zip(&values[start..start + count]) {
            *o = O::from_f64(f(v.to_f64().unwrap_or(0.0)));
        }
    }
    out
}

/// Fill one frame with a single value, zero-filling any excess.
fn fill<I, O: Sample>(values: &[I], start: usize, frame_size: usize, value: f64) -> Vec<O> {
    let count = frame_size.min(values.len().saturating_sub(start));
    let mut out = vec![O::ZERO; frame_size];
    for o in &mut out[..count] {
        *o = O::from_f64(value);
    }
    out
}

/// Linear scaling of the full absolute modality range (no VOI active).
fn no_window_frame<I: Sample, O: Sample>(values: &[I], p: &FrameParams<'_>) -> Vec<O> {
    let low = p.low as f64;
    let high = p.high as f64;
    let inverted = p.low > p.high;
    let outrange = high - low + 1.0;
    let abs_min = p.abs_min;
    let abs_range = p.abs_range;
    if let Some(plut) = p.plut.filter(|plut| plut.is_valid()) {
        debug!("applying presentation LUT transformation");
        let dlut = display_lut(p.display, plut.bits());
        let gradient1 = plut.count() as f64 / abs_range;
        let index = move |v: f64| ((v - abs_min) * gradient1) as usize;
        match dlut {
            Some(dlut) if inverted => {
                let maxvalue = plut.abs_max_range() - 1.0;
                apply(values, p.start, p.frame_size, abs_min, abs_range, |v| {
                    dlut.value((maxvalue - plut.value(index(v)) as f64) as usize) as f64
                })
            }
            Some(dlut) => apply(values, p.start, p.frame_size, abs_min, abs_range, |v| {
                dlut.value(plut.value(index(v)) as usize) as f64
            }),
            None => {
                let gradient2 = outrange / plut.abs_max_range();
                apply(values, p.start, p.frame_size, abs_min, abs_range, |v| {
                    low + plut.value(index(v)) as f64 * gradient2
                })
            }
        }
    } else {
        let dlut = display_lut(p.display, p.inter_bits);
        match dlut {
            Some(dlut) if inverted => {
                apply(values, p.start, p.frame_size, abs_min, abs_range, |v| {
                    dlut.value(((abs_range - 1.0) - (v - abs_min)) as usize) as f64
                })
            }
            Some(dlut) => apply(values, p.start, p.frame_size, abs_min, abs_range, |v| {
                dlut.value((v - abs_min) as usize) as f64
            }),
            None => {
                let gradient = outrange / abs_range;
                apply(values, p.start, p.frame_size, abs_min, abs_range, |v| {
                    low + (v - abs_min) * gradient
                })
            }
        }
    }
}

/// The linear window, with borders per the supplement 33 definition.
fn window_frame<I: Sample, O: Sample>(
    values: &[I],
    p: &FrameParams<'_>,
    center: f64,
    width: f64,
) -> Vec<O> {
    let low = p.low as f64;
    let high = p.high as f64;
    let inverted = p.low > p.high;
    let outrange = high - low;
    let width_1 = width - 1.0;
    let left_border = center - 0.5 - width_1 / 2.0;
    let right_border = center - 0.5 + width_1 / 2.0;
    if let Some(plut) = p.plut.filter(|plut| plut.is_valid()) {
        debug!("applying presentation LUT transformation");
        let dlut = display_lut(p.display, plut.bits());
        let pcnt = plut.count();
        let plutmax_1 = plut.abs_max_range() - 1.0;
        let gradient1 = if width_1 == 0.0 {
            0.0
        } else {
            (pcnt as f64 - 1.0) / width_1
        };
        let index = move |v: f64| -> usize {
            if v <= left_border {
                0
            } else if v > right_border {
                pcnt - 1
            } else {
                ((v - left_border) * gradient1) as usize
            }
        };
        match dlut {
            Some(dlut) => {
                let maxvalue = (dlut.count() - 1) as f64;
                let offset = if inverted { maxvalue } else { 0.0 };
                let gradient2 = if inverted {
                    -maxvalue / plutmax_1
                } else {
                    maxvalue / plutmax_1
                };
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    dlut.value((offset + plut.value(index(v)) as f64 * gradient2) as usize) as f64
                })
            }
            None => {
                let gradient2 = outrange / plutmax_1;
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    low + plut.value(index(v)) as f64 * gradient2
                })
            }
        }
    } else {
        let dlut = display_lut(p.display, I::BITS);
        match dlut {
            Some(dlut) => {
                let maxvalue = (dlut.count() - 1) as f64;
                let offset = if inverted { maxvalue } else { 0.0 };
                let gradient = if width_1 == 0.0 {
                    0.0
                } else if inverted {
                    -maxvalue / width_1
                } else {
                    maxvalue / width_1
                };
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    let t = (v - left_border).clamp(0.0, width_1);
                    dlut.value((offset + t * gradient) as usize) as f64
                })
            }
            None => {
                let offset = if width_1 == 0.0 {
                    0.0
                } else {
                    high - ((center - 0.5) / width_1 + 0.5) * outrange
                };
                let gradient = if width_1 == 0.0 { 0.0 } else { outrange / width_1 };
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    if v <= left_border {
                        low
                    } else if v > right_border {
                        high
                    } else {
                        offset + v * gradient
                    }
                })
            }
        }
    }
}

/// The sigmoid window per the DICOM sigmoid VOI LUT function.
fn sigmoid_frame<I: Sample, O: Sample>(
    values: &[I],
    p: &FrameParams<'_>,
    center: f64,
    width: f64,
) -> Vec<O> {
    let low = p.low as f64;
    let high = p.high as f64;
    let inverted = p.low > p.high;
    let outrange = high - low;
    let sigmoid = move |v: f64| 1.0 / (1.0 + f64::exp(-4.0 * (v - center) / width));
    if let Some(plut) = p.plut.filter(|plut| plut.is_valid()) {
        debug!("applying presentation LUT transformation");
        let dlut = display_lut(p.display, plut.bits());
        let plutcnt_1 = (plut.count() - 1) as f64;
        let plutmax_1 = plut.abs_max_range() - 1.0;
        let index = move |v: f64| (plutcnt_1 * sigmoid(v)) as usize;
        match dlut {
            Some(dlut) => {
                let maxvalue = (dlut.count() - 1) as f64;
                let offset = if inverted { maxvalue } else { 0.0 };
                let gradient = if inverted {
                    -maxvalue / plutmax_1
                } else {
                    maxvalue / plutmax_1
                };
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    dlut.value((offset + plut.value(index(v)) as f64 * gradient) as usize) as f64
                })
            }
            None => {
                let gradient = outrange / plutmax_1;
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    low + plut.value(index(v)) as f64 * gradient
                })
            }
        }
    } else {
        let dlut = display_lut(p.display, I::BITS);
        match dlut {
            Some(dlut) => {
                let maxvalue = (dlut.count() - 1) as f64;
                let outrange2 = if inverted { -maxvalue } else { maxvalue };
                let offset = if inverted { maxvalue } else { 0.0 };
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    dlut.value((offset + outrange2 * sigmoid(v)) as usize) as f64
                })
            }
            None => apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                low + outrange * sigmoid(v)
            }),
        }
    }
}

/// The VOI LUT branch, clamping to the first/last table entry.
fn voi_lut_frame<I: Sample, O: Sample>(
    values: &[I],
    p: &FrameParams<'_>,
    vlut: &LookupTable,
) -> Vec<O> {
    let low = p.low as f64;
    let high = p.high as f64;
    let inverted = p.low > p.high;
    let outrange = high - low + 1.0;
    if vlut.is_constant() {
        // all LUT entries are equal: the whole frame renders to one value
        let minvalue = vlut.min_value() as f64;
        let value = if let Some(plut) = p.plut.filter(|plut| plut.is_valid()) {
            debug!("applying presentation LUT transformation");
            let dlut = display_lut(p.display, plut.bits());
            let index = ((minvalue / vlut.abs_max_range()) * plut.count() as f64) as usize;
            match dlut {
                Some(dlut) if inverted => {
                    dlut.value((plut.abs_max_range() - plut.value(index) as f64 - 1.0) as usize)
                        as f64
                }
                Some(dlut) => dlut.value(plut.value(index) as usize) as f64,
                None => low + plut.value(index) as f64 * outrange / plut.abs_max_range(),
            }
        } else {
            let dlut = display_lut(p.display, vlut.bits());
            match dlut {
                Some(dlut) if inverted => {
                    dlut.value((vlut.abs_max_range() - minvalue - 1.0) as usize) as f64
                }
                Some(dlut) => dlut.value(minvalue as usize) as f64,
                None => low + (minvalue / vlut.abs_max_range()) * outrange,
            }
        };
        return fill(values, p.start, p.frame_size, value);
    }
    let first_entry = vlut.first_entry() as f64;
    let last_entry = vlut.last_entry() as f64;
    if let Some(plut) = p.plut.filter(|plut| plut.is_valid()) {
        debug!("applying presentation LUT transformation");
        let dlut = display_lut(p.display, plut.bits());
        let gradient1 = plut.count() as f64 / vlut.abs_max_range();
        let first_index = (vlut.first_value() as f64 * gradient1) as usize;
        let last_index = (vlut.last_value() as f64 * gradient1) as usize;
        let index = move |v: f64| -> usize {
            if v <= first_entry {
                first_index
            } else if v >= last_entry {
                last_index
            } else {
                (vlut.lookup(v as i64) as f64 * gradient1) as usize
            }
        };
        match dlut {
            Some(dlut) if inverted => {
                let maxvalue = plut.abs_max_range() - 1.0;
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    dlut.value((maxvalue - plut.value(index(v)) as f64) as usize) as f64
                })
            }
            Some(dlut) => apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                dlut.value(plut.value(index(v)) as usize) as f64
            }),
            None => {
                let gradient2 = outrange / plut.abs_max_range();
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    low + plut.value(index(v)) as f64 * gradient2
                })
            }
        }
    } else {
        let dlut = display_lut(p.display, vlut.bits());
        let gradient = outrange / vlut.abs_max_range();
        let first_value = low + vlut.first_value() as f64 * gradient;
        let last_value = low + vlut.last_value() as f64 * gradient;
        match dlut {
            Some(dlut) if inverted => {
                let maxvalue = vlut.abs_max_range() - 1.0;
                apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                    dlut.value((maxvalue - vlut.lookup(v as i64) as f64) as usize) as f64
                })
            }
            Some(dlut) => apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                dlut.value(vlut.lookup(v as i64) as usize) as f64
            }),
            None => apply(values, p.start, p.frame_size, p.abs_min, p.abs_range, |v| {
                if v <= first_entry {
                    first_value
                } else if v >= last_entry {
                    last_value
                } else {
                    low + vlut.lookup(v as i64) as f64 * gradient
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayModel;

    fn params(voi: VoiMode<'_>, frame_size: usize) -> FrameParams<'_> {
        FrameParams {
            start: 0,
            frame_size,
            abs_min: 0.0,
            abs_range: 256.0,
            inter_bits: 8,
            voi,
            plut: None,
            display: None,
            low: 0,
            high: 255,
        }
    }

    #[test]
    fn window_maps_values_below_the_left_border_to_low() {
        // center 40, width 400: left border = 40 - 0.5 - 199.5 = -160
        let values = [-408i16, -161, -160];
        let p = FrameParams {
            abs_min: -1024.0,
            abs_range: 8192.0,
            inter_bits: 13,
            ..params(
                VoiMode::Window(
                    Window {
                        center: 40.0,
                        width: 400.0,
                    },
                    VoiLutFunction::Linear,
                ),
                3,
            )
        };
        let out: Vec<u8> = render_frame(&values, &p);
        assert_eq!(out, vec![0, 0, 0]);
    }

    #[test]
    fn window_maps_values_above_the_right_border_to_high() {
        let values = [240i16, 1000];
        let p = FrameParams {
            abs_min: -1024.0,
            abs_range: 8192.0,
            inter_bits: 13,
            ..params(
                VoiMode::Window(
                    Window {
                        center: 40.0,
                        width: 400.0,
                    },
                    VoiLutFunction::Linear,
                ),
                2,
            )
        };
        let out: Vec<u8> = render_frame(&values, &p);
        assert_eq!(out, vec![255, 255]);
    }

    #[test]
    fn window_output_is_monotone() {
        let values: Vec<i16> = (-300..300).collect();
        let p = FrameParams {
            abs_min: -1024.0,
            abs_range: 8192.0,
            inter_bits: 13,
            ..params(
                VoiMode::Window(
                    Window {
                        center: 40.0,
                        width: 400.0,
                    },
                    VoiLutFunction::Linear,
                ),
                600,
            )
        };
        let out: Vec<u8> = render_frame(&values, &p);
        for pair in out.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(out[0], 0);
        assert_eq!(out[599], 255);
    }

    #[test]
    fn inverted_window_output_is_antitone() {
        let values: Vec<i16> = (-300..300).collect();
        let p = FrameParams {
            abs_min: -1024.0,
            abs_range: 8192.0,
            inter_bits: 13,
            low: 255,
            high: 0,
            ..params(
                VoiMode::Window(
                    Window {
                        center: 40.0,
                        width: 400.0,
                    },
                    VoiLutFunction::Linear,
                ),
                600,
            )
        };
        let out: Vec<u8> = render_frame(&values, &p);
        for pair in out.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert_eq!(out[0], 255);
        assert_eq!(out[599], 0);
    }

    #[test]
    fn single_step_window_avoids_division_by_zero() {
        // width 1: everything at or below center - 0.5 is low, the rest high
        let values = [99u8, 100, 101];
        let p = params(
            VoiMode::Window(
                Window {
                    center: 100.0,
                    width: 1.0,
                },
                VoiLutFunction::Linear,
            ),
            3,
        );
        let out: Vec<u8> = render_frame(&values, &p);
        assert_eq!(out, vec![0, 255, 255]);
    }

    #[test]
    fn sigmoid_at_the_center_is_half_the_output_range() {
        let values = [100u8];
        let p = params(
            VoiMode::Window(
                Window {
                    center: 100.0,
                    width: 50.0,
                },
                VoiLutFunction::Sigmoid,
            ),
            1,
        );
        let out: Vec<u8> = render_frame(&values, &p);
        // low + outrange / 2 = 0 + 255 / 2
        assert_eq!(out[0], 127);
    }

    #[test]
    fn sigmoid_saturates_towards_low_and_high() {
        let values = [0u8, 255];
        let p = params(
            VoiMode::Window(
                Window {
                    center: 128.0,
                    width: 20.0,
                },
                VoiLutFunction::Sigmoid,
            ),
            2,
        );
        let out: Vec<u8> = render_frame(&values, &p);
        assert!(out[0] <= 1);
        assert!(out[1] >= 254);
    }

    #[test]
    fn no_window_scales_the_absolute_range() {
        let values = [0u8, 128, 255];
        let p = params(VoiMode::None, 3);
        let out: Vec<u8> = render_frame(&values, &p);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 128);
        assert_eq!(out[2], 255);
    }

    #[test]
    fn short_frames_are_zero_padded() {
        let values = [200u8, 200];
        let p = params(VoiMode::None, 5);
        let out: Vec<u8> = render_frame(&values, &p);
        assert_eq!(out, vec![200, 200, 0, 0, 0]);
    }

    #[test]
    fn voi_lut_clamps_to_boundary_entries() {
        let vlut = LookupTable::new(vec![10, 20, 30], 0, 8);
        let values = [5i16, -3, 1];
        let p = FrameParams {
            abs_min: -128.0,
            ..params(VoiMode::Lut(&vlut), 3)
        };
        let out: Vec<u8> = render_frame(&values, &p);
        // outrange 256 over a 256-value LUT domain: gradient 1
        assert_eq!(out, vec![30, 10, 20]);
    }

    #[test]
    fn constant_voi_lut_fills_the_frame_with_one_value() {
        let vlut = LookupTable::new(vec![128, 128, 128], 0, 8);
        let values = [0u8, 10, 250];
        let p = params(VoiMode::Lut(&vlut), 4);
        let out: Vec<u8> = render_frame(&values, &p);
        assert_eq!(out, vec![128, 128, 128, 0]);
    }

    #[test]
    fn optimization_lut_matches_per_pixel_window() {
        // enough samples over an 8-bit domain to trigger the table path
        let values: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let window = Window {
            center: 100.0,
            width: 120.0,
        };
        let p = params(VoiMode::Window(window, VoiLutFunction::Linear), values.len());
        let out: Vec<u8> = render_frame(&values, &p);
        // reference: the formula applied pixel by pixel
        let width_1 = 119.0;
        let left = 100.0 - 0.5 - width_1 / 2.0;
        let right = 100.0 - 0.5 + width_1 / 2.0;
        let offset = 255.0 - ((100.0 - 0.5) / width_1 + 0.5) * 255.0;
        for (i, &value) in values.iter().enumerate() {
            let v = value as f64;
            let expected = if v <= left {
                0.0
            } else if v > right {
                255.0
            } else {
                offset + v * (255.0 / width_1)
            };
            assert_eq!(out[i], expected as u8, "pixel {}", i);
        }
    }

    #[test]
    fn optimization_lut_matches_per_pixel_voi_lut() {
        let vlut = LookupTable::new((0..=255u16).map(|v| 255 - v).collect(), 0, 8);
        let values: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
        let p = params(VoiMode::Lut(&vlut), values.len());
        let out: Vec<u8> = render_frame(&values, &p);
        for (i, &value) in values.iter().enumerate() {
            // outrange 256 over a 256-value LUT domain: gradient 1
            let expected = vlut.lookup(value as i64) as f64;
            assert_eq!(out[i], expected as u8, "pixel {}", i);
        }
    }

    #[test]
    fn optimization_lut_matches_per_pixel_scaling() {
        let values: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let p = params(VoiMode::None, values.len());
        let out: Vec<u8> = render_frame(&values, &p);
        for (i, &value) in values.iter().enumerate() {
            let expected = value as f64 * 256.0 / 256.0;
            assert_eq!(out[i], expected as u8);
        }
    }

    #[test]
    fn presentation_lut_remaps_the_window_output() {
        // a 4-entry presentation LUT with 8-bit entries
        let plut = LookupTable::new(vec![0, 20, 40, 60], 0, 8);
        let values = [0u8, 255];
        let p = FrameParams {
            plut: Some(&plut),
            ..params(VoiMode::None, 2)
        };
        let out: Vec<u8> = render_frame(&values, &p);
        // darkest pixel hits entry 0, brightest entry 3, scaled to 0..=255
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 60);
    }

    #[test]
    fn display_function_is_composed_last() {
        let disp = DisplayFunction::with_luminance_range(DisplayModel::Gsdf, 0.5, 300.0, 256);
        let values: Vec<u8> = (0..=255u16).map(|v| v as u8).collect();
        let p = FrameParams {
            display: Some(&disp),
            ..params(VoiMode::None, 256)
        };
        let out: Vec<u8> = render_frame(&values, &p);
        // calibrated output stays monotone over a monotone input ramp
        for pair in out.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn invalid_display_function_falls_back_to_linear_scaling() {
        let disp = DisplayFunction::new(DisplayModel::Gsdf, &[], &[], 0);
        let values = [0u8, 255];
        let p = FrameParams {
            display: Some(&disp),
            ..params(VoiMode::None, 2)
        };
        let out: Vec<u8> = render_frame(&values, &p);
        assert_eq!(out, vec![0, 255]);
    }
}
