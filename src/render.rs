//! The output pixel assembler.
//!
//! [`MonoImage`] owns one image worth of modality data plus the current
//! transform state (window or VOI LUT, presentation LUT, display
//! function, polarity, overlays) and renders device-ready frames from it.
//! Rendering is lazy: changing any parameter only invalidates the cached
//! output, the next access recomputes it.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::display::DisplayFunction;
use crate::lut::LookupTable;
use crate::modality::{ModalityData, ModalityTransform};
use crate::overlay::{apply_overlays, OverlayGroup, OverlayMode, OverlayPlane};
use crate::pixel::{
    maxval, with_output, with_samples, OutputBuffer, MAX_TABLE_ENTRY_COUNT, WIDTH_OF_PVALUES,
};
use crate::unpack::{PixelDescription, SampleData};
use crate::voi::{
    render_frame, FrameParams, PresentationLutShape, VoiLutFunction, VoiMode, Window,
};
use crate::{
    BufferTooSmallSnafu, Error, FrameOutOfRangeSnafu, NotSupportedSnafu, UnsupportedBitDepthSnafu,
};
use snafu::ensure;

/// Description of a monochrome image as read from its data set.
#[derive(Debug, Clone)]
pub struct ImageDescription {
    /// The image width in pixels.
    pub columns: u16,
    /// The image height in pixels.
    pub rows: u16,
    /// The number of frames.
    pub frames: u32,
    /// Whether the photometric interpretation is MONOCHROME1
    /// (lowest sample value is intended to be white).
    pub monochrome1: bool,
    /// How samples are packed in the raw pixel data.
    pub pixel: PixelDescription,
}

/// Output polarity.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Polarity {
    /// Output follows the photometric interpretation.
    Normal,
    /// Output polarity is reversed.
    Reverse,
}

/// Which bounds [`MonoImage::min_max_values`] reports.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MinMaxMode {
    /// The bounds observed in the modality data.
    Observed,
    /// The absolute bounds representable with the modality bit depth.
    Absolute,
}

/// A monochrome image with its grayscale rendering state.
#[derive(Debug)]
pub struct MonoImage {
    inter: Arc<ModalityData>,
    columns: u16,
    rows: u16,
    frames: u32,
    monochrome1: bool,
    window: Option<Window>,
    voi_function: VoiLutFunction,
    voi_lut: Option<Arc<LookupTable>>,
    voi_explanation: Option<String>,
    plut: Option<Arc<LookupTable>>,
    plut_shape: PresentationLutShape,
    display: Option<Arc<DisplayFunction>>,
    polarity: Polarity,
    overlays: [OverlayGroup; 2],
    pastel: bool,
    output: Option<RenderedFrame>,
    used_values: Option<Vec<bool>>,
}

#[derive(Debug)]
struct RenderedFrame {
    frame: u32,
    bits: u16,
    data: OutputBuffer,
}

impl MonoImage {
    /// Unpack raw pixel data and apply the modality transform.
    pub fn new(
        description: ImageDescription,
        data: &[u8],
        transform: ModalityTransform,
    ) -> Result<Self, Error> {
        let samples = SampleData::unpack(data, &description.pixel)?;
        let inter = ModalityData::new(samples, &transform);
        Ok(Self::from_modality(
            Arc::new(inter),
            description.columns,
            description.rows,
            description.frames,
            description.monochrome1,
        ))
    }

    /// Build an image over already transformed modality data,
    /// e.g. shared with a derived image.
    pub fn from_modality(
        inter: Arc<ModalityData>,
        columns: u16,
        rows: u16,
        frames: u32,
        monochrome1: bool,
    ) -> Self {
        MonoImage {
            inter,
            columns,
            rows,
            frames,
            monochrome1,
            window: None,
            voi_function: VoiLutFunction::default(),
            voi_lut: None,
            voi_explanation: None,
            plut: None,
            plut_shape: PresentationLutShape::default(),
            display: None,
            polarity: Polarity::Normal,
            overlays: [OverlayGroup::new(), OverlayGroup::new()],
            pastel: false,
            output: None,
            used_values: None,
        }
    }

    /// The image width in pixels.
    pub fn columns(&self) -> u16 {
        self.columns
    }

    /// The image height in pixels.
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// The number of frames.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// The shared modality data.
    pub fn modality_data(&self) -> &Arc<ModalityData> {
        &self.inter
    }

    /// Minimum and maximum modality values.
    pub fn min_max_values(&self, mode: MinMaxMode) -> (f64, f64) {
        match mode {
            MinMaxMode::Observed => (self.inter.min_value(), self.inter.max_value()),
            MinMaxMode::Absolute => (self.inter.abs_minimum(), self.inter.abs_maximum()),
        }
    }

    fn invalidate(&mut self) {
        self.output = None;
        self.used_values = None;
    }

    /// Set a VOI window. Any active VOI LUT is disabled.
    ///
    /// A width below 1 means "no window" (supplement 33) and clears the
    /// window; a negative or non-finite width does the same but is
    /// reported by returning false. Returns whether a window is active
    /// after the call.
    pub fn set_window(&mut self, center: f64, width: f64) -> bool {
        self.voi_lut = None;
        self.voi_explanation = None;
        self.invalidate();
        if !width.is_finite() || width < 0.0 {
            warn!("invalid window width ({}), treating as no window", width);
            self.window = None;
            false
        } else if width < 1.0 {
            self.window = None;
            false
        } else {
            self.window = Some(Window { center, width });
            true
        }
    }

    /// Set a VOI window together with an explanation text.
    pub fn set_window_with_explanation(
        &mut self,
        center: f64,
        width: f64,
        explanation: impl Into<String>,
    ) -> bool {
        let active = self.set_window(center, width);
        if active {
            self.voi_explanation = Some(explanation.into());
        }
        active
    }

    /// Set the window covering the observed modality value range.
    pub fn set_min_max_window(&mut self) -> bool {
        match self.inter.min_max_window() {
            Some((center, width)) => {
                self.set_window_with_explanation(center, width, "Min-Max Window")
            }
            None => false,
        }
    }

    /// Set a window from the value histogram, clipping the given
    /// fraction of pixels at both ends.
    pub fn set_histogram_window(&mut self, threshold: f64) -> bool {
        match self.inter.histogram_window(threshold) {
            Some((center, width)) => {
                self.set_window_with_explanation(center, width, "Histogram Window")
            }
            None => false,
        }
    }

    /// Set a window covering a rectangular region of interest of one
    /// frame.
    pub fn set_roi_window(
        &mut self,
        left: usize,
        top: usize,
        width: usize,
        height: usize,
        frame: u32,
    ) -> bool {
        match self.inter.roi_window(
            left,
            top,
            width,
            height,
            self.columns as usize,
            self.rows as usize,
            frame as usize,
        ) {
            Some((center, width)) => self.set_window_with_explanation(center, width, "ROI Window"),
            None => false,
        }
    }

    /// The active VOI window, if any.
    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Select the VOI LUT function used for windows.
    pub fn set_voi_lut_function(&mut self, function: VoiLutFunction) {
        if self.voi_function != function {
            self.voi_function = function;
            self.invalidate();
        }
    }

    /// The VOI LUT function used for windows.
    pub fn voi_lut_function(&self) -> VoiLutFunction {
        self.voi_function
    }

    /// Set a VOI LUT. Any active window is disabled.
    /// Returns whether the table is valid and now active.
    pub fn set_voi_lut(&mut self, lut: impl Into<Arc<LookupTable>>) -> bool {
        let lut = lut.into();
        self.window = None;
        self.invalidate();
        self.voi_explanation = lut.explanation().map(|e| e.to_string());
        let valid = lut.is_valid();
        self.voi_lut = Some(lut);
        valid
    }

    /// Disable any VOI transform.
    pub fn set_no_voi_transformation(&mut self) {
        self.window = None;
        self.voi_lut = None;
        self.voi_explanation = None;
        self.invalidate();
    }

    /// The explanation of the active VOI transform, if any.
    pub fn voi_explanation(&self) -> Option<&str> {
        self.voi_explanation.as_deref()
    }

    /// Set the presentation LUT shape. Any custom presentation LUT is
    /// discarded.
    pub fn set_presentation_lut_shape(&mut self, shape: PresentationLutShape) {
        self.plut = None;
        self.plut_shape = shape;
        self.invalidate();
    }

    /// The active presentation LUT shape.
    pub fn presentation_lut_shape(&self) -> PresentationLutShape {
        self.plut_shape
    }

    /// Set a custom presentation LUT.
    /// Returns whether the table is valid and now active.
    pub fn set_presentation_lut(&mut self, lut: impl Into<Arc<LookupTable>>) -> bool {
        let lut = lut.into();
        self.plut_shape = PresentationLutShape::Default;
        self.invalidate();
        let valid = lut.is_valid();
        self.plut = Some(lut);
        valid
    }

    /// Build and activate the inverse of the given presentation LUT,
    /// as used for print output (e.g. 8 to 12 bit remapping).
    pub fn set_inverse_presentation_lut(&mut self, lut: &LookupTable) -> bool {
        self.plut = None;
        self.plut_shape = PresentationLutShape::Default;
        self.invalidate();
        if !lut.is_valid() {
            return false;
        }
        let inverse = lut.create_inverse();
        let valid = inverse.is_valid();
        self.plut = Some(Arc::new(inverse));
        valid
    }

    /// The active custom presentation LUT, if any.
    pub fn presentation_lut(&self) -> Option<&Arc<LookupTable>> {
        self.plut.as_ref()
    }

    /// Attach a display calibration function.
    /// Returns whether the function is valid.
    pub fn set_display_function(&mut self, display: Arc<DisplayFunction>) -> bool {
        let valid = display.is_valid();
        self.display = Some(display);
        self.invalidate();
        valid
    }

    /// Detach the display calibration function.
    pub fn set_no_display_function(&mut self) -> bool {
        self.invalidate();
        self.display.take().is_some()
    }

    /// The attached display function, if any.
    pub fn display_function(&self) -> Option<&Arc<DisplayFunction>> {
        self.display.as_ref()
    }

    /// Set the output polarity.
    pub fn set_polarity(&mut self, polarity: Polarity) -> bool {
        if self.polarity != polarity {
            self.polarity = polarity;
            self.invalidate();
            true
        } else {
            false
        }
    }

    /// The current output polarity.
    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Enable or disable the experimental pastel color mode.
    ///
    /// The mode is not supported by this build; rendering with it
    /// enabled logs a warning and yields no output.
    pub fn set_pastel_mode(&mut self, pastel: bool) {
        self.pastel = pastel;
        self.invalidate();
    }

    /// Add a plane to the data set overlay group.
    pub fn add_dataset_overlay(&mut self, plane: OverlayPlane) -> usize {
        self.invalidate();
        self.overlays[0].add_plane(plane)
    }

    /// Add (or replace) a plane in the additional overlay group.
    pub fn add_overlay(&mut self, plane: OverlayPlane) -> usize {
        self.invalidate();
        self.overlays[1].add_plane(plane)
    }

    /// Remove a plane from the additional overlay group.
    pub fn remove_overlay(&mut self, group: u16) -> bool {
        self.invalidate();
        self.overlays[1].remove_plane(group)
    }

    /// Make an overlay plane visible with the given parameters.
    /// The selector is a plane index or a group number; the data set
    /// group is searched first.
    pub fn show_overlay(
        &mut self,
        selector: u16,
        foreground: f64,
        threshold: f64,
        mode: OverlayMode,
    ) -> bool {
        self.invalidate();
        self.overlays[0].show_plane_with(selector, foreground, threshold, mode)
            || self.overlays[1].show_plane_with(selector, foreground, threshold, mode)
    }

    /// Make a bitmap shutter plane visible with the given P-value.
    pub fn show_overlay_with_p_value(&mut self, selector: u16, p_value: u16) -> bool {
        self.invalidate();
        self.overlays[0].show_plane_with_p_value(selector, p_value)
            || self.overlays[1].show_plane_with_p_value(selector, p_value)
    }

    /// Hide an overlay plane.
    pub fn hide_overlay(&mut self, selector: u16) -> bool {
        self.invalidate();
        self.overlays[0].hide_plane(selector) || self.overlays[1].hide_plane(selector)
    }

    /// Hide all overlay planes of both groups.
    pub fn hide_all_overlays(&mut self) {
        self.invalidate();
        self.overlays[0].hide_all_planes();
        self.overlays[1].hide_all_planes();
    }

    /// Move an overlay plane to a new origin.
    pub fn place_overlay(&mut self, selector: u16, left: i32, top: i32) -> bool {
        self.invalidate();
        self.overlays[0].place_plane(selector, left, top)
            || self.overlays[1].place_plane(selector, left, top)
    }

    /// The overlay groups (data set planes, additional planes).
    pub fn overlay_groups(&self) -> &[OverlayGroup; 2] {
        &self.overlays
    }

    /// Render one frame with the requested output bit depth
    /// and return the cached output buffer.
    ///
    /// Returns `None` when the frame or bit depth is out of range or
    /// rendering is not possible; the reason is logged.
    pub fn get_output_data(&mut self, frame: u32, bits: u16) -> Option<&OutputBuffer> {
        let cached = matches!(
            &self.output,
            Some(rendered) if rendered.frame == frame && rendered.bits == bits
        );
        if !cached {
            match self.render(frame, bits) {
                Ok(data) => {
                    self.output = Some(RenderedFrame { frame, bits, data });
                    self.used_values = None;
                }
                Err(e) => {
                    warn!("cannot render frame {}: {}", frame, e);
                    return None;
                }
            }
        }
        self.output.as_ref().map(|rendered| &rendered.data)
    }

    /// Render one frame into a caller-owned buffer.
    ///
    /// The buffer variant must match the requested bit depth and hold at
    /// least one frame worth of values.
    pub fn render_frame_into(
        &self,
        frame: u32,
        bits: u16,
        buffer: &mut OutputBuffer,
    ) -> Result<(), Error> {
        let frame_size = self.frame_size();
        ensure!(
            buffer.len() >= frame_size,
            BufferTooSmallSnafu {
                got: buffer.len(),
                required: frame_size,
            }
        );
        let depth_matches = matches!(
            (&buffer, bits),
            (OutputBuffer::Bits8(_), 1..=8)
                | (OutputBuffer::Bits16(_), 9..=16)
                | (OutputBuffer::Bits32(_), 17..=32)
        );
        ensure!(depth_matches, UnsupportedBitDepthSnafu { bits });
        let rendered = self.render(frame, bits)?;
        match (buffer, rendered) {
            (OutputBuffer::Bits8(dst), OutputBuffer::Bits8(src)) => {
                dst[..frame_size].copy_from_slice(&src)
            }
            (OutputBuffer::Bits16(dst), OutputBuffer::Bits16(src)) => {
                dst[..frame_size].copy_from_slice(&src)
            }
            (OutputBuffer::Bits32(dst), OutputBuffer::Bits32(src)) => {
                dst[..frame_size].copy_from_slice(&src)
            }
            _ => unreachable!("buffer depth checked above"),
        }
        Ok(())
    }

    /// Drop the cached output buffer.
    pub fn delete_output_data(&mut self) {
        self.invalidate();
    }

    /// The most recently rendered output buffer, if still cached.
    pub fn output_data(&self) -> Option<&OutputBuffer> {
        self.output.as_ref().map(|rendered| &rendered.data)
    }

    /// Whether the given output code does not occur in the rendered
    /// frame. The presence table is computed on the first query and
    /// cached until the output changes.
    ///
    /// Returns `None` without a rendered frame or for output depths
    /// beyond 16 bits.
    pub fn is_value_unused(&mut self, value: u32) -> Option<bool> {
        if self.used_values.is_none() {
            let rendered = self.output.as_ref()?;
            let table_len = (maxval(rendered.bits) + 1) as usize;
            if table_len > MAX_TABLE_ENTRY_COUNT {
                return None;
            }
            debug!("scanning rendered frame for used output values");
            let mut used = vec![false; table_len];
            with_output!(&rendered.data, |values| {
                for v in values.iter() {
                    let index = *v as usize;
                    if let Some(slot) = used.get_mut(index) {
                        *slot = true;
                    }
                }
            });
            self.used_values = Some(used);
        }
        self.used_values
            .as_ref()
            .map(|used| !used.get(value as usize).copied().unwrap_or(false))
    }

    /// Convert a P-value to a device driving level of the given bit
    /// depth: through the display function when one is attached and
    /// matches the depth, otherwise by linear scaling.
    pub fn convert_p_value_to_ddl(&self, p_value: u16, bits: u16) -> Option<u16> {
        let max_value = maxval(bits);
        if let Some(disp) = self.display.as_deref().filter(|d| d.is_valid()) {
            if disp.max_ddl_value() as u64 == max_value {
                if let Some(dlut) = disp.lookup_table(WIDTH_OF_PVALUES) {
                    return Some(dlut.value(p_value as usize));
                }
            }
        }
        if (1..=WIDTH_OF_PVALUES).contains(&bits) {
            Some((max_value as f64 * p_value as f64 / maxval(WIDTH_OF_PVALUES) as f64) as u16)
        } else {
            None
        }
    }

    fn frame_size(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    fn render(&self, frame: u32, bits: u16) -> Result<OutputBuffer, Error> {
        ensure!(
            frame < self.frames,
            FrameOutOfRangeSnafu {
                frame,
                frames: self.frames,
            }
        );
        ensure!((1..=32).contains(&bits), UnsupportedBitDepthSnafu { bits });
        if self.pastel {
            warn!("pastel color output not supported");
            return NotSupportedSnafu {
                feature: "pastel color output",
            }
            .fail();
        }

        // output polarity: shape, photometric interpretation, polarity
        let plut = self.plut.as_deref().filter(|plut| plut.is_valid());
        let inverse = plut.is_none()
            && (self.plut_shape == PresentationLutShape::Inverse
                || (self.monochrome1 && self.plut_shape == PresentationLutShape::Default));
        let (mut low, mut high) = if inverse {
            (maxval(bits) as u32, 0)
        } else {
            (0, maxval(bits) as u32)
        };
        if self.polarity == Polarity::Reverse {
            std::mem::swap(&mut low, &mut high);
        }

        let display = self.display.as_deref().filter(|disp| {
            if disp.is_valid() && disp.max_ddl_value() as u64 != maxval(bits) {
                warn!(
                    "selected display function does not fit the requested output depth ({}), \
                     ignoring display transformation",
                    bits
                );
                false
            } else {
                true
            }
        });

        let voi = match (&self.voi_lut, self.window) {
            (Some(vlut), _) if vlut.is_valid() => VoiMode::Lut(vlut),
            (_, Some(window)) => VoiMode::Window(window, self.voi_function),
            _ => VoiMode::None,
        };
        let frame_size = self.frame_size();
        let params = FrameParams {
            start: frame as usize * frame_size,
            frame_size,
            abs_min: self.inter.abs_minimum(),
            abs_range: self.inter.abs_max_range(),
            inter_bits: self.inter.bits(),
            voi,
            plut,
            display,
            low,
            high,
        };
        let mut out = with_samples!(self.inter.values(), |values| {
            if bits <= 8 {
                OutputBuffer::Bits8(render_frame(values, &params))
            } else if bits <= 16 {
                OutputBuffer::Bits16(render_frame(values, &params))
            } else {
                OutputBuffer::Bits32(render_frame(values, &params))
            }
        });
        with_output!(&mut out, |data| {
            apply_overlays(data, self.columns, self.rows, frame, &self.overlays, display)
        });
        Ok(out)
    }
}
