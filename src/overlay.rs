//! Overlay planes and their compositing into rendered output.
//!
//! An overlay plane is a 1-bit bitmap (stand-alone packed bits, or a
//! single bit position embedded in 16-bit pixel words) burned into the
//! rendered frame after all value transforms. Planes come in two groups:
//! the planes stored in the data set, and additional planes attached by
//! the caller. Groups are applied in order, planes in order within their
//! group, so later planes overwrite earlier ones.
//!
//! Plane bitmaps are shared (`Arc`) between derived images; geometry
//! adjustments (origin moves) are plain per-plane fields and never touch
//! the shared bitmap.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::display::DisplayFunction;
use crate::pixel::{maxval, Sample, WIDTH_OF_PVALUES};
use crate::{Error, InvalidOverlayGroupSnafu};
use snafu::ensure;

/// Lowest valid overlay group number.
pub const FIRST_OVERLAY_GROUP: u16 = 0x6000;
/// Highest valid overlay group number.
pub const LAST_OVERLAY_GROUP: u16 = 0x60FF;

/// How a plane's set bits modify the rendered pixels underneath.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OverlayMode {
    /// Use the mode stored with the plane.
    Default,
    /// Write the foreground value.
    Replace,
    /// Write the foreground value where the pixel is at most the
    /// threshold, otherwise write 1.
    ThresholdReplace,
    /// Pixels at most half the output range become the maximum,
    /// the rest become 0.
    Complement,
    /// Write the foreground value where the bit is clear.
    InvertBitmap,
    /// Dim the area outside the plane by halving its bit depth.
    RegionOfInterest,
    /// Write a value derived from the plane's P-value,
    /// through the display function when present.
    BitmapShutter,
}

/// A single overlay plane.
#[derive(Debug, Clone)]
pub struct OverlayPlane {
    group: u16,
    origin_left: i32,
    origin_top: i32,
    columns: u16,
    rows: u16,
    bits_allocated: u16,
    bit_position: u16,
    frame_origin: u32,
    frames: u32,
    mode: OverlayMode,
    default_mode: OverlayMode,
    foreground: f64,
    threshold: f64,
    p_value: u16,
    visible: bool,
    embedded: bool,
    label: Option<String>,
    description: Option<String>,
    data: Arc<[u8]>,
}

impl OverlayPlane {
    /// Create a plane over a stand-alone packed bitmap (1 bit per pixel,
    /// least significant bit first).
    ///
    /// Fails when the group number is odd or outside the overlay group
    /// range (0x6000–0x60FF).
    pub fn new(
        group: u16,
        left: i32,
        top: i32,
        columns: u16,
        rows: u16,
        data: impl Into<Arc<[u8]>>,
        mode: OverlayMode,
    ) -> Result<Self, Error> {
        ensure!(
            (FIRST_OVERLAY_GROUP..=LAST_OVERLAY_GROUP).contains(&group) && group % 2 == 0,
            InvalidOverlayGroupSnafu { group }
        );
        let mode = if mode == OverlayMode::Default {
            OverlayMode::Replace
        } else {
            mode
        };
        Ok(OverlayPlane {
            group,
            origin_left: left,
            origin_top: top,
            columns,
            rows,
            bits_allocated: 1,
            bit_position: 0,
            frame_origin: 0,
            frames: 1,
            mode,
            default_mode: mode,
            foreground: 1.0,
            threshold: 1.0,
            p_value: 0,
            visible: mode == OverlayMode::BitmapShutter,
            embedded: false,
            label: None,
            description: None,
            data: data.into(),
        })
    }

    /// Create a plane embedded in 16-bit pixel words (little endian),
    /// selecting a single bit position of each word.
    #[allow(clippy::too_many_arguments)]
    pub fn embedded(
        group: u16,
        left: i32,
        top: i32,
        columns: u16,
        rows: u16,
        bit_position: u16,
        data: impl Into<Arc<[u8]>>,
        mode: OverlayMode,
    ) -> Result<Self, Error> {
        let mut plane = Self::new(group, left, top, columns, rows, data, mode)?;
        plane.bits_allocated = 16;
        plane.bit_position = bit_position % 16;
        plane.embedded = true;
        Ok(plane)
    }

    /// Restrict the plane to a range of image frames.
    pub fn with_frames(mut self, frame_origin: u32, frames: u32) -> Self {
        self.frame_origin = frame_origin;
        self.frames = frames.max(1);
        self
    }

    /// Attach a label string.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach a description string.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The overlay group number.
    pub fn group(&self) -> u16 {
        self.group
    }

    /// The label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The active overlay mode.
    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    /// Whether the plane is currently visible.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether the plane bits live inside the image pixel words.
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    /// The plane origin (left, top) relative to the image.
    pub fn origin(&self) -> (i32, i32) {
        (self.origin_left, self.origin_top)
    }

    /// The plane extent (columns, rows).
    pub fn extent(&self) -> (u16, u16) {
        (self.columns, self.rows)
    }

    /// Make the plane visible with the given rendering parameters.
    ///
    /// Foreground and threshold are fractions of the output range and
    /// are clamped to 0..=1; [`OverlayMode::Default`] selects the mode
    /// the plane was created with.
    pub fn show(&mut self, foreground: f64, threshold: f64, mode: OverlayMode) {
        self.foreground = foreground.clamp(0.0, 1.0);
        self.threshold = threshold.clamp(0.0, 1.0);
        self.mode = if mode == OverlayMode::Default {
            self.default_mode
        } else {
            mode
        };
        self.visible = true;
    }

    /// Make a bitmap shutter plane visible with the given P-value.
    ///
    /// Returns false (and changes nothing) for other overlay modes.
    pub fn show_with_p_value(&mut self, p_value: u16) -> bool {
        if self.mode == OverlayMode::BitmapShutter {
            self.p_value = p_value;
            self.visible = true;
            true
        } else {
            false
        }
    }

    /// Hide the plane.
    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// Move the plane origin.
    pub fn place(&mut self, left: i32, top: i32) {
        self.origin_left = left;
        self.origin_top = top;
    }

    fn bit(&self, frame_base: u64, pixel: u64) -> bool {
        let index = frame_base + pixel;
        let bit = if self.bits_allocated == 16 {
            index * 16 + self.bit_position as u64
        } else {
            index
        };
        let byte = (bit / 8) as usize;
        match self.data.get(byte) {
            Some(b) => (b >> (bit % 8)) & 1 != 0,
            None => false,
        }
    }
}

/// A bit cursor over one frame of a plane bitmap,
/// reset to a plane position at the start of every output row.
pub(crate) struct PlaneCursor<'a> {
    plane: &'a OverlayPlane,
    frame_base: u64,
    position: u64,
}

impl<'a> PlaneCursor<'a> {
    /// Start a cursor over the plane data of the given image frame.
    /// Returns `None` when the plane does not apply to the frame.
    pub(crate) fn start(plane: &'a OverlayPlane, frame: u32) -> Option<Self> {
        if frame < plane.frame_origin || frame - plane.frame_origin >= plane.frames {
            return None;
        }
        let per_frame = plane.rows as u64 * plane.columns as u64;
        Some(PlaneCursor {
            plane,
            frame_base: (frame - plane.frame_origin) as u64 * per_frame,
            position: 0,
        })
    }

    /// Position the cursor at plane-relative coordinates.
    pub(crate) fn set_start(&mut self, x: u16, y: u16) {
        self.position = y as u64 * self.plane.columns as u64 + x as u64;
    }

    /// Read the bit under the cursor and advance by one pixel.
    pub(crate) fn next_bit(&mut self) -> bool {
        let bit = self.plane.bit(self.frame_base, self.position);
        self.position += 1;
        bit
    }
}

/// An ordered set of overlay planes with a common origin offset.
#[derive(Debug, Clone, Default)]
pub struct OverlayGroup {
    planes: Vec<OverlayPlane>,
    left: i32,
    top: i32,
}

impl OverlayGroup {
    /// An empty overlay group.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of planes.
    pub fn count(&self) -> usize {
        self.planes.len()
    }

    /// The common origin offset added to every plane origin.
    pub fn origin(&self) -> (i32, i32) {
        (self.left, self.top)
    }

    /// Set the common origin offset.
    pub fn set_origin(&mut self, left: i32, top: i32) {
        self.left = left;
        self.top = top;
    }

    /// Add a plane. An existing plane with the same group number is
    /// replaced. Returns the plane index.
    pub fn add_plane(&mut self, plane: OverlayPlane) -> usize {
        if let Some(index) = self.planes.iter().position(|p| p.group == plane.group) {
            self.planes[index] = plane;
            index
        } else {
            self.planes.push(plane);
            self.planes.len() - 1
        }
    }

    /// Remove the plane with the given group number.
    pub fn remove_plane(&mut self, group: u16) -> bool {
        match self.planes.iter().position(|p| p.group == group) {
            Some(index) => {
                self.planes.remove(index);
                true
            }
            None => false,
        }
    }

    /// The plane at the given index.
    pub fn plane(&self, index: usize) -> Option<&OverlayPlane> {
        self.planes.get(index)
    }

    /// Resolve a plane selector: either a plane index (below the plane
    /// count) or a group number (0x6000–0x60FF).
    fn resolve(&self, selector: u16) -> Option<usize> {
        if (selector as usize) < self.planes.len() {
            Some(selector as usize)
        } else {
            self.planes.iter().position(|p| p.group == selector)
        }
    }

    /// Whether the selected plane is visible.
    pub fn is_plane_visible(&self, selector: u16) -> bool {
        self.resolve(selector)
            .map(|i| self.planes[i].visible)
            .unwrap_or(false)
    }

    /// Make the selected plane visible with its stored parameters.
    pub fn show_plane(&mut self, selector: u16) -> bool {
        match self.resolve(selector) {
            Some(i) => {
                self.planes[i].visible = true;
                true
            }
            None => false,
        }
    }

    /// Make the selected plane visible with the given parameters.
    pub fn show_plane_with(
        &mut self,
        selector: u16,
        foreground: f64,
        threshold: f64,
        mode: OverlayMode,
    ) -> bool {
        match self.resolve(selector) {
            Some(i) => {
                self.planes[i].show(foreground, threshold, mode);
                true
            }
            None => false,
        }
    }

    /// Make the selected bitmap shutter plane visible with a P-value.
    pub fn show_plane_with_p_value(&mut self, selector: u16, p_value: u16) -> bool {
        match self.resolve(selector) {
            Some(i) => self.planes[i].show_with_p_value(p_value),
            None => false,
        }
    }

    /// Hide the selected plane.
    pub fn hide_plane(&mut self, selector: u16) -> bool {
        match self.resolve(selector) {
            Some(i) => {
                self.planes[i].hide();
                true
            }
            None => false,
        }
    }

    /// Make all planes visible.
    pub fn show_all_planes(&mut self) {
        for plane in &mut self.planes {
            plane.visible = true;
        }
    }

    /// Hide all planes.
    pub fn hide_all_planes(&mut self) {
        for plane in &mut self.planes {
            plane.visible = false;
        }
    }

    /// Move the selected plane to a new origin.
    pub fn place_plane(&mut self, selector: u16, left: i32, top: i32) -> bool {
        match self.resolve(selector) {
            Some(i) => {
                self.planes[i].place(left, top);
                true
            }
            None => false,
        }
    }
}

/// Burn all visible planes of both groups into one rendered frame.
pub(crate) fn apply_overlays<O: Sample>(
    data: &mut [O],
    columns: u16,
    rows: u16,
    frame: u32,
    groups: &[OverlayGroup; 2],
    display: Option<&DisplayFunction>,
) {
    for (which, group) in groups.iter().enumerate() {
        if group.count() > 0 {
            debug!(
                "applying {} overlay planes",
                if which == 0 { "built-in" } else { "additional" }
            );
        }
        for plane in &group.planes {
            if !plane.visible {
                continue;
            }
            let cursor = match PlaneCursor::start(plane, frame) {
                Some(cursor) => cursor,
                None => continue,
            };
            apply_plane(data, columns, rows, plane, cursor, group.left, group.top, display);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_plane<O: Sample>(
    data: &mut [O],
    columns: u16,
    rows: u16,
    plane: &OverlayPlane,
    mut cursor: PlaneCursor<'_>,
    group_left: i32,
    group_top: i32,
    display: Option<&DisplayFunction>,
) {
    // visible intersection of the plane with the image
    let left = group_left as i64 + plane.origin_left as i64;
    let top = group_top as i64 + plane.origin_top as i64;
    let xmin = left.max(0) as u16;
    let ymin = top.max(0) as u16;
    let xmax = ((left + plane.columns as i64).min(columns as i64)).max(0) as u16;
    let ymax = ((top + plane.rows as i64).min(rows as i64)).max(0) as u16;
    if xmin >= xmax || ymin >= ymax {
        return;
    }
    let max_value = maxval(O::BITS) as f64;

    // walk the intersection row by row, resetting the plane cursor at
    // the start of every output row
    let mut covered = |op: &mut dyn FnMut(bool, &mut O)| {
        for y in ymin..ymax {
            cursor.set_start((xmin as i64 - left) as u16, (y as i64 - top) as u16);
            let offset = y as usize * columns as usize + xmin as usize;
            for q in &mut data[offset..offset + (xmax - xmin) as usize] {
                op(cursor.next_bit(), q);
            }
        }
    };

    match plane.mode {
        OverlayMode::Replace => {
            debug!("applying overlay plane 0x{:04x} with 'replace' mode", plane.group);
            let fore = O::from_f64(plane.foreground * max_value);
            covered(&mut |bit, q| {
                if bit {
                    *q = fore;
                }
            });
        }
        OverlayMode::ThresholdReplace => {
            debug!(
                "applying overlay plane 0x{:04x} with 'threshold replace' mode",
                plane.group
            );
            let fore = O::from_f64(plane.foreground * max_value);
            let thresh = O::from_f64(plane.threshold * max_value);
            let one = O::from_f64(1.0);
            covered(&mut |bit, q| {
                if bit {
                    *q = if *q <= thresh { fore } else { one };
                }
            });
        }
        OverlayMode::Complement => {
            debug!(
                "applying overlay plane 0x{:04x} with 'complement' mode",
                plane.group
            );
            // half the output range, e.g. 128 for 8-bit output
            let thresh = O::from_f64((max_value + 1.0) / 2.0);
            let max = O::from_f64(max_value);
            covered(&mut |bit, q| {
                if bit {
                    *q = if *q <= thresh { max } else { O::ZERO };
                }
            });
        }
        OverlayMode::InvertBitmap => {
            debug!(
                "applying overlay plane 0x{:04x} with 'invert bitmap' mode",
                plane.group
            );
            let fore = O::from_f64(plane.foreground * max_value);
            covered(&mut |bit, q| {
                if !bit {
                    *q = fore;
                }
            });
        }
        OverlayMode::RegionOfInterest => {
            debug!(
                "applying overlay plane 0x{:04x} with 'region of interest' mode",
                plane.group
            );
            let dim = (1u64 << (O::BITS / 2)) as f64;
            covered(&mut |bit, q| {
                if !bit {
                    *q = O::from_f64((q.to_f64().unwrap_or(0.0) / dim).floor());
                }
            });
        }
        OverlayMode::BitmapShutter => {
            debug!(
                "applying overlay plane 0x{:04x} with 'bitmap shutter' mode",
                plane.group
            );
            let mut fore = O::from_f64(
                max_value * plane.p_value as f64 / maxval(WIDTH_OF_PVALUES) as f64,
            );
            if let Some(disp) = display.filter(|d| d.is_valid()) {
                if let Some(dlut) = disp.lookup_table(WIDTH_OF_PVALUES) {
                    fore = O::from_f64(dlut.value(plane.p_value as usize) as f64);
                }
            }
            covered(&mut |bit, q| {
                if bit {
                    *q = fore;
                }
            });
        }
        OverlayMode::Default => {
            warn!("unhandled overlay mode for plane 0x{:04x}", plane.group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_plane(columns: u16, rows: u16, mode: OverlayMode) -> OverlayPlane {
        let bytes = ((columns as usize * rows as usize) + 7) / 8;
        let mut plane =
            OverlayPlane::new(0x6000, 0, 0, columns, rows, vec![0xFFu8; bytes], mode).unwrap();
        plane.show(1.0, 1.0, OverlayMode::Default);
        plane
    }

    fn groups_with(plane: OverlayPlane) -> [OverlayGroup; 2] {
        let mut group = OverlayGroup::new();
        group.add_plane(plane);
        [group, OverlayGroup::new()]
    }

    #[test]
    fn group_number_must_be_even_and_in_range() {
        assert!(OverlayPlane::new(0x6001, 0, 0, 1, 1, vec![0u8], OverlayMode::Replace).is_err());
        assert!(OverlayPlane::new(0x5000, 0, 0, 1, 1, vec![0u8], OverlayMode::Replace).is_err());
        assert!(OverlayPlane::new(0x6100, 0, 0, 1, 1, vec![0u8], OverlayMode::Replace).is_err());
        assert!(OverlayPlane::new(0x60FE, 0, 0, 1, 1, vec![0u8], OverlayMode::Replace).is_ok());
    }

    #[test]
    fn packed_bits_are_read_lsb_first() {
        let plane =
            OverlayPlane::new(0x6000, 0, 0, 8, 1, vec![0b0000_0101u8], OverlayMode::Replace)
                .unwrap();
        let mut cursor = PlaneCursor::start(&plane, 0).unwrap();
        cursor.set_start(0, 0);
        let bits: Vec<bool> = (0..8).map(|_| cursor.next_bit()).collect();
        assert_eq!(
            bits,
            vec![true, false, true, false, false, false, false, false]
        );
    }

    #[test]
    fn embedded_bits_use_the_bit_position() {
        // two 16-bit words: bit 1 set in the first, clear in the second
        let plane = OverlayPlane::embedded(
            0x6000,
            0,
            0,
            2,
            1,
            1,
            vec![0x02u8, 0x00, 0x00, 0x00],
            OverlayMode::Replace,
        )
        .unwrap();
        let mut cursor = PlaneCursor::start(&plane, 0).unwrap();
        cursor.set_start(0, 0);
        assert!(cursor.next_bit());
        assert!(!cursor.next_bit());
    }

    #[test]
    fn replace_writes_the_foreground_value() {
        let mut plane = full_plane(2, 1, OverlayMode::Replace);
        plane.show(0.5, 1.0, OverlayMode::Default);
        let mut data = vec![10u8, 20];
        apply_overlays(&mut data, 2, 1, 0, &groups_with(plane), None);
        // foreground 0.5 of the 8-bit range
        assert_eq!(data, vec![127, 127]);
    }

    #[test]
    fn complement_flips_around_half_range() {
        let plane = full_plane(2, 1, OverlayMode::Complement);
        let mut data = vec![200u8, 50];
        apply_overlays(&mut data, 2, 1, 0, &groups_with(plane), None);
        // above half range becomes 0, at or below becomes the maximum
        assert_eq!(data, vec![0, 255]);
    }

    #[test]
    fn threshold_replace_writes_one_above_the_threshold() {
        let mut plane = full_plane(2, 1, OverlayMode::ThresholdReplace);
        plane.show(1.0, 0.5, OverlayMode::Default);
        let mut data = vec![100u8, 200];
        apply_overlays(&mut data, 2, 1, 0, &groups_with(plane), None);
        assert_eq!(data, vec![255, 1]);
    }

    #[test]
    fn invert_bitmap_writes_where_bits_are_clear() {
        let mut plane =
            OverlayPlane::new(0x6000, 0, 0, 2, 1, vec![0b01u8], OverlayMode::InvertBitmap).unwrap();
        plane.show(1.0, 1.0, OverlayMode::Default);
        let mut data = vec![10u8, 20];
        apply_overlays(&mut data, 2, 1, 0, &groups_with(plane), None);
        assert_eq!(data, vec![10, 255]);
    }

    #[test]
    fn region_of_interest_dims_the_outside() {
        // bit set for the first pixel only: the second is outside the ROI
        let mut plane =
            OverlayPlane::new(0x6000, 0, 0, 2, 1, vec![0b01u8], OverlayMode::RegionOfInterest)
                .unwrap();
        plane.show(1.0, 1.0, OverlayMode::Default);
        let mut data = vec![200u8, 200];
        apply_overlays(&mut data, 2, 1, 0, &groups_with(plane), None);
        // outside pixels are shifted right by half the output bit width
        assert_eq!(data, vec![200, 200 >> 4]);
    }

    #[test]
    fn bitmap_shutter_uses_the_p_value() {
        let mut plane = full_plane(1, 1, OverlayMode::BitmapShutter);
        assert!(plane.show_with_p_value(0x8000));
        let mut data = vec![0u8];
        apply_overlays(&mut data, 1, 1, 0, &groups_with(plane), None);
        // linear P-value scaling without a display function
        assert_eq!(data, vec![(255.0 * 0x8000 as f64 / 65535.0) as u8]);
    }

    #[test]
    fn plane_outside_the_image_is_skipped() {
        let plane = {
            let mut p = full_plane(4, 4, OverlayMode::Replace);
            p.place(10, 10);
            p
        };
        let mut data = vec![7u8; 4];
        apply_overlays(&mut data, 2, 2, 0, &groups_with(plane), None);
        assert_eq!(data, vec![7; 4]);
    }

    #[test]
    fn intersection_is_clipped_to_the_image() {
        // 2x2 plane at (-1, -1) over a 2x2 image: only the image pixel
        // (0, 0) intersects, covered by the plane's bottom-right bit
        let mut plane =
            OverlayPlane::new(0x6000, -1, -1, 2, 2, vec![0b1000u8], OverlayMode::Replace).unwrap();
        plane.show(1.0, 1.0, OverlayMode::Default);
        let mut data = vec![0u8; 4];
        apply_overlays(&mut data, 2, 2, 0, &groups_with(plane), None);
        assert_eq!(data, vec![255, 0, 0, 0]);
    }

    #[test]
    fn hidden_planes_and_foreign_frames_are_skipped() {
        let mut plane = full_plane(2, 1, OverlayMode::Replace);
        plane.hide();
        let mut data = vec![1u8, 2];
        apply_overlays(&mut data, 2, 1, 0, &groups_with(plane), None);
        assert_eq!(data, vec![1, 2]);

        let plane = full_plane(2, 1, OverlayMode::Replace).with_frames(2, 1);
        let mut data = vec![1u8, 2];
        apply_overlays(&mut data, 2, 1, 0, &groups_with(plane.clone()), None);
        assert_eq!(data, vec![1, 2]);
        let mut data = vec![1u8, 2];
        apply_overlays(&mut data, 2, 1, 2, &groups_with(plane), None);
        assert_eq!(data, vec![255, 255]);
    }

    #[test]
    fn later_planes_overwrite_earlier_ones() {
        let mut first = full_plane(1, 1, OverlayMode::Replace);
        first.show(1.0, 1.0, OverlayMode::Default);
        let mut second = OverlayPlane::new(0x6002, 0, 0, 1, 1, vec![1u8], OverlayMode::Replace)
            .unwrap();
        second.show(0.0, 1.0, OverlayMode::Default);
        let mut group = OverlayGroup::new();
        group.add_plane(first);
        group.add_plane(second);
        let mut data = vec![7u8];
        apply_overlays(&mut data, 1, 1, 0, &[group, OverlayGroup::new()], None);
        assert_eq!(data, vec![0]);
    }

    #[test]
    fn adding_a_plane_with_the_same_group_replaces_it() {
        let mut group = OverlayGroup::new();
        group.add_plane(full_plane(2, 2, OverlayMode::Replace));
        group.add_plane(full_plane(4, 4, OverlayMode::Replace));
        assert_eq!(group.count(), 1);
        assert_eq!(group.plane(0).unwrap().extent(), (4, 4));
        assert!(group.remove_plane(0x6000));
        assert_eq!(group.count(), 0);
    }

    #[test]
    fn plane_selector_accepts_index_or_group_number() {
        let mut group = OverlayGroup::new();
        group.add_plane(full_plane(1, 1, OverlayMode::Replace));
        assert!(group.hide_plane(0x6000));
        assert!(!group.is_plane_visible(0));
        assert!(group.show_plane(0));
        assert!(group.is_plane_visible(0x6000));
        assert!(!group.show_plane(0x6004));
    }
}
