//! Display calibration functions.
//!
//! A [`DisplayFunction`] describes the characteristic curve of an output
//! device as measured (device driving level, luminance) pairs, and builds
//! dense DDL lookup tables that linearize the device for human perception:
//! either along the DICOM Grayscale Standard Display Function (the Barten
//! model) or along CIELAB lightness.
//!
//! Built tables are cached per input bit width (2 to 16 bits) and are
//! invalidated as a whole when the ambient light term changes, since
//! ambient light is additive inside the luminance table. The cache is
//! rebuilt in place; concurrent readers must serialize access externally.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::pixel::maxval;
use crate::spline;
use crate::{Error, InvalidCalibrationFileSnafu, ReadCalibrationFileSnafu};
use snafu::ResultExt;

/// Smallest supported input bit width of a display LUT.
pub const MIN_DISPLAY_BITS: u16 = 2;
/// Largest supported input bit width of a display LUT.
pub const MAX_DISPLAY_BITS: u16 = 16;

const CACHE_SLOTS: usize = (MAX_DISPLAY_BITS - MIN_DISPLAY_BITS + 1) as usize;

/// Number of samples of the GSDF curve (JND indices 1 to 1023).
const GSDF_COUNT: usize = 1023;

/// The perceptual model a display function calibrates against.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DisplayModel {
    /// The DICOM Grayscale Standard Display Function (Barten model).
    Gsdf,
    /// CIELAB lightness, e.g. for print media.
    Cielab,
}

/// A dense mapping from perceptual index to device driving level.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayLut {
    data: Vec<u16>,
    ambient: f64,
}

impl DisplayLut {
    /// The number of entries.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// The DDL for the given input index, clamped to the table length.
    #[inline]
    pub fn value(&self, index: usize) -> u16 {
        self.data[index.min(self.data.len() - 1)]
    }

    /// The ambient light value the table was built with.
    pub fn ambient_light(&self) -> f64 {
        self.ambient
    }
}

/// A display characteristic curve plus the calibration model applied to it.
#[derive(Debug)]
pub struct DisplayFunction {
    model: DisplayModel,
    valid: bool,
    ddl: Vec<u16>,
    lum: Vec<f64>,
    max_ddl: u16,
    ambient: f64,
    min_lum: f64,
    max_lum: f64,
    /// luminance per JND index 1..=1023 (GSDF model only)
    gsdf: Vec<f64>,
    gsdf_index: Vec<f64>,
    gsdf_spline: Vec<f64>,
    cache: Mutex<[Option<Arc<DisplayLut>>; CACHE_SLOTS]>,
}

impl DisplayFunction {
    /// Create a display function from measured (DDL, luminance) pairs.
    ///
    /// The pairs may be sparse and unsorted; they are ordered by DDL,
    /// entries beyond `max_ddl` are dropped with a warning, and sparse
    /// tables are interpolated with a cubic spline onto the full DDL
    /// range. An empty table or a zero `max_ddl` yields an invalid
    /// function; check [`is_valid`](DisplayFunction::is_valid) before use.
    pub fn new(model: DisplayModel, ddl: &[u16], lum: &[f64], max_ddl: u16) -> Self {
        let mut f = DisplayFunction {
            model,
            valid: false,
            ddl: Vec::new(),
            lum: Vec::new(),
            max_ddl,
            ambient: 0.0,
            min_lum: 0.0,
            max_lum: 0.0,
            gsdf: Vec::new(),
            gsdf_index: Vec::new(),
            gsdf_spline: Vec::new(),
            cache: Mutex::new(std::array::from_fn(|_| None)),
        };
        if max_ddl == 0 || ddl.is_empty() || ddl.len() != lum.len() {
            warn!("invalid display characteristic data, display function unusable");
            return f;
        }
        f.create_sorted_table(ddl, lum);
        f.valid = !f.ddl.is_empty()
            && f.calculate_min_max()
            && f.interpolate_values()
            && f.prepare_model();
        f
    }

    /// Create a display function for an idealized device whose luminance
    /// rises linearly from `lum_min` to `lum_max` over `count` levels.
    pub fn with_luminance_range(
        model: DisplayModel,
        lum_min: f64,
        lum_max: f64,
        count: usize,
    ) -> Self {
        if count < 2 || lum_min >= lum_max {
            return Self::new(model, &[], &[], 0);
        }
        let max_ddl = (count - 1) as u16;
        let ddl: Vec<u16> = (0..count as u32).map(|i| i as u16).collect();
        let step = (lum_max - lum_min) / max_ddl as f64;
        let lum: Vec<f64> = (0..count).map(|i| lum_min + step * i as f64).collect();
        Self::new(model, &ddl, &lum, max_ddl)
    }

    /// Read a display characteristic file.
    ///
    /// The format is line oriented: `#` starts a comment, the first entry
    /// must be `max <n>` (the maximum DDL), optionally followed by
    /// `amb <value>` (ambient light), then one `<ddl> <luminance>` pair
    /// per entry.
    pub fn from_file(model: DisplayModel, path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).context(ReadCalibrationFileSnafu { path })?;
        let mut tokens = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split_whitespace())
            .peekable();

        let invalid = |reason: &str| {
            InvalidCalibrationFileSnafu {
                path,
                reason: reason.to_string(),
            }
            .build()
        };

        if tokens.next() != Some("max") {
            return Err(invalid("missing 'max' keyword for the maximum DDL value"));
        }
        let max_ddl: u16 = tokens
            .next()
            .and_then(|t| t.parse().ok())
            .filter(|&v| v > 0)
            .ok_or_else(|| invalid("invalid or missing maximum DDL value"))?;

        let mut ambient = 0.0;
        if tokens.peek() == Some(&"amb") {
            tokens.next();
            let value: f64 = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| invalid("invalid ambient light value"))?;
            if value < 0.0 {
                warn!("negative ambient light in display file, ignoring");
            } else {
                ambient = value;
            }
        }

        let mut ddl = Vec::new();
        let mut lum = Vec::new();
        while let Some(first) = tokens.next() {
            if ddl.len() > max_ddl as usize {
                warn!("too many entries in display file, ignoring the rest");
                break;
            }
            let d: u16 = first
                .parse()
                .map_err(|_| invalid("malformed DDL value"))?;
            let l: f64 = tokens
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| invalid("missing luminance value"))?;
            if d > max_ddl {
                warn!(
                    "DDL value ({}) exceeds maximum ({}) in display file, ignoring entry",
                    d, max_ddl
                );
                continue;
            }
            ddl.push(d);
            lum.push(l);
        }
        if ddl.is_empty() {
            return Err(invalid("no characteristic entries"));
        }
        let mut f = Self::new(model, &ddl, &lum, max_ddl);
        f.ambient = ambient;
        Ok(f)
    }

    /// Whether the function was constructed from usable data.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The calibration model.
    pub fn model(&self) -> DisplayModel {
        self.model
    }

    /// The maximum device driving level.
    pub fn max_ddl_value(&self) -> u16 {
        self.max_ddl
    }

    /// The smallest measured luminance (without ambient light).
    pub fn min_luminance(&self) -> f64 {
        self.min_lum
    }

    /// The largest measured luminance (without ambient light).
    pub fn max_luminance(&self) -> f64 {
        self.max_lum
    }

    /// The current ambient light term.
    pub fn ambient_light(&self) -> f64 {
        self.ambient
    }

    /// Set the ambient light term (in the luminance unit of the table).
    ///
    /// Any cached display LUT is discarded, since the ambient term is
    /// additive inside the luminance table and requires a full rebuild.
    pub fn set_ambient_light(&mut self, value: f64) -> bool {
        if value >= 0.0 {
            self.ambient = value;
            self.clear_cached_tables();
            true
        } else {
            false
        }
    }

    /// Discard all cached display LUTs.
    pub fn clear_cached_tables(&self) {
        let mut cache = self.cache.lock().unwrap();
        for slot in cache.iter_mut() {
            *slot = None;
        }
    }

    /// Get (building on first use) the display LUT for the given input
    /// bit width (2 to 16 bits).
    ///
    /// Returns `None` when the function is invalid, the bit width is out
    /// of range, or the table could not be computed.
    pub fn lookup_table(&self, bits: u16) -> Option<Arc<DisplayLut>> {
        if !self.valid || !(MIN_DISPLAY_BITS..=MAX_DISPLAY_BITS).contains(&bits) {
            return None;
        }
        let count = (maxval(bits) + 1) as usize;
        let slot = (bits - MIN_DISPLAY_BITS) as usize;
        let mut cache = self.cache.lock().unwrap();
        if let Some(lut) = &cache[slot] {
            if lut.count() == count && lut.ambient == self.ambient {
                return Some(Arc::clone(lut));
            }
            cache[slot] = None;
        }
        let lut = self.create_lut(count).map(Arc::new);
        if let Some(lut) = &lut {
            cache[slot] = Some(Arc::clone(lut));
        }
        lut
    }

    fn create_sorted_table(&mut self, ddl: &[u16], lum: &[f64]) {
        // last entry per DDL wins, result ordered by DDL
        let mut slots: Vec<Option<usize>> = vec![None; self.max_ddl as usize + 1];
        for (i, &d) in ddl.iter().enumerate() {
            if d <= self.max_ddl {
                slots[d as usize] = Some(i);
            } else {
                warn!(
                    "DDL value ({}) exceeds maximum ({}), ignoring entry",
                    d, self.max_ddl
                );
            }
        }
        for slot in slots.into_iter().flatten() {
            self.ddl.push(ddl[slot]);
            self.lum.push(lum[slot].max(0.0));
        }
        if self.lum.windows(2).any(|w| w[1] < w[0]) {
            warn!("luminance values (ordered by DDL) do not ascend monotonously");
        }
    }

    fn calculate_min_max(&mut self) -> bool {
        if self.lum.is_empty() {
            return false;
        }
        self.min_lum = self.lum.iter().cloned().fold(f64::MAX, f64::min);
        self.max_lum = self.lum.iter().cloned().fold(f64::MIN, f64::max);
        true
    }

    /// Densify a sparse characteristic onto the full DDL range.
    fn interpolate_values(&mut self) -> bool {
        if self.ddl.len() > self.max_ddl as usize {
            return true;
        }
        let x: Vec<f64> = self.ddl.iter().map(|&d| d as f64).collect();
        let y2 = match spline::coefficients(&x, &self.lum) {
            Some(y2) => y2,
            None => return false,
        };
        debug!(
            "interpolating display characteristic from {} to {} entries",
            self.ddl.len(),
            self.max_ddl as usize + 1
        );
        let mut ddl = Vec::with_capacity(self.max_ddl as usize + 1);
        let mut lum = Vec::with_capacity(self.max_ddl as usize + 1);
        for d in 0..=self.max_ddl {
            ddl.push(d);
            lum.push(spline::interpolate(&x, &self.lum, &y2, d as f64).max(0.0));
        }
        self.ddl = ddl;
        self.lum = lum;
        true
    }

    fn prepare_model(&mut self) -> bool {
        match self.model {
            DisplayModel::Gsdf => {
                self.gsdf_index = (1..=GSDF_COUNT).map(|j| j as f64).collect();
                self.gsdf = self.gsdf_index.iter().map(|&j| gsdf_luminance(j)).collect();
                match spline::coefficients(&self.gsdf_index, &self.gsdf) {
                    Some(y2) => {
                        self.gsdf_spline = y2;
                        true
                    }
                    None => false,
                }
            }
            DisplayModel::Cielab => true,
        }
    }

    fn create_lut(&self, count: usize) -> Option<DisplayLut> {
        if count < 2 {
            return None;
        }
        let targets = match self.model {
            DisplayModel::Gsdf => {
                let jnd_min = jnd_index(self.min_lum + self.ambient);
                let jnd_max = jnd_index(self.max_lum + self.ambient);
                if jnd_max <= jnd_min {
                    return None;
                }
                let dist = (jnd_max - jnd_min) / (count - 1) as f64;
                (0..count)
                    .map(|i| {
                        let jnd = jnd_min + dist * i as f64;
                        spline::interpolate(&self.gsdf_index, &self.gsdf, &self.gsdf_spline, jnd)
                    })
                    .collect::<Vec<_>>()
            }
            DisplayModel::Cielab => {
                let white = self.max_lum + self.ambient;
                if white <= 0.0 {
                    return None;
                }
                let lab_min = lab_lightness((self.min_lum + self.ambient) / white);
                let dist = (100.0 - lab_min) / (count - 1) as f64;
                (0..count)
                    .map(|i| lab_luminance(lab_min + dist * i as f64) * white)
                    .collect::<Vec<_>>()
            }
        };
        // scan the sorted characteristic for the closest DDL per target
        let mut data = Vec::with_capacity(count);
        let mut j = 0;
        for target in targets {
            while j + 1 < self.lum.len() && self.lum[j] + self.ambient < target {
                j += 1;
            }
            if j > 0
                && (self.lum[j - 1] + self.ambient - target).abs()
                    < (self.lum[j] + self.ambient - target).abs()
            {
                j -= 1;
            }
            data.push(self.ddl[j]);
        }
        Some(DisplayLut {
            data,
            ambient: self.ambient,
        })
    }
}

/// Luminance (cd/m^2) of the given JND index per the Grayscale Standard
/// Display Function definition (PS 3.14).
fn gsdf_luminance(jnd: f64) -> f64 {
    const A: f64 = -1.301_187_7;
    const B: f64 = -2.584_019_1e-2;
    const C: f64 = 8.024_263_6e-2;
    const D: f64 = -1.032_022_9e-1;
    const E: f64 = 1.364_669_9e-1;
    const F: f64 = 2.874_562_0e-2;
    const G: f64 = -2.546_840_4e-2;
    const H: f64 = -3.197_897_7e-3;
    const K: f64 = 1.299_263_4e-4;
    const M: f64 = 1.363_533_4e-3;
    let ln = jnd.ln();
    let num = A + C * ln + E * ln.powi(2) + G * ln.powi(3) + M * ln.powi(4);
    let den = 1.0 + B * ln + D * ln.powi(2) + F * ln.powi(3) + H * ln.powi(4) + K * ln.powi(5);
    10f64.powf(num / den)
}

/// JND index of the given luminance, the inverse of the GSDF curve
/// (PS 3.14 log-polynomial fit).
fn jnd_index(luminance: f64) -> f64 {
    const A: f64 = 71.498_068;
    const B: f64 = 94.593_053;
    const C: f64 = 41.912_053;
    const D: f64 = 9.824_700_4;
    const E: f64 = 0.281_754_07;
    const F: f64 = -1.187_845_5;
    const G: f64 = -0.180_143_49;
    const H: f64 = 0.147_108_99;
    const I: f64 = -0.017_046_845;
    let lg = luminance.max(f64::MIN_POSITIVE).log10();
    A + B * lg
        + C * lg.powi(2)
        + D * lg.powi(3)
        + E * lg.powi(4)
        + F * lg.powi(5)
        + G * lg.powi(6)
        + H * lg.powi(7)
        + I * lg.powi(8)
}

/// CIELAB lightness L* of a relative luminance.
fn lab_lightness(relative: f64) -> f64 {
    if relative > 0.008856 {
        116.0 * relative.cbrt() - 16.0
    } else {
        903.3 * relative
    }
}

/// Relative luminance of a CIELAB lightness L*, inverse of
/// [`lab_lightness`].
fn lab_luminance(lightness: f64) -> f64 {
    if lightness > 7.9996 {
        ((lightness + 16.0) / 116.0).powi(3)
    } else {
        lightness / 903.3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> DisplayFunction {
        DisplayFunction::with_luminance_range(DisplayModel::Gsdf, 0.5, 300.0, 256)
    }

    #[test]
    fn gsdf_curve_matches_known_anchors() {
        // PS 3.14: the curve spans about 0.05 to 4000 cd/m^2
        assert!((gsdf_luminance(1.0) - 0.05).abs() < 0.01);
        assert!(gsdf_luminance(1023.0) > 3500.0);
        // curve and inverse agree
        for jnd in [10.0, 100.0, 500.0, 1000.0] {
            let roundtrip = jnd_index(gsdf_luminance(jnd));
            assert!(
                (roundtrip - jnd).abs() < 2.0,
                "jnd {} came back as {}",
                jnd,
                roundtrip
            );
        }
    }

    #[test]
    fn gsdf_curve_is_monotone() {
        let mut previous = 0.0;
        for j in 1..=1023 {
            let lum = gsdf_luminance(j as f64);
            assert!(lum > previous);
            previous = lum;
        }
    }

    #[test]
    fn lab_functions_are_inverse() {
        for l in [0.5, 5.0, 40.0, 99.0] {
            assert!((lab_lightness(lab_luminance(l)) - l).abs() < 1e-9);
        }
    }

    #[test]
    fn display_lut_is_monotone_for_a_linear_device() {
        let disp = monitor();
        assert!(disp.is_valid());
        let lut = disp.lookup_table(8).expect("LUT should be created");
        assert_eq!(lut.count(), 256);
        for pair in lut.data.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(lut.value(255) > lut.value(0));
    }

    #[test]
    fn cielab_lut_is_monotone() {
        let disp = DisplayFunction::with_luminance_range(DisplayModel::Cielab, 0.5, 300.0, 256);
        let lut = disp.lookup_table(8).expect("LUT should be created");
        for pair in lut.data.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn lookup_table_is_cached() {
        let disp = monitor();
        let first = disp.lookup_table(8).unwrap();
        let second = disp.lookup_table(8).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn ambient_light_change_rebuilds_tables() {
        let mut disp = monitor();
        let before = disp.lookup_table(8).unwrap();
        assert!(disp.set_ambient_light(30.0));
        let after = disp.lookup_table(8).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.ambient_light(), 30.0);
        assert!(!disp.set_ambient_light(-1.0));
    }

    #[test]
    fn out_of_range_bit_widths_are_rejected() {
        let disp = monitor();
        assert!(disp.lookup_table(1).is_none());
        assert!(disp.lookup_table(17).is_none());
    }

    #[test]
    fn empty_characteristic_is_invalid() {
        let disp = DisplayFunction::new(DisplayModel::Gsdf, &[], &[], 255);
        assert!(!disp.is_valid());
        assert!(disp.lookup_table(8).is_none());
    }

    #[test]
    fn sparse_characteristic_is_interpolated() {
        let disp = DisplayFunction::new(
            DisplayModel::Gsdf,
            &[0, 128, 255],
            &[1.0, 80.0, 250.0],
            255,
        );
        assert!(disp.is_valid());
        // densified to the full DDL range, measured points preserved
        assert_eq!(disp.ddl.len(), 256);
        assert!((disp.lum[0] - 1.0).abs() < 1e-9);
        assert!((disp.lum[128] - 80.0).abs() < 1e-9);
        assert!((disp.lum[255] - 250.0).abs() < 1e-9);
    }

    #[test]
    fn unsorted_measurements_are_ordered_by_ddl() {
        let disp = DisplayFunction::new(
            DisplayModel::Gsdf,
            &[255, 0, 128],
            &[250.0, 1.0, 80.0],
            255,
        );
        assert!(disp.is_valid());
        assert!((disp.min_luminance() - 1.0).abs() < 1e-9);
        assert!((disp.max_luminance() - 250.0).abs() < 1e-9);
    }

    #[test]
    fn characteristic_file_round_trip() {
        let path = std::env::temp_dir().join("dicom-grayscale-display-test.lut");
        std::fs::write(
            &path,
            "# test monitor\nmax 255\namb 0.3\n0 1.0\n128 80.0 # midpoint\n255 250.0\n",
        )
        .unwrap();
        let disp = DisplayFunction::from_file(DisplayModel::Gsdf, &path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(disp.is_valid());
        assert_eq!(disp.max_ddl_value(), 255);
        assert_eq!(disp.ambient_light(), 0.3);
    }

    #[test]
    fn characteristic_file_requires_max_header() {
        let path = std::env::temp_dir().join("dicom-grayscale-display-bad.lut");
        std::fs::write(&path, "0 1.0\n255 250.0\n").unwrap();
        let result = DisplayFunction::from_file(DisplayModel::Gsdf, &path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
