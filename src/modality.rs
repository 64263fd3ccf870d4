//! The modality transform.
//!
//! Maps unpacked raw samples to modality values (e.g. Hounsfield units)
//! through a linear rescale, a modality LUT, or as-is. The result carries
//! both the observed value bounds and the absolute representable bounds,
//! which later stages use to size their value domains.

use std::sync::Arc;

use num_traits::ToPrimitive;
use tracing::debug;

use crate::lut::LookupTable;
use crate::pixel::{maxval, tobits, with_samples, PixelBuffer, Representation, Sample};
use crate::unpack::SampleData;

/// The modality transform applied to raw samples.
#[derive(Debug, Clone)]
pub enum ModalityTransform {
    /// No transform, modality values are the raw samples.
    Identity,
    /// Linear rescale: `value * slope + intercept`.
    Rescale {
        /// the rescale slope
        slope: f64,
        /// the rescale intercept
        intercept: f64,
    },
    /// A modality lookup table.
    Lut(Arc<LookupTable>),
}

impl ModalityTransform {
    /// A linear rescale transform.
    pub fn rescale(slope: f64, intercept: f64) -> Self {
        ModalityTransform::Rescale { slope, intercept }
    }

    /// A modality LUT transform.
    pub fn lut(lut: LookupTable) -> Self {
        ModalityTransform::Lut(Arc::new(lut))
    }
}

impl Default for ModalityTransform {
    fn default() -> Self {
        ModalityTransform::Identity
    }
}

/// Modality values of one image, with observed and absolute bounds.
///
/// May be shared between derived images through an `Arc`.
#[derive(Debug, Clone)]
pub struct ModalityData {
    values: PixelBuffer,
    bits: u16,
    min: f64,
    max: f64,
    abs_min: f64,
    abs_max: f64,
}

impl ModalityData {
    /// Apply the given modality transform to unpacked samples.
    pub fn new(samples: SampleData, transform: &ModalityTransform) -> Self {
        match transform {
            ModalityTransform::Identity => {
                let (min, max) = (samples.min_value(), samples.max_value());
                let (abs_min, abs_max) = (samples.abs_minimum(), samples.abs_maximum());
                let bits = samples.bits();
                ModalityData {
                    values: samples.into_buffer(),
                    bits,
                    min,
                    max,
                    abs_min,
                    abs_max,
                }
            }
            ModalityTransform::Rescale { slope, intercept } => {
                apply_rescale(samples, *slope, *intercept)
            }
            ModalityTransform::Lut(lut) => apply_lut(samples, lut),
        }
    }

    /// The modality value buffer.
    pub fn values(&self) -> &PixelBuffer {
        &self.values
    }

    /// The representation of the modality values.
    pub fn representation(&self) -> Representation {
        self.values.representation()
    }

    /// The number of modality values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the buffer holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The effective bit depth of the modality values.
    pub fn bits(&self) -> u16 {
        self.bits
    }

    /// The smallest modality value present in the data.
    pub fn min_value(&self) -> f64 {
        self.min
    }

    /// The largest modality value present in the data.
    pub fn max_value(&self) -> f64 {
        self.max
    }

    /// The smallest representable modality value.
    pub fn abs_minimum(&self) -> f64 {
        self.abs_min
    }

    /// The largest representable modality value.
    pub fn abs_maximum(&self) -> f64 {
        self.abs_max
    }

    /// The number of representable modality values.
    pub fn abs_max_range(&self) -> f64 {
        self.abs_max - self.abs_min + 1.0
    }

    /// A window covering the observed value range,
    /// per the supplement 33 min-max window definition.
    pub fn min_max_window(&self) -> Option<(f64, f64)> {
        let center = (self.min + self.max + 1.0) / 2.0;
        let width = self.max - self.min + 1.0;
        if width > 0.0 {
            Some((center, width))
        } else {
            None
        }
    }

    /// A window covering the observed range after clipping the given
    /// fraction of pixels at both ends of the histogram.
    pub fn histogram_window(&self, threshold: f64) -> Option<(f64, f64)> {
        if self.min >= self.max {
            return None;
        }
        let count = (self.max - self.min + 1.0) as usize;
        let mut quant = vec![0u32; count];
        with_samples!(&self.values, |samples| {
            for sample in samples.iter() {
                let value = sample.to_f64().unwrap_or(0.0);
                if value >= self.min && value <= self.max {
                    quant[(value - self.min) as usize] += 1;
                }
            }
        });
        let thresh_count = (threshold * self.values.len() as f64) as u32;
        let mut sum = 0;
        let mut lower = 0;
        while lower < count && sum < thresh_count {
            sum += quant[lower];
            lower += 1;
        }
        let min_value = if lower < count { self.min + lower as f64 } else { 0.0 };
        sum = 0;
        let mut upper = count;
        while upper > 0 && sum < thresh_count {
            upper -= 1;
            sum += quant[upper];
        }
        let max_value = if upper > 0 { self.min + upper as f64 } else { 0.0 };
        if min_value < max_value {
            let center = (min_value + max_value + 1.0) / 2.0;
            let width = max_value - min_value + 1.0;
            Some((center, width))
        } else {
            None
        }
    }

    /// A window covering the value range of a rectangular region of one
    /// frame. The rectangle is clipped to the image bounds.
    #[allow(clippy::too_many_arguments)]
    pub fn roi_window(
        &self,
        left: usize,
        top: usize,
        width: usize,
        height: usize,
        columns: usize,
        rows: usize,
        frame: usize,
    ) -> Option<(f64, f64)> {
        if left >= columns || top >= rows || width == 0 || height == 0 {
            return None;
        }
        let right = (left + width).min(columns);
        let bottom = (top + height).min(rows);
        let frame_start = frame * columns * rows;
        with_samples!(&self.values, |samples| {
            let mut min = f64::MAX;
            let mut max = f64::MIN;
            for y in top..bottom {
                let row_start = frame_start + y * columns;
                let row = samples.get(row_start + left..row_start + right)?;
                for sample in row {
                    let value = sample.to_f64().unwrap_or(0.0);
                    min = min.min(value);
                    max = max.max(value);
                }
            }
            if min > max {
                return None;
            }
            Some(((min + max + 1.0) / 2.0, max - min + 1.0))
        })
    }
}

fn apply_rescale(samples: SampleData, slope: f64, intercept: f64) -> ModalityData {
    if slope == 1.0 && intercept == 0.0 {
        // degenerate rescale, keep the samples as they are
        debug!("identity rescale, copying modality values");
        return ModalityData::new(samples, &ModalityTransform::Identity);
    }
    let bound_a = samples.abs_minimum() * slope + intercept;
    let bound_b = samples.abs_maximum() * slope + intercept;
    let abs_min = bound_a.min(bound_b);
    let abs_max = bound_a.max(bound_b);
    let obs_a = samples.min_value() * slope + intercept;
    let obs_b = samples.max_value() * slope + intercept;
    let (min, max) = (obs_a.min(obs_b), obs_a.max(obs_b));
    let bits = tobits((abs_max - abs_min) as u64);
    let in_abs_min = samples.abs_minimum();
    let in_range = samples.abs_max_range() as usize;
    let repr = Representation::select(abs_min, abs_max);
    let values = with_samples!(samples.buffer(), |input| {
        rescale_buffer(input, repr, slope, intercept, in_abs_min, in_range)
    });
    ModalityData {
        values,
        bits,
        min,
        max,
        abs_min,
        abs_max,
    }
}

fn rescale_buffer<I: Sample>(
    input: &[I],
    repr: Representation,
    slope: f64,
    intercept: f64,
    in_abs_min: f64,
    in_range: usize,
) -> PixelBuffer {
    match repr {
        Representation::U8 => {
            PixelBuffer::U8(rescale_samples(input, slope, intercept, in_abs_min, in_range))
        }
        Representation::S8 => {
            PixelBuffer::S8(rescale_samples(input, slope, intercept, in_abs_min, in_range))
        }
        Representation::U16 => {
            PixelBuffer::U16(rescale_samples(input, slope, intercept, in_abs_min, in_range))
        }
        Representation::S16 => {
            PixelBuffer::S16(rescale_samples(input, slope, intercept, in_abs_min, in_range))
        }
        Representation::U32 => {
            PixelBuffer::U32(rescale_samples(input, slope, intercept, in_abs_min, in_range))
        }
        Representation::S32 => {
            PixelBuffer::S32(rescale_samples(input, slope, intercept, in_abs_min, in_range))
        }
    }
}

fn rescale_samples<I: Sample, O: Sample>(
    input: &[I],
    slope: f64,
    intercept: f64,
    in_abs_min: f64,
    in_range: usize,
) -> Vec<O> {
    if std::mem::size_of::<I>() <= 2 && input.len() > 3 * in_range {
        // small domain, large data: precompute every possible output once
        debug!(
            "applying rescale through an optimization LUT ({} entries)",
            in_range
        );
        let table: Vec<O> = (0..in_range)
            .map(|i| O::from_f64((i as f64 + in_abs_min) * slope + intercept))
            .collect();
        return input
            .iter()
            .map(|v| {
                let index = (v.to_f64().unwrap_or(0.0) - in_abs_min) as usize;
                table[index.min(in_range - 1)]
            })
            .collect();
    }
    if slope == 1.0 {
        debug!("applying rescale (add only, intercept {})", intercept);
        input
            .iter()
            .map(|v| O::from_f64(v.to_f64().unwrap_or(0.0) + intercept))
            .collect()
    } else if intercept == 0.0 {
        debug!("applying rescale (multiply only, slope {})", slope);
        input
            .iter()
            .map(|v| O::from_f64(v.to_f64().unwrap_or(0.0) * slope))
            .collect()
    } else {
        debug!("applying rescale (slope {}, intercept {})", slope, intercept);
        input
            .iter()
            .map(|v| O::from_f64(v.to_f64().unwrap_or(0.0) * slope + intercept))
            .collect()
    }
}

fn apply_lut(samples: SampleData, lut: &LookupTable) -> ModalityData {
    if !lut.is_valid() {
        debug!("invalid modality LUT, keeping raw samples");
        return ModalityData::new(samples, &ModalityTransform::Identity);
    }
    let bits = lut.bits();
    let abs_min = 0.0;
    let abs_max = maxval(bits) as f64;
    let in_abs_min = samples.abs_minimum();
    let in_range = samples.abs_max_range() as usize;
    let values = with_samples!(samples.buffer(), |input| {
        if bits <= 8 {
            PixelBuffer::U8(lut_samples(input, lut, in_abs_min, in_range))
        } else {
            PixelBuffer::U16(lut_samples(input, lut, in_abs_min, in_range))
        }
    });
    ModalityData {
        values,
        bits,
        // the LUT bounds are authoritative, not recomputed from data
        min: lut.min_value() as f64,
        max: lut.max_value() as f64,
        abs_min,
        abs_max,
    }
}

fn lut_samples<I: Sample, O: Sample>(
    input: &[I],
    lut: &LookupTable,
    in_abs_min: f64,
    in_range: usize,
) -> Vec<O> {
    let lookup = |v: f64| -> O { O::from(lut.lookup(v as i64)).unwrap_or(O::ZERO) };
    if std::mem::size_of::<I>() <= 2 && input.len() > 3 * in_range {
        debug!(
            "applying modality LUT through an optimization LUT ({} entries)",
            in_range
        );
        let table: Vec<O> = (0..in_range).map(|i| lookup(i as f64 + in_abs_min)).collect();
        input
            .iter()
            .map(|v| {
                let index = (v.to_f64().unwrap_or(0.0) - in_abs_min) as usize;
                table[index.min(in_range - 1)]
            })
            .collect()
    } else {
        debug!("applying modality LUT ({} entries)", lut.count());
        input
            .iter()
            .map(|v| lookup(v.to_f64().unwrap_or(0.0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unpack::PixelDescription;

    fn samples_from_bytes(bytes: &[u8], desc: &PixelDescription) -> SampleData {
        SampleData::unpack(bytes, desc).unwrap()
    }

    #[test]
    fn identity_rescale_keeps_values() {
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&[0, 1, 2, 3, 254, 255], &desc);
        let data = ModalityData::new(samples, &ModalityTransform::rescale(1.0, 0.0));
        for (i, expected) in [0.0, 1.0, 2.0, 3.0, 254.0, 255.0].iter().enumerate() {
            assert_eq!(data.values().get(i), Some(*expected));
        }
        assert_eq!(data.min_value(), 0.0);
        assert_eq!(data.max_value(), 255.0);
    }

    #[test]
    fn rescale_applies_slope_and_intercept() {
        // raw value 308 (12 bits stored in a 16-bit word)
        let desc = PixelDescription::new(16, 12, 11, false).unwrap();
        let samples = samples_from_bytes(&[0x34, 0x01], &desc);
        let data = ModalityData::new(samples, &ModalityTransform::rescale(2.0, -1024.0));
        assert_eq!(data.values().get(0), Some(-408.0));
        assert_eq!(data.abs_minimum(), -1024.0);
        assert_eq!(data.abs_maximum(), 4095.0 * 2.0 - 1024.0);
        assert_eq!(data.representation(), Representation::S16);
    }

    #[test]
    fn rescale_with_negative_slope_swaps_bounds() {
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&[0, 100], &desc);
        let data = ModalityData::new(samples, &ModalityTransform::rescale(-1.0, 0.0));
        assert_eq!(data.min_value(), -100.0);
        assert_eq!(data.max_value(), 0.0);
        assert_eq!(data.abs_minimum(), -255.0);
        assert_eq!(data.abs_maximum(), 0.0);
    }

    #[test]
    fn optimization_lut_matches_per_pixel_rescale() {
        // more than 3 * 256 samples of an 8-bit domain
        let bytes: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&bytes, &desc);
        let data = ModalityData::new(samples, &ModalityTransform::rescale(1.37, -40.0));
        for (i, &b) in bytes.iter().enumerate() {
            let expected = (b as f64 * 1.37 - 40.0) as i16 as f64;
            assert_eq!(data.values().get(i), Some(expected), "sample {}", i);
        }
    }

    #[test]
    fn modality_lut_clamps_out_of_range_inputs() {
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&[0, 5, 9, 200], &desc);
        let lut = LookupTable::new(vec![100, 110, 120, 130], 4, 8);
        let data = ModalityData::new(samples, &ModalityTransform::lut(lut));
        assert_eq!(data.values().get(0), Some(100.0)); // below first entry
        assert_eq!(data.values().get(1), Some(110.0));
        assert_eq!(data.values().get(2), Some(130.0)); // above last entry
        assert_eq!(data.values().get(3), Some(130.0));
    }

    #[test]
    fn modality_lut_bounds_come_from_the_lut() {
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&[1, 1, 1], &desc);
        let lut = LookupTable::new(vec![30, 40, 50], 0, 8);
        let data = ModalityData::new(samples, &ModalityTransform::lut(lut));
        // declared LUT min/max, not the observed outputs
        assert_eq!(data.min_value(), 30.0);
        assert_eq!(data.max_value(), 50.0);
        assert_eq!(data.abs_minimum(), 0.0);
        assert_eq!(data.abs_maximum(), 255.0);
    }

    #[test]
    fn min_max_window_covers_observed_range() {
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&[10, 20, 30], &desc);
        let data = ModalityData::new(samples, &ModalityTransform::Identity);
        let (center, width) = data.min_max_window().unwrap();
        assert_eq!(center, (10.0 + 30.0 + 1.0) / 2.0);
        assert_eq!(width, 21.0);
    }

    #[test]
    fn histogram_window_clips_the_tails() {
        // one sample per value 0..=99, clip 10% from each end
        let bytes: Vec<u8> = (0..100u8).collect();
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&bytes, &desc);
        let data = ModalityData::new(samples, &ModalityTransform::Identity);
        let (center, width) = data.histogram_window(0.1).unwrap();
        assert_eq!(center, (10.0 + 90.0 + 1.0) / 2.0);
        assert_eq!(width, 81.0);
    }

    #[test]
    fn roi_window_scans_a_clipped_rectangle() {
        let bytes = vec![
            0u8, 10, 20, //
            30, 40, 50, //
            60, 70, 80,
        ];
        let desc = PixelDescription::new(8, 8, 7, false).unwrap();
        let samples = samples_from_bytes(&bytes, &desc);
        let data = ModalityData::new(samples, &ModalityTransform::Identity);
        let (center, width) = data.roi_window(1, 1, 5, 5, 3, 3, 0).unwrap();
        assert_eq!(center, (40.0 + 80.0 + 1.0) / 2.0);
        assert_eq!(width, 41.0);
    }
}
