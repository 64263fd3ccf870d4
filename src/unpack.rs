//! Unpacking of raw pixel data samples.
//!
//! This module converts the packed byte stream of a _Pixel Data_ attribute
//! into one integer sample per pixel, honoring _Bits Allocated_,
//! _Bits Stored_, _High Bit_ and _Pixel Representation_. Samples may be
//! stored with arbitrary bit widths (1–32 bits, not necessarily a power of
//! two) and are sign-extended when the pixel representation says so.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::pixel::{maxval, PixelBuffer, Representation, Sample};
use crate::{EmptyPixelDataSnafu, Error, InvalidPixelDescriptionSnafu};
use snafu::ensure;

/// Description of how samples are packed into the raw pixel data buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixelDescription {
    bits_allocated: u16,
    bits_stored: u16,
    high_bit: u16,
    signed: bool,
}

impl PixelDescription {
    /// Create a new pixel description.
    ///
    /// Fails if `bits_stored` is zero or exceeds 32 bits,
    /// if `bits_stored > bits_allocated`,
    /// or if `high_bit + 1 < bits_stored`.
    pub fn new(
        bits_allocated: u16,
        bits_stored: u16,
        high_bit: u16,
        signed: bool,
    ) -> Result<Self, Error> {
        ensure!(
            bits_stored > 0
                && bits_stored <= 32
                && bits_allocated >= bits_stored
                && bits_allocated <= 32
                && high_bit + 1 >= bits_stored,
            InvalidPixelDescriptionSnafu {
                bits_allocated,
                bits_stored,
                high_bit,
            }
        );
        Ok(PixelDescription {
            bits_allocated,
            bits_stored,
            high_bit,
            signed,
        })
    }

    /// The number of bits allocated for each sample.
    pub fn bits_allocated(&self) -> u16 {
        self.bits_allocated
    }

    /// The number of bits effectively stored for each sample.
    pub fn bits_stored(&self) -> u16 {
        self.bits_stored
    }

    /// The position of the high bit within the allocated bits.
    pub fn high_bit(&self) -> u16 {
        self.high_bit
    }

    /// Whether samples are in two's complement representation.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// The representation samples are unpacked into.
    pub fn representation(&self) -> Representation {
        Representation::for_bits(self.bits_stored, self.signed)
    }

    /// Distance (in bits) from the bottom of the allocated cell
    /// to the least significant stored bit.
    fn value_offset(&self) -> u16 {
        let shift = self.high_bit + 1 - self.bits_stored;
        // malformed high bit: fall back to a right-aligned value
        if shift + self.bits_stored > self.bits_allocated {
            self.bits_allocated - self.bits_stored
        } else {
            shift
        }
    }
}

/// Unpacked samples plus their observed and absolute value bounds.
#[derive(Debug, Clone)]
pub struct SampleData {
    buffer: PixelBuffer,
    bits: u16,
    min: f64,
    max: f64,
    abs_min: f64,
    abs_max: f64,
}

impl SampleData {
    /// Unpack all samples from a raw pixel data buffer.
    ///
    /// The number of samples is the total bit length divided by
    /// _Bits Allocated_, rounded down; a trailing partial sample is
    /// discarded. Fails only on an empty input buffer.
    pub fn unpack(data: &[u8], desc: &PixelDescription) -> Result<Self, Error> {
        ensure!(!data.is_empty(), EmptyPixelDataSnafu);
        let (abs_min, abs_max) = if desc.signed {
            (
                -(maxval(desc.bits_stored - 1) as f64) - 1.0,
                maxval(desc.bits_stored - 1) as f64,
            )
        } else {
            (0.0, maxval(desc.bits_stored) as f64)
        };
        let abs_range = (abs_max - abs_min + 1.0) as usize;
        let (buffer, min, max) = match desc.representation() {
            Representation::U8 => unpack_to(data, desc, abs_min, abs_range, PixelBuffer::U8),
            Representation::S8 => unpack_to(data, desc, abs_min, abs_range, PixelBuffer::S8),
            Representation::U16 => unpack_to(data, desc, abs_min, abs_range, PixelBuffer::U16),
            Representation::S16 => unpack_to(data, desc, abs_min, abs_range, PixelBuffer::S16),
            Representation::U32 => unpack_to(data, desc, abs_min, abs_range, PixelBuffer::U32),
            Representation::S32 => unpack_to(data, desc, abs_min, abs_range, PixelBuffer::S32),
        };
        Ok(SampleData {
            buffer,
            bits: desc.bits_stored,
            min,
            max,
            abs_min,
            abs_max,
        })
    }

    /// The unpacked sample buffer.
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Take the unpacked sample buffer out of this object.
    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }

    /// The number of unpacked samples.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether no samples were unpacked.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The effective bit depth of the samples.
    pub fn bits(&self) -> u16 {
        self.bits
    }

    /// The smallest sample value present in the data.
    pub fn min_value(&self) -> f64 {
        self.min
    }

    /// The largest sample value present in the data.
    pub fn max_value(&self) -> f64 {
        self.max
    }

    /// The smallest representable sample value.
    pub fn abs_minimum(&self) -> f64 {
        self.abs_min
    }

    /// The largest representable sample value.
    pub fn abs_maximum(&self) -> f64 {
        self.abs_max
    }

    /// The number of representable sample values.
    pub fn abs_max_range(&self) -> f64 {
        self.abs_max - self.abs_min + 1.0
    }

    /// Observed minimum and maximum of a sub-range of the samples,
    /// e.g. of a single frame.
    pub fn min_max_of_range(&self, start: usize, count: usize) -> Option<(f64, f64)> {
        let abs_range = self.abs_max_range() as usize;
        crate::pixel::with_samples!(&self.buffer, |samples| {
            let end = start.checked_add(count)?.min(samples.len());
            if start >= end {
                return None;
            }
            Some(determine_min_max(
                &samples[start..end],
                self.abs_min,
                abs_range,
            ))
        })
    }
}

fn unpack_to<T: Sample>(
    data: &[u8],
    desc: &PixelDescription,
    abs_min: f64,
    abs_range: usize,
    wrap: impl FnOnce(Vec<T>) -> PixelBuffer,
) -> (PixelBuffer, f64, f64) {
    let samples: Vec<T> = match desc.bits_allocated {
        8 => convert_words(data.iter().map(|&b| b as u64), desc),
        16 => convert_words(
            data.chunks_exact(2).map(|c| LittleEndian::read_u16(c) as u64),
            desc,
        ),
        32 => convert_words(
            data.chunks_exact(4).map(|c| LittleEndian::read_u32(c) as u64),
            desc,
        ),
        _ => convert_bitstream(data, desc),
    };
    let (min, max) = determine_min_max(&samples, abs_min, abs_range);
    (wrap(samples), min, max)
}

/// Extract one sample per storage word (8, 16 or 32 bits allocated).
fn convert_words<T: Sample>(words: impl Iterator<Item = u64>, desc: &PixelDescription) -> Vec<T> {
    let stored = desc.bits_stored;
    let shift = desc.value_offset();
    if stored == desc.bits_allocated {
        debug!("unpacking samples: direct copy ({} bits)", stored);
    } else {
        debug!(
            "unpacking samples: shift by {} and mask to {} bits",
            shift, stored
        );
    }
    let mask = maxval(stored);
    words
        .map(|w| narrow_sample((w >> shift) & mask, stored, desc.signed))
        .collect()
}

/// Extract samples from a stream of arbitrarily aligned cells,
/// e.g. 12 bits allocated. A bit cursor walks the buffer, taking
/// `bits_stored` bits per sample and skipping the padding gap.
fn convert_bitstream<T: Sample>(data: &[u8], desc: &PixelDescription) -> Vec<T> {
    debug!(
        "unpacking samples: general bit cursor ({} bits allocated, {} stored)",
        desc.bits_allocated, desc.bits_stored
    );
    let alloc = desc.bits_allocated as u64;
    let stored = desc.bits_stored;
    let offset = desc.value_offset() as u64;
    let total_bits = data.len() as u64 * 8;
    let count = (total_bits / alloc) as usize;
    let mut samples = Vec::with_capacity(count);
    for i in 0..count {
        let start = i as u64 * alloc + offset;
        if start + stored as u64 > total_bits {
            break;
        }
        samples.push(narrow_sample(read_bits(data, start, stored), stored, desc.signed));
    }
    samples
}

/// Read `count` bits starting at absolute bit position `start`,
/// least significant bit first within each byte.
fn read_bits(data: &[u8], start: u64, count: u16) -> u64 {
    let mut value = 0u64;
    let mut got = 0u16;
    let mut pos = start;
    while got < count {
        let byte = data[(pos / 8) as usize] as u64;
        let bit = (pos % 8) as u16;
        let take = (8 - bit).min(count - got);
        value |= ((byte >> bit) & maxval(take)) << got;
        got += take;
        pos += u64::from(take);
    }
    value
}

/// Narrow a masked raw value to the target sample type,
/// expanding the sign when the top stored bit is set.
#[inline]
fn narrow_sample<T: Sample>(raw: u64, stored: u16, signed: bool) -> T {
    let value = if signed && raw & (1 << (stored - 1)) != 0 {
        raw as i64 - (1i64 << stored)
    } else {
        raw as i64
    };
    T::from(value).unwrap_or(T::ZERO)
}

/// Determine the observed minimum and maximum sample values.
///
/// When the sample type is at most 16 bits wide and the buffer is large
/// compared to the value domain, a presence table over all possible values
/// is filled first and scanned from both ends, instead of comparing every
/// sample.
pub(crate) fn determine_min_max<T: Sample>(
    samples: &[T],
    abs_min: f64,
    abs_range: usize,
) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    if std::mem::size_of::<T>() <= 2 && samples.len() > 3 * abs_range {
        debug!(
            "determining min/max with a presence table ({} entries)",
            abs_range
        );
        let mut present = vec![false; abs_range];
        for sample in samples {
            let index = (sample.to_f64().unwrap_or(0.0) - abs_min) as usize;
            if let Some(slot) = present.get_mut(index) {
                *slot = true;
            }
        }
        let min = present.iter().position(|&p| p).unwrap_or(0);
        let max = present.iter().rposition(|&p| p).unwrap_or(0);
        (min as f64 + abs_min, max as f64 + abs_min)
    } else {
        let mut min = samples[0];
        let mut max = samples[0];
        for &sample in &samples[1..] {
            if sample < min {
                min = sample;
            } else if sample > max {
                max = sample;
            }
        }
        (
            min.to_f64().unwrap_or(0.0),
            max.to_f64().unwrap_or(0.0),
        )
    }
}
