#![deny(trivial_numeric_casts, unsafe_code)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    unused_qualifications,
    unused_import_braces
)]

//! This crate implements the grayscale rendering pipeline for DICOM pixel
//! data: the chain of numeric transforms that takes a stored raw sample
//! to a calibrated, device-ready output value.
//!
//! The pipeline stages, in data-flow order:
//!
//! - [`unpack`] extracts integer samples of arbitrary bit width from the
//!   packed pixel data buffer.
//! - [`modality`] maps raw samples to modality values through a rescale
//!   or a modality LUT.
//! - [`voi`] selects the value range of interest (window or VOI LUT) and
//!   composes the optional presentation LUT and display calibration.
//! - [`display`] builds perceptually linearized lookup tables from
//!   measured display characteristics (GSDF/Barten or CIELAB).
//! - [`overlay`] burns bitmap overlay planes into the rendered frame.
//! - [`render`] ties the stages together per frame and manages the
//!   output buffer.
//!
//! Parsing of DICOM data sets is not part of this crate; the entry
//! points consume plain attribute values (bit depths, LUT descriptor
//! data, raw pixel bytes) from a separate parsing layer.
//!
//! # Example
//!
//! ```
//! use dicom_grayscale::{
//!     ImageDescription, ModalityTransform, MonoImage, PixelDescription,
//! };
//!
//! # fn main() -> Result<(), dicom_grayscale::Error> {
//! // a 2x1 image, 12 bits stored in 16-bit little-endian words
//! let description = ImageDescription {
//!     columns: 2,
//!     rows: 1,
//!     frames: 1,
//!     monochrome1: false,
//!     pixel: PixelDescription::new(16, 12, 11, false)?,
//! };
//! let raw = [0x34, 0x01, 0x00, 0x08];
//! let mut image = MonoImage::new(description, &raw, ModalityTransform::rescale(1.0, -1024.0))?;
//! image.set_window(40.0, 400.0);
//! let frame = image.get_output_data(0, 8).expect("rendering failed");
//! assert_eq!(frame.len(), 2);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use snafu::Snafu;

pub mod display;
pub mod lut;
pub mod modality;
pub mod overlay;
pub mod pixel;
pub mod render;
pub mod unpack;
pub mod voi;

mod spline;

pub use display::{DisplayFunction, DisplayLut, DisplayModel};
pub use lut::LookupTable;
pub use modality::{ModalityData, ModalityTransform};
pub use overlay::{OverlayGroup, OverlayMode, OverlayPlane};
pub use pixel::{OutputBuffer, PixelBuffer, Representation};
pub use render::{ImageDescription, MinMaxMode, MonoImage, Polarity};
pub use unpack::{PixelDescription, SampleData};
pub use voi::{PresentationLutShape, VoiLutFunction, Window};

/// Errors of the rendering pipeline.
///
/// Out-of-domain pixel values never produce errors, they clamp; and
/// objects built from document data (lookup tables, display functions)
/// report unusable input through their validity flag instead.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The pixel data buffer is empty.
    #[snafu(display("empty pixel data"))]
    EmptyPixelData,

    /// The declared sample packing is inconsistent.
    #[snafu(display(
        "invalid pixel description (bits allocated {}, bits stored {}, high bit {})",
        bits_allocated,
        bits_stored,
        high_bit
    ))]
    InvalidPixelDescription {
        /// declared bits allocated
        bits_allocated: u16,
        /// declared bits stored
        bits_stored: u16,
        /// declared high bit
        high_bit: u16,
    },

    /// The requested frame does not exist.
    #[snafu(display("frame {} out of range ({} frames)", frame, frames))]
    FrameOutOfRange {
        /// the requested frame
        frame: u32,
        /// the number of frames
        frames: u32,
    },

    /// The requested output bit depth cannot be rendered.
    #[snafu(display("unsupported output bit depth {}", bits))]
    UnsupportedBitDepth {
        /// the requested bit depth
        bits: u16,
    },

    /// A caller-supplied output buffer is smaller than one frame.
    #[snafu(display("output buffer too small ({} values, {} required)", got, required))]
    BufferTooSmall {
        /// values in the supplied buffer
        got: usize,
        /// values required for one frame
        required: usize,
    },

    /// An overlay group number is odd or outside 0x6000–0x60FF.
    #[snafu(display("invalid overlay group number 0x{:04x}", group))]
    InvalidOverlayGroup {
        /// the offending group number
        group: u16,
    },

    /// A display characteristic file could not be read.
    #[snafu(display("failed to read calibration file {}: {}", path.display(), source))]
    ReadCalibrationFile {
        /// the file path
        path: PathBuf,
        /// the underlying I/O error
        source: std::io::Error,
    },

    /// A display characteristic file could not be parsed.
    #[snafu(display("invalid calibration file {}: {}", path.display(), reason))]
    InvalidCalibrationFile {
        /// the file path
        path: PathBuf,
        /// what went wrong
        reason: String,
    },

    /// The requested feature is not supported by this build.
    #[snafu(display("{} not supported", feature))]
    NotSupported {
        /// the requested feature
        feature: &'static str,
    },
}

/// Shorthand result type of this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
