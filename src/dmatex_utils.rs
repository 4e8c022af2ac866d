// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! dmatex_utils: Error types and shared constants needed by the rest of the
//! crate.

use std::ffi::NulError;
use std::fmt;
use std::io::Error as IoError;
use std::num::TryFromIntError;
use std::path::PathBuf;
use std::str::Utf8Error;

use nix::Error as NixError;
use remain::sorted;
use thiserror::Error;

use crate::egl::bindings as egl;
use crate::format::DrmFormat;

/// Mapped memory access flags.
pub const DMATEX_MAP_ACCESS_MASK: u32 = 0x0f;
pub const DMATEX_MAP_ACCESS_READ: u32 = 0x01;
pub const DMATEX_MAP_ACCESS_WRITE: u32 = 0x02;
pub const DMATEX_MAP_ACCESS_RW: u32 = 0x03;

/// Reason an EGL image import was rejected, mapped from the platform error
/// code.  The raw code is never the primary error identity; unrecognized
/// codes are carried in `Unknown`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageImportErrorKind {
    BadAccess,
    BadAlloc,
    BadDisplay,
    BadMatch,
    BadParameter,
    Unknown(i32),
}

impl ImageImportErrorKind {
    /// Maps a raw `eglGetError` code onto the closed reason set.
    pub fn from_raw(code: i32) -> ImageImportErrorKind {
        match code {
            egl::EGL_BAD_ACCESS => ImageImportErrorKind::BadAccess,
            egl::EGL_BAD_ALLOC => ImageImportErrorKind::BadAlloc,
            egl::EGL_BAD_DISPLAY => ImageImportErrorKind::BadDisplay,
            egl::EGL_BAD_MATCH => ImageImportErrorKind::BadMatch,
            egl::EGL_BAD_PARAMETER => ImageImportErrorKind::BadParameter,
            _ => ImageImportErrorKind::Unknown(code),
        }
    }
}

impl fmt::Display for ImageImportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImageImportErrorKind::BadAccess => write!(f, "bad-access"),
            ImageImportErrorKind::BadAlloc => write!(f, "bad-alloc"),
            ImageImportErrorKind::BadDisplay => write!(f, "bad-display"),
            ImageImportErrorKind::BadMatch => write!(f, "bad-match"),
            ImageImportErrorKind::BadParameter => write!(f, "bad-parameter"),
            ImageImportErrorKind::Unknown(code) => write!(f, "unknown (0x{:x})", code),
        }
    }
}

/// An error generated while using this crate.
#[sorted]
#[derive(Error, Debug)]
pub enum DmatexError {
    /// The DMA-heap allocation ioctl was rejected.
    #[error("dma-heap allocation of {size} bytes failed: {source}")]
    AllocationFailed { size: usize, source: NixError },
    /// Checked arithmetic error.
    #[error("arithmetic failed: {}({}) {op} {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedArithmetic {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
        op: &'static str,
    },
    /// Checked range error.
    #[error("range check failed: {}({}) vs {}({})", .field1.0, .field1.1, .field2.0, .field2.1)]
    CheckedRange {
        field1: (&'static str, usize),
        field2: (&'static str, usize),
    },
    /// A shader stage was rejected by the driver.
    #[error("{stage} shader compilation failed: {log}")]
    CompileFailed { stage: &'static str, log: String },
    /// Headless context bring-up aborted at the named step.
    #[error("GPU context bootstrap failed at {0}")]
    ContextInitFailed(&'static str),
    /// The platform refused to export the image's backing storage.
    #[error("DMA-buf export failed at {0}")]
    ExportFailed(&'static str),
    /// A GL operation left an error on the context.
    #[error("GL {op} failed with error 0x{code:x}")]
    GlError { op: &'static str, code: u32 },
    /// The DMA-heap device node could not be opened.
    #[error("dma-heap device {path} unavailable: {source}")]
    HeapUnavailable { path: PathBuf, source: IoError },
    /// The image import call returned a null image.
    #[error("DMA-buf image import failed: {0}")]
    ImageImportFailed(ImageImportErrorKind),
    /// The bitmap input was malformed.
    #[error("invalid bitmap: {0}")]
    InvalidBitmap(&'static str),
    /// The DRM format is not usable by this pipeline.
    #[error("unsupported DRM format {0:?}")]
    InvalidFormat(DrmFormat),
    /// Violation of a layout assumption.
    #[error("layout violation: {0}")]
    InvalidLayout(&'static str),
    /// The configured row pitch is below the format's minimum.
    #[error("stride {stride} below minimum {min} for the image width")]
    InvalidStride { stride: u32, min: u32 },
    /// An input/output error occurred.
    #[error("an input/output error occurred: {0}")]
    IoError(IoError),
    /// Shader program linking failed.
    #[error("program link failed: {log}")]
    LinkFailed { log: String },
    /// Tagging the allocation with a debug name failed.
    #[error("naming dma-buf \"{tag}\" failed: {source}")]
    NamingFailed { tag: String, source: NixError },
    /// Nix crate error.
    #[error("the errno is {0}")]
    NixError(NixError),
    #[error("nul error occurred: {0}")]
    NulError(NulError),
    /// The driver reported a plane count this pipeline does not handle.
    #[error("expected a single-plane image, driver reported {0} planes")]
    PlaneCountMismatch(usize),
    /// No usable DRM render node.
    #[error("render node unavailable: {0}")]
    RenderNodeUnavailable(String),
    /// An attempted integer conversion failed.
    #[error("int conversion failed: {0}")]
    TryFromIntError(TryFromIntError),
    /// The display does not advertise a required extension.
    #[error("display does not advertise {0}")]
    UnsupportedExtension(&'static str),
    /// Utf8 error.
    #[error("a utf8 error occurred: {0}")]
    Utf8Error(Utf8Error),
}

impl From<NixError> for DmatexError {
    fn from(e: NixError) -> DmatexError {
        DmatexError::NixError(e)
    }
}

impl From<NulError> for DmatexError {
    fn from(e: NulError) -> DmatexError {
        DmatexError::NulError(e)
    }
}

impl From<IoError> for DmatexError {
    fn from(e: IoError) -> DmatexError {
        DmatexError::IoError(e)
    }
}

impl From<TryFromIntError> for DmatexError {
    fn from(e: TryFromIntError) -> DmatexError {
        DmatexError::TryFromIntError(e)
    }
}

impl From<Utf8Error> for DmatexError {
    fn from(e: Utf8Error) -> DmatexError {
        DmatexError::Utf8Error(e)
    }
}

/// The result of an operation in this crate.
pub type DmatexResult<T> = std::result::Result<T, DmatexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_error_fan_out() {
        assert_eq!(
            ImageImportErrorKind::from_raw(egl::EGL_BAD_DISPLAY),
            ImageImportErrorKind::BadDisplay
        );
        assert_eq!(
            ImageImportErrorKind::from_raw(egl::EGL_BAD_PARAMETER),
            ImageImportErrorKind::BadParameter
        );
        assert_eq!(
            ImageImportErrorKind::from_raw(egl::EGL_BAD_MATCH),
            ImageImportErrorKind::BadMatch
        );
        assert_eq!(
            ImageImportErrorKind::from_raw(egl::EGL_BAD_ACCESS),
            ImageImportErrorKind::BadAccess
        );
        assert_eq!(
            ImageImportErrorKind::from_raw(egl::EGL_BAD_ALLOC),
            ImageImportErrorKind::BadAlloc
        );
        // Codes outside the closed set are preserved, not conflated.
        assert_eq!(
            ImageImportErrorKind::from_raw(0x3001),
            ImageImportErrorKind::Unknown(0x3001)
        );
    }

    #[test]
    fn import_error_names_reason() {
        let err = DmatexError::ImageImportFailed(ImageImportErrorKind::BadMatch);
        assert_eq!(err.to_string(), "DMA-buf image import failed: bad-match");

        let err = DmatexError::ImageImportFailed(ImageImportErrorKind::Unknown(0x3001));
        assert_eq!(
            err.to_string(),
            "DMA-buf image import failed: unknown (0x3001)"
        );
    }

    #[test]
    fn context_error_names_step() {
        let err = DmatexError::ContextInitFailed("eglInitialize");
        assert_eq!(
            err.to_string(),
            "GPU context bootstrap failed at eglInitialize"
        );
    }
}
