// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! format: DRM fourcc handling and canonical layout calculations for the
//! single-plane linear images this pipeline moves across the CPU/GPU
//! boundary.

use std::fmt;

use crate::dmatex_utils::DmatexError;
use crate::dmatex_utils::DmatexResult;

pub const DRM_FORMAT_R8: [u8; 4] = [b'R', b'8', b' ', b' '];
pub const DRM_FORMAT_RGB565: [u8; 4] = [b'R', b'G', b'1', b'6'];
pub const DRM_FORMAT_BGR888: [u8; 4] = [b'B', b'G', b'2', b'4'];
pub const DRM_FORMAT_RGB888: [u8; 4] = [b'R', b'G', b'2', b'4'];

pub const DRM_FORMAT_XRGB8888: [u8; 4] = [b'X', b'R', b'2', b'4'];
pub const DRM_FORMAT_XBGR8888: [u8; 4] = [b'X', b'B', b'2', b'4'];
pub const DRM_FORMAT_ARGB8888: [u8; 4] = [b'A', b'R', b'2', b'4'];
pub const DRM_FORMAT_ABGR8888: [u8; 4] = [b'A', b'B', b'2', b'4'];

/* Multi-planar YUV formats are recognized so they can be rejected early. */
pub const DRM_FORMAT_NV12: [u8; 4] = [b'N', b'V', b'1', b'2'];
pub const DRM_FORMAT_YVU420: [u8; 4] = [b'Y', b'V', b'1', b'2'];

/// The layout tag for linear, unmodified memory.
pub const DRM_FORMAT_MOD_LINEAR: u64 = 0;

/// A [fourcc](https://en.wikipedia.org/wiki/FourCC) format identifier.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
pub struct DrmFormat(pub u32);

impl DrmFormat {
    /// Constructs a format identifier using a fourcc byte sequence.
    #[inline(always)]
    pub fn new(a: u8, b: u8, c: u8, d: u8) -> DrmFormat {
        DrmFormat(a as u32 | (b as u32) << 8 | (c as u32) << 16 | (d as u32) << 24)
    }

    /// Returns the fourcc code as a sequence of bytes.
    #[inline(always)]
    pub fn to_bytes(&self) -> [u8; 4] {
        let f = self.0;
        [f as u8, (f >> 8) as u8, (f >> 16) as u8, (f >> 24) as u8]
    }

    /// Returns the number of planes the format occupies.
    pub fn num_planes(&self) -> DmatexResult<usize> {
        match self.to_bytes() {
            DRM_FORMAT_R8
            | DRM_FORMAT_RGB565
            | DRM_FORMAT_BGR888
            | DRM_FORMAT_RGB888
            | DRM_FORMAT_XRGB8888
            | DRM_FORMAT_XBGR8888
            | DRM_FORMAT_ARGB8888
            | DRM_FORMAT_ABGR8888 => Ok(1),
            DRM_FORMAT_NV12 => Ok(2),
            DRM_FORMAT_YVU420 => Ok(3),
            _ => Err(DmatexError::InvalidFormat(*self)),
        }
    }

    /// Returns the packed bytes per pixel.  Only meaningful for the
    /// single-plane formats this pipeline supports.
    pub fn bytes_per_pixel(&self) -> DmatexResult<u32> {
        match self.to_bytes() {
            DRM_FORMAT_R8 => Ok(1),
            DRM_FORMAT_RGB565 => Ok(2),
            DRM_FORMAT_BGR888 | DRM_FORMAT_RGB888 => Ok(3),
            DRM_FORMAT_XRGB8888 | DRM_FORMAT_XBGR8888 | DRM_FORMAT_ARGB8888
            | DRM_FORMAT_ABGR8888 => Ok(4),
            _ => Err(DmatexError::InvalidFormat(*self)),
        }
    }

    /// The minimum row pitch for an image of `width` pixels.
    pub fn min_stride(&self, width: u32) -> DmatexResult<u32> {
        let bpp = self.bytes_per_pixel()?;
        checked_arithmetic!(width * bpp)
    }

    /// The tightly packed byte size of a `width` x `height` image.
    pub fn image_size(&self, width: u32, height: u32) -> DmatexResult<usize> {
        let stride = self.min_stride(width)? as usize;
        let height = height as usize;
        checked_arithmetic!(stride * height)
    }
}

impl From<u32> for DrmFormat {
    fn from(u: u32) -> DrmFormat {
        DrmFormat(u)
    }
}

impl From<DrmFormat> for u32 {
    fn from(f: DrmFormat) -> u32 {
        f.0
    }
}

impl fmt::Debug for DrmFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = self.to_bytes();
        if b.iter().all(u8::is_ascii_graphic) {
            write!(
                f,
                "fourcc({}{}{}{})",
                b[0] as char, b[1] as char, b[2] as char, b[3] as char
            )
        } else {
            write!(
                f,
                "fourcc(0x{:02x}{:02x}{:02x}{:02x})",
                b[0], b[1], b[2], b[3]
            )
        }
    }
}

/// Description of a GPU image's real memory layout, as reported by the export
/// query and completed by the export call.
#[derive(Copy, Clone, Debug, Default)]
pub struct StorageMetadata {
    pub format: DrmFormat,
    pub num_planes: usize,
    pub modifier: u64,
    pub stride: u32,
    pub offset: u32,
}

impl StorageMetadata {
    /// Checks the single-plane assumption and (once the stride is known) the
    /// row pitch floor for `width` pixels.  The stride of a freshly queried
    /// image is zero until the export call fills it in; a zero stride is
    /// therefore not checked.
    pub fn validate(&self, width: u32) -> DmatexResult<()> {
        if self.num_planes != 1 {
            return Err(DmatexError::PlaneCountMismatch(self.num_planes));
        }

        if self.stride != 0 {
            let min = self.format.min_stride(width)?;
            if self.stride < min {
                return Err(DmatexError::InvalidStride {
                    stride: self.stride,
                    min,
                });
            }
        }

        Ok(())
    }

    /// Total mappable byte length of the described plane.
    pub fn plane_size(&self, height: u32) -> DmatexResult<usize> {
        let stride = self.stride as usize;
        let height = height as usize;
        let row_bytes = checked_arithmetic!(stride * height)?;
        let offset = self.offset as usize;
        checked_arithmetic!(offset + row_bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;

    use super::*;

    #[test]
    fn format_debug() {
        let f = DrmFormat::new(b'A', b'R', b'2', b'4');
        let mut buf = String::new();
        write!(&mut buf, "{:?}", f).unwrap();
        assert_eq!(buf, "fourcc(AR24)");

        let f = DrmFormat::new(0, 1, 2, 16);
        let mut buf = String::new();
        write!(&mut buf, "{:?}", f).unwrap();
        assert_eq!(buf, "fourcc(0x00010210)");
    }

    #[test]
    fn packed_layouts() {
        let ar24 = DrmFormat::new(b'A', b'R', b'2', b'4');
        assert_eq!(ar24.num_planes().unwrap(), 1);
        assert_eq!(ar24.bytes_per_pixel().unwrap(), 4);
        assert_eq!(ar24.min_stride(256).unwrap(), 1024);
        assert_eq!(ar24.image_size(256, 256).unwrap(), 256 * 256 * 4);

        let bg24 = DrmFormat::new(b'B', b'G', b'2', b'4');
        assert_eq!(bg24.bytes_per_pixel().unwrap(), 3);
        assert_eq!(bg24.image_size(256, 256).unwrap(), 256 * 256 * 3);
    }

    #[test]
    fn multi_planar_rejected() {
        let nv12 = DrmFormat::new(b'N', b'V', b'1', b'2');
        assert_eq!(nv12.num_planes().unwrap(), 2);
        assert!(nv12.bytes_per_pixel().is_err());

        let bogus = DrmFormat::new(b'Z', b'Z', b'9', b'9');
        assert!(bogus.num_planes().is_err());
    }

    #[test]
    fn metadata_plane_count_invariant() {
        let mut meta = StorageMetadata {
            format: DrmFormat::new(b'A', b'R', b'2', b'4'),
            num_planes: 1,
            modifier: DRM_FORMAT_MOD_LINEAR,
            stride: 1024,
            offset: 0,
        };
        meta.validate(256).unwrap();

        meta.num_planes = 2;
        match meta.validate(256) {
            Err(DmatexError::PlaneCountMismatch(2)) => (),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn metadata_stride_floor() {
        let meta = StorageMetadata {
            format: DrmFormat::new(b'A', b'R', b'2', b'4'),
            num_planes: 1,
            modifier: DRM_FORMAT_MOD_LINEAR,
            stride: 512,
            offset: 0,
        };
        match meta.validate(256) {
            Err(DmatexError::InvalidStride { stride: 512, min: 1024 }) => (),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }

        // A queried-but-not-yet-exported image carries no stride.
        let queried = StorageMetadata {
            num_planes: 1,
            ..meta
        };
        let queried = StorageMetadata {
            stride: 0,
            ..queried
        };
        queried.validate(256).unwrap();
    }

    #[test]
    fn plane_size_covers_offset() {
        let meta = StorageMetadata {
            format: DrmFormat::new(b'A', b'R', b'2', b'4'),
            num_planes: 1,
            modifier: DRM_FORMAT_MOD_LINEAR,
            stride: 1024,
            offset: 4096,
        };
        assert_eq!(meta.plane_size(256).unwrap(), 4096 + 1024 * 256);
    }
}
