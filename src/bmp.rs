// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! bmp: loads uncompressed 24-bit bitmaps as tightly packed top-down RGB,
//! the form the import path feeds straight into a dma-buf.

use std::path::Path;

use zerocopy::FromBytes;
use zerocopy::Unaligned;

use crate::dmatex_utils::DmatexError;
use crate::dmatex_utils::DmatexResult;

const BMP_MAGIC: u16 = 0x4d42; // "BM"
const BI_RGB: u32 = 0;

#[repr(C, packed)]
#[derive(Copy, Clone, FromBytes, Unaligned)]
struct BmpFileHeader {
    magic: u16,
    file_size: u32,
    reserved1: u16,
    reserved2: u16,
    data_offset: u32,
}

#[repr(C, packed)]
#[derive(Copy, Clone, FromBytes, Unaligned)]
struct BmpInfoHeader {
    header_size: u32,
    width: i32,
    height: i32,
    planes: u16,
    bit_count: u16,
    compression: u32,
    image_size: u32,
    x_pels_per_meter: i32,
    y_pels_per_meter: i32,
    colors_used: u32,
    colors_important: u32,
}

/// A decoded bitmap, rows top-down, three RGB bytes per pixel with no row
/// padding.
pub struct BmpImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl BmpImage {
    pub fn load<P: AsRef<Path>>(path: P) -> DmatexResult<BmpImage> {
        let bytes = std::fs::read(path)?;
        BmpImage::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> DmatexResult<BmpImage> {
        let file_header = BmpFileHeader::read_from_prefix(bytes)
            .ok_or(DmatexError::InvalidBitmap("truncated file header"))?;
        if u16::from_le(file_header.magic) != BMP_MAGIC {
            return Err(DmatexError::InvalidBitmap("missing BM magic"));
        }

        let header_bytes = bytes
            .get(std::mem::size_of::<BmpFileHeader>()..)
            .ok_or(DmatexError::InvalidBitmap("truncated info header"))?;
        let info = BmpInfoHeader::read_from_prefix(header_bytes)
            .ok_or(DmatexError::InvalidBitmap("truncated info header"))?;

        if u16::from_le(info.planes) != 1 {
            return Err(DmatexError::InvalidBitmap("plane count is not 1"));
        }
        if u16::from_le(info.bit_count) != 24 {
            return Err(DmatexError::InvalidBitmap("only 24-bit bitmaps supported"));
        }
        if u32::from_le(info.compression) != BI_RGB {
            return Err(DmatexError::InvalidBitmap("compressed bitmaps unsupported"));
        }

        let width = i32::from_le(info.width);
        let height = i32::from_le(info.height);
        if width <= 0 || height == 0 {
            return Err(DmatexError::InvalidBitmap("degenerate dimensions"));
        }
        // Positive heights are stored bottom-up, negative top-down.
        let top_down = height < 0;
        let width = width as u32;
        let height = height.unsigned_abs();

        // Rows in the file are padded out to four bytes.
        let row_bytes = width as usize * 3;
        let file_stride = (row_bytes + 3) & !3;
        let data_offset = u32::from_le(file_header.data_offset) as usize;
        let needed = file_stride * height as usize;
        let pixels = bytes
            .get(data_offset..)
            .filter(|p| p.len() >= needed)
            .ok_or(DmatexError::InvalidBitmap("truncated pixel data"))?;

        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let src_row = if top_down {
                row
            } else {
                height as usize - 1 - row
            };
            let src = &pixels[src_row * file_stride..src_row * file_stride + row_bytes];
            for bgr in src.chunks_exact(3) {
                data.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
            }
        }

        Ok(BmpImage {
            width,
            height,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    // A 2x2 bottom-up 24-bit bitmap with one distinct color per corner.
    fn two_by_two() -> Vec<u8> {
        let mut buf = Vec::new();
        put_u16(&mut buf, BMP_MAGIC);
        put_u32(&mut buf, 54 + 16);
        put_u16(&mut buf, 0);
        put_u16(&mut buf, 0);
        put_u32(&mut buf, 54);

        put_u32(&mut buf, 40);
        put_u32(&mut buf, 2);
        put_u32(&mut buf, 2);
        put_u16(&mut buf, 1);
        put_u16(&mut buf, 24);
        put_u32(&mut buf, BI_RGB);
        put_u32(&mut buf, 16);
        put_u32(&mut buf, 0);
        put_u32(&mut buf, 0);
        put_u32(&mut buf, 0);
        put_u32(&mut buf, 0);

        // Bottom row: blue, green (BGR order, two bytes of row padding).
        buf.extend_from_slice(&[255, 0, 0, 0, 255, 0, 0, 0]);
        // Top row: red, white.
        buf.extend_from_slice(&[0, 0, 255, 255, 255, 255, 0, 0]);
        buf
    }

    #[test]
    fn decodes_bottom_up_bgr() {
        let image = BmpImage::from_bytes(&two_by_two()).unwrap();
        assert_eq!(image.width, 2);
        assert_eq!(image.height, 2);
        // Top-down RGB without padding: red, white, blue, green.
        assert_eq!(
            image.data,
            vec![255, 0, 0, 255, 255, 255, 0, 0, 255, 0, 255, 0]
        );
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = two_by_two();
        bytes[0] = b'X';
        match BmpImage::from_bytes(&bytes) {
            Err(DmatexError::InvalidBitmap("missing BM magic")) => (),
            _ => panic!("bad magic accepted"),
        }
    }

    #[test]
    fn rejects_truncated_pixels() {
        let mut bytes = two_by_two();
        bytes.truncate(60);
        match BmpImage::from_bytes(&bytes) {
            Err(DmatexError::InvalidBitmap("truncated pixel data")) => (),
            _ => panic!("truncated bitmap accepted"),
        }
    }

    #[test]
    fn rejects_other_depths() {
        let mut bytes = two_by_two();
        // bit_count lives at offset 14 + 14.
        bytes[28] = 32;
        assert!(BmpImage::from_bytes(&bytes).is_err());
    }
}
