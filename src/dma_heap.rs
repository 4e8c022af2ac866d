// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! dma_heap: CPU-side allocation of shareable DMA-buf memory through the
//! kernel's /dev/dma_heap interface.

use std::ffi::CString;
use std::fs::File;
use std::fs::OpenOptions;
use std::mem::size_of;
use std::os::raw::c_char;
use std::path::Path;
use std::path::PathBuf;

use log::debug;
use nix::ioctl_readwrite;
use nix::ioctl_write_ptr_bad;
use nix::request_code_write;

use crate::dmatex_os::round_up_to_page_size;
use crate::dmatex_os::AsRawDescriptor;
use crate::dmatex_os::FromRawDescriptor;
use crate::dmatex_os::MemoryMapping;
use crate::dmatex_os::RawDescriptor;
use crate::dmatex_os::SafeDescriptor;
use crate::dmatex_utils::DmatexError;
use crate::dmatex_utils::DmatexResult;
use crate::dmatex_utils::DMATEX_MAP_ACCESS_READ;
use crate::dmatex_utils::DMATEX_MAP_ACCESS_RW;

/// The CMA heap exposed on systems with a contiguous-memory carveout.  GPUs
/// behind an IOMMU accept buffers from the system heap as well, but CMA is
/// what scanout-capable devices want.
pub const DEFAULT_DMA_HEAP_PATH: &str = "/dev/dma_heap/linux,cma";

const DMA_HEAP_IOC_MAGIC: u8 = b'H';
const DMA_HEAP_IOC_ALLOC: u8 = 0x00;

const DMA_BUF_IOC_MAGIC: u8 = b'b';
const DMA_BUF_IOC_SET_NAME: u8 = 0x01;

// Consistent with struct dma_heap_allocation_data in
// include/uapi/linux/dma-heap.h.
#[repr(C)]
#[derive(Copy, Clone, Default)]
#[allow(non_camel_case_types)]
pub struct dma_heap_allocation_data {
    len: u64,
    fd: u32,
    fd_flags: u32,
    heap_flags: u64,
}

ioctl_readwrite!(
    dma_heap_alloc,
    DMA_HEAP_IOC_MAGIC,
    DMA_HEAP_IOC_ALLOC,
    dma_heap_allocation_data
);

// DMA_BUF_SET_NAME is declared _IOW with a pointer-sized payload even though
// the kernel reads a string through it, so the helper macros can't derive the
// argument type.
ioctl_write_ptr_bad!(
    dma_buf_set_name,
    request_code_write!(
        DMA_BUF_IOC_MAGIC,
        DMA_BUF_IOC_SET_NAME,
        size_of::<*const c_char>()
    ),
    c_char
);

/// An owned DMA-buf descriptor plus the byte length and debug tag it was
/// created with.
pub struct DmaBufHandle {
    fd: SafeDescriptor,
    size: usize,
    tag: String,
}

impl DmaBufHandle {
    /// Wraps a descriptor obtained elsewhere, such as a GPU export.
    pub fn from_parts(fd: SafeDescriptor, size: usize, tag: &str) -> DmaBufHandle {
        DmaBufHandle {
            fd,
            size,
            tag: tag.to_owned(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Maps the buffer read-only, for inspecting GPU-written contents.
    pub fn map_readable(&self) -> DmatexResult<MemoryMapping> {
        MemoryMapping::from_descriptor(&self.fd, self.size, DMATEX_MAP_ACCESS_READ)
    }

    /// Maps the buffer read-write, for filling it before the GPU sees it.
    pub fn map_writable(&self) -> DmatexResult<MemoryMapping> {
        MemoryMapping::from_descriptor(&self.fd, self.size, DMATEX_MAP_ACCESS_RW)
    }
}

impl AsRawDescriptor for DmaBufHandle {
    fn as_raw_descriptor(&self) -> RawDescriptor {
        self.fd.as_raw_descriptor()
    }
}

/// An open handle to a kernel DMA heap, from which buffers are allocated.
pub struct DmaHeapAllocator {
    heap: File,
}

impl DmaHeapAllocator {
    /// Opens the heap device at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DmatexResult<DmaHeapAllocator> {
        let heap = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(|e| DmatexError::HeapUnavailable {
                path: PathBuf::from(path.as_ref()),
                source: e,
            })?;

        Ok(DmaHeapAllocator { heap })
    }

    /// Allocates at least `size` bytes from the heap.  The kernel works in
    /// whole pages, so the returned handle's length is `size` rounded up to
    /// the page boundary.  `tag` becomes the buffer's name in debugfs.
    pub fn allocate(&self, size: usize, tag: &str) -> DmatexResult<DmaBufHandle> {
        let rounded = round_up_to_page_size(size)?;

        let mut data = dma_heap_allocation_data {
            len: rounded as u64,
            fd_flags: (libc::O_RDWR | libc::O_CLOEXEC) as u32,
            ..Default::default()
        };

        // Safe because the heap descriptor is open and the kernel only writes
        // into the passed struct.
        unsafe {
            dma_heap_alloc(self.heap.as_raw_descriptor(), &mut data).map_err(|e| {
                DmatexError::AllocationFailed {
                    size: rounded,
                    source: e,
                }
            })?;
        }

        // Take ownership immediately so the descriptor is closed if naming
        // fails below.
        let fd = unsafe { SafeDescriptor::from_raw_descriptor(data.fd as RawDescriptor) };

        let name = CString::new(tag)?;
        // Safe because fd is an open dma-buf and name outlives the call.
        unsafe {
            dma_buf_set_name(fd.as_raw_descriptor(), name.as_ptr()).map_err(|e| {
                DmatexError::NamingFailed {
                    tag: tag.to_owned(),
                    source: e,
                }
            })?;
        }

        debug!("allocated {} byte dma-buf \"{}\"", rounded, tag);
        Ok(DmaBufHandle {
            fd,
            size: rounded,
            tag: tag.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_heap_reports_path() {
        match DmaHeapAllocator::open("/dev/dma_heap/no-such-heap") {
            Err(DmatexError::HeapUnavailable { path, .. }) => {
                assert_eq!(path, PathBuf::from("/dev/dma_heap/no-such-heap"));
            }
            _ => panic!("open of a bogus heap path succeeded"),
        }
    }

    #[test]
    fn allocate_and_fill() {
        let allocator = match DmaHeapAllocator::open(DEFAULT_DMA_HEAP_PATH) {
            Ok(a) => a,
            // No CMA heap on this machine.
            Err(_) => return,
        };

        let handle = allocator.allocate(1000, "dmatex-test").unwrap();
        assert!(handle.size() >= 1000);
        assert_eq!(handle.size() % 4096, 0);
        assert_eq!(handle.tag(), "dmatex-test");

        let mapping = handle.map_writable().unwrap();
        mapping.write_from(0, &[0xa5u8; 1000]).unwrap();
        drop(mapping);

        let mapping = handle.map_readable().unwrap();
        assert_eq!(mapping.read_to_vec(0, 4).unwrap(), vec![0xa5u8; 4]);
    }

    #[test]
    fn embedded_nul_in_tag_rejected() {
        let allocator = match DmaHeapAllocator::open(DEFAULT_DMA_HEAP_PATH) {
            Ok(a) => a,
            Err(_) => return,
        };

        match allocator.allocate(4096, "bad\0tag") {
            Err(DmatexError::NulError(_)) => (),
            _ => panic!("tag with embedded nul accepted"),
        }
    }
}
