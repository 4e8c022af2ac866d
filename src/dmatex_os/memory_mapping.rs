// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::num::NonZeroUsize;
use std::ptr::copy_nonoverlapping;

use libc::c_void;
use nix::sys::mman::mmap;
use nix::sys::mman::munmap;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;
use nix::unistd::sysconf;
use nix::unistd::SysconfVar;
use vmm_sys_util::align_upwards;

use crate::dmatex_os::descriptor::AsRawDescriptor;
use crate::dmatex_utils::DmatexError;
use crate::dmatex_utils::DmatexResult;

use crate::dmatex_utils::DMATEX_MAP_ACCESS_MASK;
use crate::dmatex_utils::DMATEX_MAP_ACCESS_READ;
use crate::dmatex_utils::DMATEX_MAP_ACCESS_RW;
use crate::dmatex_utils::DMATEX_MAP_ACCESS_WRITE;

/// Uses the system's page size in bytes to round the given value up to the
/// nearest page boundary.
pub fn round_up_to_page_size(size: usize) -> DmatexResult<usize> {
    let page_size_opt = sysconf(SysconfVar::PAGE_SIZE)?;
    if let Some(page_size) = page_size_opt {
        let aligned_size = align_upwards!(size, page_size as usize);
        Ok(aligned_size)
    } else {
        Err(DmatexError::InvalidLayout("no page size"))
    }
}

/// Wraps a shared mapping of a descriptor in the current process. Provides
/// RAII semantics including munmap when no longer needed.
#[derive(Debug)]
pub struct MemoryMapping {
    pub addr: *mut c_void,
    pub size: usize,
}

impl Drop for MemoryMapping {
    fn drop(&mut self) {
        // This is safe because we mmap the area at addr ourselves, and nobody
        // else is holding a reference to it.
        unsafe {
            munmap(self.addr as *mut libc::c_void, self.size).unwrap();
        }
    }
}

impl MemoryMapping {
    /// Maps `size` bytes of `descriptor` with MAP_SHARED, so writes land in
    /// the backing dma-buf rather than a private copy.  The descriptor stays
    /// owned by the caller and may be passed on to the GPU afterwards.
    pub fn from_descriptor(
        descriptor: &dyn AsRawDescriptor,
        size: usize,
        map_info: u32,
    ) -> DmatexResult<MemoryMapping> {
        let non_zero_opt = NonZeroUsize::new(size);
        let prot = match map_info & DMATEX_MAP_ACCESS_MASK {
            DMATEX_MAP_ACCESS_READ => ProtFlags::PROT_READ,
            DMATEX_MAP_ACCESS_WRITE => ProtFlags::PROT_WRITE,
            DMATEX_MAP_ACCESS_RW => ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            _ => return Err(DmatexError::InvalidLayout("incorrect access flags")),
        };

        if let Some(non_zero_size) = non_zero_opt {
            let addr = unsafe {
                mmap(
                    None,
                    non_zero_size,
                    prot,
                    MapFlags::MAP_SHARED,
                    descriptor.as_raw_descriptor(),
                    0,
                )?
            };
            Ok(MemoryMapping { addr, size })
        } else {
            Err(DmatexError::InvalidLayout("zero size mapping"))
        }
    }

    /// Copies `data` into the mapping starting at `offset`.
    pub fn write_from(&self, offset: usize, data: &[u8]) -> DmatexResult<()> {
        let len = data.len();
        let end = checked_arithmetic!(offset + len)?;
        checked_range!(end; <= self.size)?;

        // Safe because the range was checked against the mapping size above
        // and the source slice is valid for its own length.
        unsafe {
            copy_nonoverlapping(
                data.as_ptr(),
                (self.addr as *mut u8).add(offset),
                data.len(),
            );
        }
        Ok(())
    }

    /// Copies `len` bytes out of the mapping starting at `offset`.
    pub fn read_to_vec(&self, offset: usize, len: usize) -> DmatexResult<Vec<u8>> {
        let end = checked_arithmetic!(offset + len)?;
        checked_range!(end; <= self.size)?;

        let mut data = vec![0u8; len];
        // Safe because the range was checked against the mapping size above
        // and the destination was just allocated with capacity len.
        unsafe {
            copy_nonoverlapping(
                (self.addr as *const u8).add(offset),
                data.as_mut_ptr(),
                len,
            );
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::fs::OpenOptions;

    use super::*;
    use crate::dmatex_os::descriptor::SafeDescriptor;

    // Creates and immediately unlinks a scratch file so the kernel reclaims
    // it once the descriptor drops.
    fn scratch_file(name: &str, len: u64) -> File {
        let path = std::env::temp_dir().join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        std::fs::remove_file(&path).unwrap();
        file.set_len(len).unwrap();
        file
    }

    #[test]
    fn page_rounding() {
        let page = sysconf(SysconfVar::PAGE_SIZE).unwrap().unwrap() as usize;
        assert_eq!(round_up_to_page_size(1).unwrap(), page);
        assert_eq!(round_up_to_page_size(page).unwrap(), page);
        assert_eq!(round_up_to_page_size(page + 1).unwrap(), 2 * page);
    }

    #[test]
    fn shared_mapping_round_trip() {
        let desc = SafeDescriptor::from(scratch_file("dmatex-map-rt", 4096));
        let mapping =
            MemoryMapping::from_descriptor(&desc, 4096, DMATEX_MAP_ACCESS_RW).unwrap();
        mapping.write_from(128, &[7u8; 64]).unwrap();
        let back = mapping.read_to_vec(128, 64).unwrap();
        assert_eq!(back, vec![7u8; 64]);
    }

    #[test]
    fn mapping_bounds_enforced() {
        let desc = SafeDescriptor::from(scratch_file("dmatex-map-bounds", 4096));
        let mapping =
            MemoryMapping::from_descriptor(&desc, 4096, DMATEX_MAP_ACCESS_RW).unwrap();
        assert!(mapping.write_from(4090, &[0u8; 16]).is_err());
        assert!(mapping.read_to_vec(0, 8192).is_err());
    }
}
