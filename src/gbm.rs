// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! gbm: wraps a render node in a GBM device, the native platform handle that
//! headless EGL displays are created from.
//!
//! External code found at <https://gitlab.freedesktop.org/mesa/mesa/-/tree/main/src/gbm>.

#![cfg(feature = "minigbm")]

use std::ffi::CStr;
use std::fs::File;
use std::io::Error;
use std::os::raw::c_char;
use std::path::Path;

use log::debug;

use crate::dmatex_os::AsRawDescriptor;
use crate::dmatex_utils::DmatexError;
use crate::dmatex_utils::DmatexResult;
use crate::gbm_bindings::*;
use crate::rendernode;

/// An open GBM device on top of an owned render node descriptor.
pub struct GbmDevice {
    _fd: File,
    gbm: *mut gbm_device,
    backend_name: &'static str,
}

impl Drop for GbmDevice {
    fn drop(&mut self) {
        // Safe because GbmDevice is only constructed with a valid gbm_device,
        // and _fd outlives the destroy call.
        unsafe {
            gbm_device_destroy(self.gbm);
        }
    }
}

impl GbmDevice {
    /// Opens a GBM device on the first usable render node, or on the node at
    /// `render_node` when one is configured.  Software rasterizers backing
    /// vgem and pvr nodes are skipped during the scan.
    pub fn open(render_node: Option<&Path>) -> DmatexResult<GbmDevice> {
        let undesired: &[&str] = &["vgem", "pvr"];
        let fd = match render_node {
            Some(path) => rendernode::open_at(path)?,
            None => rendernode::open_device(undesired)?,
        };

        // gbm_create_device is safe to call with a valid fd, and we check
        // that a valid one is returned.  If the fd does not refer to a DRM
        // device, gbm_create_device will reject it.
        let gbm = unsafe { gbm_create_device(fd.as_raw_descriptor()) };
        if gbm.is_null() {
            return Err(DmatexError::IoError(Error::last_os_error()));
        }

        // Safe because a valid gbm device has a statically allocated string
        // associated with it, which is valid for the lifetime of the process.
        let name: *const c_char = unsafe { gbm_device_get_backend_name(gbm) };
        let c_str: &CStr = unsafe { CStr::from_ptr(name) };
        let backend_name: &'static str = c_str.to_str()?;

        debug!("gbm device created with backend {}", backend_name);
        Ok(GbmDevice {
            _fd: fd,
            gbm,
            backend_name,
        })
    }

    pub fn backend_name(&self) -> &str {
        self.backend_name
    }

    /// The raw device pointer, for handing to eglGetPlatformDisplay.
    pub fn as_mut_ptr(&self) -> *mut gbm_device {
        self.gbm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_backend() {
        // Needs a GPU and libgbm; machines without them take the error path.
        let device = match GbmDevice::open(None) {
            Ok(d) => d,
            Err(_) => return,
        };
        assert!(!device.backend_name().is_empty());
        assert!(!device.as_mut_ptr().is_null());
    }
}
