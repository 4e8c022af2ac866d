// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! context: headless EGL/GLES context bring-up on top of a GBM platform
//! display, with no window system attached.

use std::path::PathBuf;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::ffi::CStr;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::os::raw::c_void;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::ptr::null;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::ptr::null_mut;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use log::debug;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_utils::DmatexError;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_utils::DmatexResult;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::bindings::*;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::gbm::GbmDevice;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::gles::bindings as gles;

/// Knobs for context creation.  The defaults open the first usable render
/// node and ask for a GLES 3.1 context.
#[derive(Clone, Debug)]
pub struct GpuContextOptions {
    pub render_node: Option<PathBuf>,
    pub context_version: (i32, i32),
}

impl Default for GpuContextOptions {
    fn default() -> GpuContextOptions {
        GpuContextOptions {
            render_node: None,
            context_version: (3, 1),
        }
    }
}

/// A current, surfaceless GLES context.  Handing a borrow of this to the
/// image and renderer types is what proves the context is alive and current
/// when they issue GL and EGL calls.
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub struct GpuContext {
    display: EGLDisplay,
    context: EGLContext,
    extensions: String,
    _gbm: GbmDevice,
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
impl Drop for GpuContext {
    fn drop(&mut self) {
        // Safe because display and context were created together and neither
        // has been released yet.  The GBM device is dropped after terminate.
        unsafe {
            eglMakeCurrent(self.display, EGL_NO_SURFACE, EGL_NO_SURFACE, EGL_NO_CONTEXT);
            eglDestroyContext(self.display, self.context);
            eglTerminate(self.display);
        }
    }
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
impl GpuContext {
    /// Brings up a display on a GBM device, picks a GLES2-renderable config,
    /// creates a context of the requested version and makes it current with
    /// no surfaces.
    pub fn new(opts: &GpuContextOptions) -> DmatexResult<GpuContext> {
        let gbm = GbmDevice::open(opts.render_node.as_deref())?;

        // Safe because the GBM device pointer is valid and the attribute
        // list is unused for the GBM platform.
        let display = unsafe {
            eglGetPlatformDisplay(EGL_PLATFORM_GBM_KHR, gbm.as_mut_ptr() as *mut c_void, null())
        };
        if display == EGL_NO_DISPLAY {
            return Err(DmatexError::ContextInitFailed("eglGetPlatformDisplay"));
        }

        let mut major: EGLint = 0;
        let mut minor: EGLint = 0;
        if unsafe { eglInitialize(display, &mut major, &mut minor) } == EGL_FALSE {
            return Err(DmatexError::ContextInitFailed("eglInitialize"));
        }

        // The display is initialized from here on, so failures below must
        // terminate it before returning.
        match Self::init_on_display(display, opts) {
            Ok((context, extensions)) => {
                debug!("EGL {}.{} context up, extensions: {}", major, minor, extensions);
                Ok(GpuContext {
                    display,
                    context,
                    extensions,
                    _gbm: gbm,
                })
            }
            Err(e) => {
                unsafe {
                    eglTerminate(display);
                }
                Err(e)
            }
        }
    }

    fn init_on_display(
        display: EGLDisplay,
        opts: &GpuContextOptions,
    ) -> DmatexResult<(EGLContext, String)> {
        if unsafe { eglBindAPI(EGL_OPENGL_ES_API) } == EGL_FALSE {
            return Err(DmatexError::ContextInitFailed("eglBindAPI"));
        }

        let config_attribs: [EGLint; 5] = [
            EGL_RENDERABLE_TYPE,
            EGL_OPENGL_ES2_BIT,
            EGL_CONFORMANT,
            EGL_OPENGL_ES2_BIT,
            EGL_NONE,
        ];

        let mut config: EGLConfig = null_mut();
        let mut num_configs: EGLint = 0;
        let chose = unsafe {
            eglChooseConfig(
                display,
                config_attribs.as_ptr(),
                &mut config,
                1,
                &mut num_configs,
            )
        };
        if chose == EGL_FALSE || num_configs < 1 {
            return Err(DmatexError::ContextInitFailed("eglChooseConfig"));
        }

        let (major, minor) = opts.context_version;
        let context_attribs: [EGLint; 5] = [
            EGL_CONTEXT_MAJOR_VERSION,
            major,
            EGL_CONTEXT_MINOR_VERSION,
            minor,
            EGL_NONE,
        ];

        let context = unsafe {
            eglCreateContext(display, config, EGL_NO_CONTEXT, context_attribs.as_ptr())
        };
        if context == EGL_NO_CONTEXT {
            return Err(DmatexError::ContextInitFailed("eglCreateContext"));
        }

        let current =
            unsafe { eglMakeCurrent(display, EGL_NO_SURFACE, EGL_NO_SURFACE, context) };
        if current == EGL_FALSE {
            unsafe {
                eglDestroyContext(display, context);
            }
            return Err(DmatexError::ContextInitFailed("eglMakeCurrent"));
        }

        // Safe because an initialized display always has an extension string.
        let extensions = unsafe {
            let raw = eglQueryString(display, EGL_EXTENSIONS);
            if raw.is_null() {
                String::new()
            } else {
                CStr::from_ptr(raw).to_string_lossy().into_owned()
            }
        };

        Ok((context, extensions))
    }

    pub fn display(&self) -> EGLDisplay {
        self.display
    }

    /// The display's extension string, for capability checks.
    pub fn extensions(&self) -> &str {
        &self.extensions
    }

    /// Blocks until every command issued on this context has completed.  Must
    /// run before CPU reads of memory the GPU rendered into.
    pub fn finish(&self) {
        // Safe because self proves the context is current.
        unsafe {
            gles::glFinish();
        }
    }
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaceless_context_comes_up() {
        // Needs a GPU with GBM and EGL; machines without take the error path.
        let ctx = match GpuContext::new(&GpuContextOptions::default()) {
            Ok(ctx) => ctx,
            Err(_) => return,
        };
        assert!(!ctx.extensions().is_empty());
        ctx.finish();
    }

    #[test]
    fn bogus_render_node_fails_cleanly() {
        let opts = GpuContextOptions {
            render_node: Some(PathBuf::from("/dev/dri/renderD999")),
            ..Default::default()
        };
        assert!(GpuContext::new(&opts).is_err());
    }
}
