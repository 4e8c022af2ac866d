// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! image: turns DMA-buf descriptors into EGL images and back.  Import binds
//! CPU-allocated memory to the GPU as an external texture source; export
//! hands the GPU image's backing storage back out as a mappable descriptor.

use crate::dmatex_os::RawDescriptor;
use crate::egl::bindings::*;
use crate::format::DrmFormat;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::ffi::CString;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::mem::transmute;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::os::raw::c_int;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::os::raw::c_void;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use std::ptr::null_mut;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use log::debug;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dma_heap::DmaBufHandle;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_os::FromRawDescriptor;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_os::SafeDescriptor;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_utils::DmatexError;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_utils::DmatexResult;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_utils::ImageImportErrorKind;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::context::GpuContext;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::format::StorageMetadata;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::gles::bindings as gles;

/// Single-plane import description: the descriptor plus the linear layout the
/// driver should interpret it with.  The descriptor is borrowed; the caller's
/// allocation stays alive for as long as the image does.
#[derive(Debug)]
pub struct ImportDesc {
    pub fd: RawDescriptor,
    pub width: u32,
    pub height: u32,
    pub format: DrmFormat,
    pub stride_bytes: u32,
    pub offset: u32,
}

impl ImportDesc {
    /// The attribute list for a plane-0-only dma-buf import.  Preservation is
    /// requested so the CPU-filled contents survive the bind.
    pub fn attrib_list(&self) -> [EGLint; 16] {
        [
            EGL_IMAGE_PRESERVED_KHR,
            EGL_TRUE as EGLint,
            EGL_WIDTH,
            self.width as EGLint,
            EGL_HEIGHT,
            self.height as EGLint,
            EGL_LINUX_DRM_FOURCC_EXT,
            self.format.0 as EGLint,
            EGL_DMA_BUF_PLANE0_FD_EXT,
            self.fd as EGLint,
            EGL_DMA_BUF_PLANE0_OFFSET_EXT,
            self.offset as EGLint,
            EGL_DMA_BUF_PLANE0_PITCH_EXT,
            self.stride_bytes as EGLint,
            EGL_NONE,
            EGL_NONE,
        ]
    }
}

/// The extension entry points image import and export run through, resolved
/// once per context.
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub struct ImageExtensions {
    create_image: PFNEGLCREATEIMAGEKHRPROC,
    destroy_image: PFNEGLDESTROYIMAGEKHRPROC,
    image_target_texture_2d: PFNGLEGLIMAGETARGETTEXTURE2DOESPROC,
    export_query: PFNEGLEXPORTDMABUFIMAGEQUERYMESAPROC,
    export: PFNEGLEXPORTDMABUFIMAGEMESAPROC,
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
fn required_proc(name: &'static str) -> DmatexResult<*const c_void> {
    let c_name = CString::new(name)?;
    // Safe because the name is a valid nul-terminated string.
    let proc_addr = unsafe { eglGetProcAddress(c_name.as_ptr()) };
    if proc_addr.is_null() {
        return Err(DmatexError::UnsupportedExtension(name));
    }
    Ok(proc_addr)
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
impl ImageExtensions {
    /// Checks the display's extension string and resolves the import/export
    /// entry points.  Each missing piece is reported by name rather than as a
    /// downstream null-pointer failure.
    pub fn load(ctx: &GpuContext) -> DmatexResult<ImageExtensions> {
        let advertised = ctx.extensions();
        if !advertised.contains("EGL_KHR_image_base") && !advertised.contains("EGL_KHR_image") {
            return Err(DmatexError::UnsupportedExtension("EGL_KHR_image_base"));
        }
        if !advertised.contains("EGL_EXT_image_dma_buf_import") {
            return Err(DmatexError::UnsupportedExtension("EGL_EXT_image_dma_buf_import"));
        }
        if !advertised.contains("EGL_MESA_image_dma_buf_export") {
            return Err(DmatexError::UnsupportedExtension("EGL_MESA_image_dma_buf_export"));
        }

        // Safe because each pointer was resolved non-null above and is cast
        // to the signature the extension specifies for it.
        unsafe {
            Ok(ImageExtensions {
                create_image: transmute(required_proc("eglCreateImageKHR")?),
                destroy_image: transmute(required_proc("eglDestroyImageKHR")?),
                image_target_texture_2d: transmute(required_proc(
                    "glEGLImageTargetTexture2DOES",
                )?),
                export_query: transmute(required_proc("eglExportDMABUFImageQueryMESA")?),
                export: transmute(required_proc("eglExportDMABUFImageMESA")?),
            })
        }
    }
}

/// A GPU-exported dma-buf together with the layout the driver reported for
/// it.
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub struct ExportedDmaBuf {
    pub handle: DmaBufHandle,
    pub metadata: StorageMetadata,
}

/// An EGLImage created from a dma-buf.  Destroying the image does not free
/// the underlying memory; the importing descriptor's owner does that.
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub struct DmaBufImage {
    raw: EGLImageKHR,
    display: EGLDisplay,
    destroy: PFNEGLDESTROYIMAGEKHRPROC,
    width: u32,
    height: u32,
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
impl Drop for DmaBufImage {
    fn drop(&mut self) {
        // Safe because the image was created on this display and is only
        // destroyed once.
        unsafe {
            (self.destroy)(self.display, self.raw);
        }
    }
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
impl DmaBufImage {
    /// Imports `desc` as an EGLImage on the context's display.
    pub fn import(
        ctx: &GpuContext,
        ext: &ImageExtensions,
        desc: &ImportDesc,
    ) -> DmatexResult<DmaBufImage> {
        let attribs = desc.attrib_list();

        // Safe because the display is initialized and the attribute list is
        // EGL_NONE terminated.
        let raw = unsafe {
            (ext.create_image)(
                ctx.display(),
                EGL_NO_CONTEXT,
                EGL_LINUX_DMA_BUF_EXT,
                null_mut(),
                attribs.as_ptr(),
            )
        };
        if raw == EGL_NO_IMAGE_KHR {
            let code = unsafe { eglGetError() };
            return Err(DmatexError::ImageImportFailed(ImageImportErrorKind::from_raw(code)));
        }

        debug!(
            "imported {}x{} {:?} dma-buf as EGLImage",
            desc.width, desc.height, desc.format
        );
        Ok(DmaBufImage {
            raw,
            display: ctx.display(),
            destroy: ext.destroy_image,
            width: desc.width,
            height: desc.height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Asks the driver how the image's backing storage is really laid out.
    /// The stride and offset stay zero until an export fills them in.
    pub fn query_storage(&self, ext: &ImageExtensions) -> DmatexResult<StorageMetadata> {
        let mut fourcc: c_int = 0;
        let mut num_planes: c_int = 0;
        let mut modifier: EGLuint64KHR = 0;

        // Safe because the image is alive and the out-pointers are valid.
        let queried = unsafe {
            (ext.export_query)(
                self.display,
                self.raw,
                &mut fourcc,
                &mut num_planes,
                &mut modifier,
            )
        };
        if queried == EGL_FALSE {
            return Err(DmatexError::ExportFailed("eglExportDMABUFImageQueryMESA"));
        }

        Ok(StorageMetadata {
            format: DrmFormat(fourcc as u32),
            num_planes: num_planes as usize,
            modifier,
            stride: 0,
            offset: 0,
        })
    }

    /// Exports the image's backing storage as a new dma-buf descriptor.  The
    /// descriptor refers to the same memory the image renders from, so a
    /// mapping of it observes GPU writes once the context has finished.
    pub fn export(&self, ext: &ImageExtensions) -> DmatexResult<ExportedDmaBuf> {
        let mut metadata = self.query_storage(ext)?;
        metadata.validate(self.width)?;
        debug!("exporting image with reported layout {:?}", metadata);

        let mut fd: c_int = -1;
        let mut stride: EGLint = 0;
        let mut offset: EGLint = 0;

        // Safe because a single plane was just confirmed, so one slot per
        // out-array suffices.
        let exported = unsafe {
            (ext.export)(self.display, self.raw, &mut fd, &mut stride, &mut offset)
        };
        if exported == EGL_FALSE || fd < 0 {
            return Err(DmatexError::ExportFailed("eglExportDMABUFImageMESA"));
        }

        // Own the descriptor before anything else can fail.
        let fd = unsafe { SafeDescriptor::from_raw_descriptor(fd) };

        metadata.stride = stride as u32;
        metadata.offset = offset as u32;
        metadata.validate(self.width)?;

        let size = metadata.plane_size(self.height)?;
        Ok(ExportedDmaBuf {
            handle: DmaBufHandle::from_parts(fd, size, "dmatex-export"),
            metadata,
        })
    }
}

/// A GLES texture bound to the external-image target.
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub struct ExternalTexture {
    id: gles::GLuint,
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
impl Drop for ExternalTexture {
    fn drop(&mut self) {
        // Safe because the id was generated on the still-current context.
        unsafe {
            gles::glDeleteTextures(1, &self.id);
        }
    }
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
impl ExternalTexture {
    /// Generates a texture on the external target with linear filtering.
    pub fn new(_ctx: &GpuContext) -> DmatexResult<ExternalTexture> {
        let mut id: gles::GLuint = 0;
        // Safe because _ctx proves a current context.
        unsafe {
            gles::glGenTextures(1, &mut id);
            gles::glBindTexture(gles::GL_TEXTURE_EXTERNAL_OES, id);
            gles::glTexParameteri(
                gles::GL_TEXTURE_EXTERNAL_OES,
                gles::GL_TEXTURE_MIN_FILTER,
                gles::GL_LINEAR,
            );
            gles::glTexParameteri(
                gles::GL_TEXTURE_EXTERNAL_OES,
                gles::GL_TEXTURE_MAG_FILTER,
                gles::GL_LINEAR,
            );

            let code = gles::glGetError();
            if code != gles::GL_NO_ERROR {
                gles::glDeleteTextures(1, &id);
                return Err(DmatexError::GlError {
                    op: "external texture setup",
                    code,
                });
            }
        }
        Ok(ExternalTexture { id })
    }

    pub fn id(&self) -> gles::GLuint {
        self.id
    }

    /// Points the texture at `image`'s storage.  The texture must be bound
    /// before the image is attached, which this method enforces by doing
    /// both itself.
    pub fn attach_image(
        &self,
        _ctx: &GpuContext,
        ext: &ImageExtensions,
        image: &DmaBufImage,
    ) -> DmatexResult<()> {
        // Safe because _ctx proves a current context and image is alive.
        unsafe {
            gles::glBindTexture(gles::GL_TEXTURE_EXTERNAL_OES, self.id);
            (ext.image_target_texture_2d)(gles::GL_TEXTURE_EXTERNAL_OES, image.raw);

            let code = gles::glGetError();
            if code != gles::GL_NO_ERROR {
                return Err(DmatexError::GlError {
                    op: "glEGLImageTargetTexture2DOES",
                    code,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attrib_list_shape() {
        let desc = ImportDesc {
            fd: 42,
            width: 256,
            height: 128,
            format: DrmFormat::new(b'A', b'R', b'2', b'4'),
            stride_bytes: 1024,
            offset: 0,
        };
        let attribs = desc.attrib_list();

        assert_eq!(attribs.len(), 16);
        assert_eq!(attribs[0], EGL_IMAGE_PRESERVED_KHR);
        assert_eq!(attribs[1], EGL_TRUE as EGLint);
        assert_eq!(attribs[2], EGL_WIDTH);
        assert_eq!(attribs[3], 256);
        assert_eq!(attribs[4], EGL_HEIGHT);
        assert_eq!(attribs[5], 128);
        assert_eq!(attribs[6], EGL_LINUX_DRM_FOURCC_EXT);
        assert_eq!(attribs[7] as u32, u32::from(desc.format));
        assert_eq!(attribs[8], EGL_DMA_BUF_PLANE0_FD_EXT);
        assert_eq!(attribs[9], 42);
        assert_eq!(attribs[10], EGL_DMA_BUF_PLANE0_OFFSET_EXT);
        assert_eq!(attribs[11], 0);
        assert_eq!(attribs[12], EGL_DMA_BUF_PLANE0_PITCH_EXT);
        assert_eq!(attribs[13], 1024);
        assert_eq!(attribs[14], EGL_NONE);
        assert_eq!(attribs[15], EGL_NONE);
    }
}
