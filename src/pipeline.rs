// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! pipeline: the whole trip in one call.  CPU memory from a DMA heap is
//! filled, imported into a headless GPU context, drawn across a quad once,
//! exported back out and read from the CPU again.

use std::path::Path;
use std::path::PathBuf;

use crate::dma_heap::DEFAULT_DMA_HEAP_PATH;
use crate::dmatex_utils::DmatexError;
use crate::dmatex_utils::DmatexResult;
use crate::format::DrmFormat;
use crate::format::StorageMetadata;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use log::info;

#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dma_heap::DmaHeapAllocator;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::dmatex_os::AsRawDescriptor;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::context::GpuContext;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::context::GpuContextOptions;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::image::DmaBufImage;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::image::ExternalTexture;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::image::ImageExtensions;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::egl::image::ImportDesc;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::gles::program::Program;
#[cfg(all(feature = "egl", feature = "minigbm"))]
use crate::gles::renderer::QuadRenderer;

/// Configures a [`Pipeline`].  Width, height and format are mandatory; the
/// rest defaults to the CMA heap, an auto-detected render node, a tight
/// stride and a GLES 3.1 context.
pub struct PipelineBuilder {
    width: u32,
    height: u32,
    format: DrmFormat,
    stride: Option<u32>,
    heap_path: PathBuf,
    render_node: Option<PathBuf>,
    tag: String,
    context_version: (i32, i32),
}

impl PipelineBuilder {
    pub fn new(width: u32, height: u32, format: DrmFormat) -> PipelineBuilder {
        PipelineBuilder {
            width,
            height,
            format,
            stride: None,
            heap_path: PathBuf::from(DEFAULT_DMA_HEAP_PATH),
            render_node: None,
            tag: "dmatex".to_owned(),
            context_version: (3, 1),
        }
    }

    /// Row pitch in bytes of the buffer handed to the GPU.
    pub fn stride(mut self, stride: u32) -> PipelineBuilder {
        self.stride = Some(stride);
        self
    }

    pub fn heap_path<P: AsRef<Path>>(mut self, path: P) -> PipelineBuilder {
        self.heap_path = PathBuf::from(path.as_ref());
        self
    }

    pub fn render_node<P: AsRef<Path>>(mut self, path: P) -> PipelineBuilder {
        self.render_node = Some(PathBuf::from(path.as_ref()));
        self
    }

    /// Debug name stamped on the allocated dma-buf.
    pub fn tag(mut self, tag: &str) -> PipelineBuilder {
        self.tag = tag.to_owned();
        self
    }

    pub fn context_version(mut self, major: i32, minor: i32) -> PipelineBuilder {
        self.context_version = (major, minor);
        self
    }

    /// Validates the configuration.  Everything that can be rejected without
    /// hardware is rejected here, before any device is touched.
    pub fn build(self) -> DmatexResult<Pipeline> {
        if self.width == 0 || self.height == 0 {
            return Err(DmatexError::InvalidLayout("zero width or height"));
        }

        let num_planes = self.format.num_planes()?;
        if num_planes != 1 {
            return Err(DmatexError::PlaneCountMismatch(num_planes));
        }

        let min = self.format.min_stride(self.width)?;
        let stride = self.stride.unwrap_or(min);
        if stride < min {
            return Err(DmatexError::InvalidStride { stride, min });
        }

        Ok(Pipeline {
            width: self.width,
            height: self.height,
            format: self.format,
            stride,
            heap_path: self.heap_path,
            render_node: self.render_node,
            tag: self.tag,
            context_version: self.context_version,
        })
    }
}

/// The result of a pipeline run: the exported image's contents and the
/// layout the driver reported for them.
pub struct PipelineOutput {
    pub bytes: Vec<u8>,
    pub metadata: StorageMetadata,
}

/// A validated pipeline configuration, ready to run.
pub struct Pipeline {
    width: u32,
    height: u32,
    format: DrmFormat,
    stride: u32,
    heap_path: PathBuf,
    render_node: Option<PathBuf>,
    tag: String,
    context_version: (i32, i32),
}

impl Pipeline {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> DrmFormat {
        self.format
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Runs the full trip.  `pixels` holds tightly packed rows in the
    /// configured format; rows are spread out to the configured stride while
    /// filling the allocation.
    ///
    /// Teardown happens in reverse acquisition order as the locals drop: the
    /// image is destroyed while its context is still alive, the context after
    /// every GL object, the input allocation last.
    #[cfg(all(feature = "egl", feature = "minigbm"))]
    pub fn run(&self, pixels: &[u8]) -> DmatexResult<PipelineOutput> {
        let row_bytes = self.format.min_stride(self.width)? as usize;
        let packed_size = self.format.image_size(self.width, self.height)?;
        if pixels.len() < packed_size {
            return Err(DmatexError::InvalidLayout("input pixels too short"));
        }

        let allocator = DmaHeapAllocator::open(&self.heap_path)?;
        let buffer_size = self.stride as usize * self.height as usize;
        let in_handle = allocator.allocate(buffer_size, &self.tag)?;

        let in_map = in_handle.map_writable()?;
        for row in 0..self.height as usize {
            let src = &pixels[row * row_bytes..(row + 1) * row_bytes];
            in_map.write_from(row * self.stride as usize, src)?;
        }

        let opts = GpuContextOptions {
            render_node: self.render_node.clone(),
            context_version: self.context_version,
        };
        let ctx = GpuContext::new(&opts)?;
        let ext = ImageExtensions::load(&ctx)?;

        let desc = ImportDesc {
            fd: in_handle.as_raw_descriptor(),
            width: self.width,
            height: self.height,
            format: self.format,
            stride_bytes: self.stride,
            offset: 0,
        };
        let image = DmaBufImage::import(&ctx, &ext, &desc)?;

        let texture = ExternalTexture::new(&ctx)?;
        texture.attach_image(&ctx, &ext, &image)?;

        let program = Program::new(&ctx)?;
        let renderer = QuadRenderer::new(&ctx, &program)?;
        renderer.draw(&ctx, &program, &texture, self.width, self.height)?;

        // The CPU must not look at the exported memory before the GPU is
        // done writing it.
        ctx.finish();

        let exported = image.export(&ext)?;
        info!(
            "pipeline rendered {}x{} {:?}, exported layout {:?}",
            self.width, self.height, self.format, exported.metadata
        );

        let out_map = exported.handle.map_readable()?;
        let bytes = out_map.read_to_vec(0, exported.handle.size())?;

        Ok(PipelineOutput {
            bytes,
            metadata: exported.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DrmFormat;

    fn argb() -> DrmFormat {
        DrmFormat::new(b'A', b'R', b'2', b'4')
    }

    #[test]
    fn builder_defaults() {
        let pipeline = PipelineBuilder::new(256, 256, argb()).build().unwrap();
        assert_eq!(pipeline.width(), 256);
        assert_eq!(pipeline.stride(), 256 * 4);
    }

    #[test]
    fn builder_rejects_zero_dimensions() {
        assert!(PipelineBuilder::new(0, 256, argb()).build().is_err());
        assert!(PipelineBuilder::new(256, 0, argb()).build().is_err());
    }

    #[test]
    fn builder_rejects_multi_planar() {
        let nv12 = DrmFormat::new(b'N', b'V', b'1', b'2');
        match PipelineBuilder::new(256, 256, nv12).build() {
            Err(DmatexError::PlaneCountMismatch(2)) => (),
            _ => panic!("multi-planar format accepted"),
        }
    }

    #[test]
    fn builder_rejects_undersized_stride() {
        match PipelineBuilder::new(256, 256, argb()).stride(512).build() {
            Err(DmatexError::InvalidStride { stride: 512, min: 1024 }) => (),
            _ => panic!("undersized stride accepted"),
        }

        // Oversized strides are how drivers pad rows, so they pass.
        PipelineBuilder::new(256, 256, argb())
            .stride(2048)
            .build()
            .unwrap();
    }

    #[cfg(all(feature = "egl", feature = "minigbm"))]
    #[test]
    fn full_trip_preserves_solid_color() {
        // Needs a CMA heap and a GPU; machines without take the error path.
        let pipeline = match PipelineBuilder::new(64, 64, argb())
            .tag("dmatex-test-trip")
            .build()
        {
            Ok(p) => p,
            Err(_) => return,
        };

        let pixels = vec![0x80u8; 64 * 64 * 4];
        let output = match pipeline.run(&pixels) {
            Ok(o) => o,
            Err(_) => return,
        };

        let offset = output.metadata.offset as usize;
        assert!(output.bytes.len() >= offset + 4);
        assert_eq!(&output.bytes[offset..offset + 4], &[0x80u8; 4]);
    }
}
