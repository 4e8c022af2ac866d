// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A crate for zero-copy interchange of pixel buffers between the CPU and the
//! GPU on Linux: DMA-heap allocation, headless EGL/GLES bring-up, DMA-buf
//! image import as an external texture, a single offscreen render pass, and
//! re-export of the GPU image as an independently mappable DMA-buf.

#[macro_use]
mod macros;

mod bmp;
mod dma_heap;
mod dmatex_os;
mod dmatex_utils;
mod egl;
mod format;
mod gbm;
mod gbm_bindings;
mod gles;
mod pipeline;
mod rendernode;

pub use crate::bmp::BmpImage;
pub use crate::dma_heap::DmaBufHandle;
pub use crate::dma_heap::DmaHeapAllocator;
pub use crate::dma_heap::DEFAULT_DMA_HEAP_PATH;
pub use crate::dmatex_os::AsRawDescriptor;
pub use crate::dmatex_os::FromRawDescriptor;
pub use crate::dmatex_os::IntoRawDescriptor;
pub use crate::dmatex_os::MemoryMapping;
pub use crate::dmatex_os::RawDescriptor;
pub use crate::dmatex_os::SafeDescriptor;
pub use crate::dmatex_utils::*;
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use crate::egl::context::GpuContext;
pub use crate::egl::context::GpuContextOptions;
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use crate::egl::image::DmaBufImage;
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use crate::egl::image::ExportedDmaBuf;
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use crate::egl::image::ExternalTexture;
pub use crate::egl::image::ImportDesc;
pub use crate::format::DrmFormat;
pub use crate::format::StorageMetadata;
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use crate::gles::program::Program;
pub use crate::gles::program::FRAGMENT_SHADER;
pub use crate::gles::program::VERTEX_SHADER;
pub use crate::gles::renderer::geometry_byte_size;
pub use crate::gles::renderer::uv_byte_offset;
pub use crate::gles::renderer::QUAD_UV_COORDS;
pub use crate::gles::renderer::QUAD_VERTICES;
#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use crate::gles::renderer::QuadRenderer;
pub use crate::pipeline::Pipeline;
pub use crate::pipeline::PipelineBuilder;
pub use crate::pipeline::PipelineOutput;
