// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! renderer: one full-screen quad, drawn once.

use std::mem::size_of_val;

/// Clip-space corners of the quad, wound for a triangle strip.
pub const QUAD_VERTICES: [[f32; 3]; 4] = [
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
];

/// Texture coordinates matching `QUAD_VERTICES` corner for corner.
pub const QUAD_UV_COORDS: [[f32; 2]; 4] = [
    [0.0, 0.0],
    [1.0, 0.0],
    [0.0, 1.0],
    [1.0, 1.0],
];

/// Byte size of the vertex block, which is also the UV block's offset inside
/// the shared buffer.
pub fn uv_byte_offset() -> usize {
    size_of_val(&QUAD_VERTICES)
}

pub fn geometry_byte_size() -> usize {
    size_of_val(&QUAD_VERTICES) + size_of_val(&QUAD_UV_COORDS)
}

#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use gpu::QuadRenderer;

#[cfg(all(feature = "egl", feature = "minigbm"))]
mod gpu {
    use std::ptr::null;

    use crate::dmatex_utils::DmatexError;
    use crate::dmatex_utils::DmatexResult;
    use crate::egl::context::GpuContext;
    use crate::egl::image::ExternalTexture;
    use crate::gles::bindings::*;
    use crate::gles::program::Program;

    use super::geometry_byte_size;
    use super::uv_byte_offset;
    use super::QUAD_UV_COORDS;
    use super::QUAD_VERTICES;

    /// Owns the vertex buffer the quad is drawn from.
    pub struct QuadRenderer {
        vbo: GLuint,
    }

    impl Drop for QuadRenderer {
        fn drop(&mut self) {
            // Safe because the buffer was generated on the still-current
            // context.
            unsafe {
                glDeleteBuffers(1, &self.vbo);
            }
        }
    }

    impl QuadRenderer {
        /// Uploads the quad geometry into one buffer, vertices first and UV
        /// coordinates behind them, and wires up the program's attributes.
        pub fn new(_ctx: &GpuContext, program: &Program) -> DmatexResult<QuadRenderer> {
            let mut vbo: GLuint = 0;
            // Safe because _ctx proves a current context and every pointer
            // handed to the driver outlives its call.
            unsafe {
                glGenBuffers(1, &mut vbo);
                glBindBuffer(GL_ARRAY_BUFFER, vbo);
                glBufferData(
                    GL_ARRAY_BUFFER,
                    geometry_byte_size() as GLsizeiptr,
                    null(),
                    GL_STATIC_DRAW,
                );
                glBufferSubData(
                    GL_ARRAY_BUFFER,
                    0,
                    uv_byte_offset() as GLsizeiptr,
                    QUAD_VERTICES.as_ptr() as *const GLvoid,
                );
                glBufferSubData(
                    GL_ARRAY_BUFFER,
                    uv_byte_offset() as GLintptr,
                    (geometry_byte_size() - uv_byte_offset()) as GLsizeiptr,
                    QUAD_UV_COORDS.as_ptr() as *const GLvoid,
                );

                glEnableVertexAttribArray(program.pos_attrib());
                glVertexAttribPointer(program.pos_attrib(), 3, GL_FLOAT, 0, 0, null());
                glEnableVertexAttribArray(program.uv_attrib());
                glVertexAttribPointer(
                    program.uv_attrib(),
                    2,
                    GL_FLOAT,
                    0,
                    0,
                    uv_byte_offset() as *const GLvoid,
                );

                let code = glGetError();
                if code != GL_NO_ERROR {
                    glDeleteBuffers(1, &vbo);
                    return Err(DmatexError::GlError {
                        op: "quad geometry upload",
                        code,
                    });
                }
            }
            Ok(QuadRenderer { vbo })
        }

        /// Draws the textured quad across a `width` x `height` viewport.
        pub fn draw(
            &self,
            _ctx: &GpuContext,
            program: &Program,
            texture: &ExternalTexture,
            width: u32,
            height: u32,
        ) -> DmatexResult<()> {
            // Safe because _ctx proves a current context and every object
            // touched here is still alive.
            unsafe {
                glViewport(0, 0, width as GLsizei, height as GLsizei);
                glClearColor(0.0, 0.0, 0.0, 1.0);
                glClear(GL_COLOR_BUFFER_BIT | GL_DEPTH_BUFFER_BIT);

                glUseProgram(program.id());
                glActiveTexture(GL_TEXTURE0);
                glBindTexture(GL_TEXTURE_EXTERNAL_OES, texture.id());
                glUniform1i(program.sampler(), 0);

                glBindBuffer(GL_ARRAY_BUFFER, self.vbo);
                glDrawArrays(GL_TRIANGLE_STRIP, 0, 4);

                let code = glGetError();
                if code != GL_NO_ERROR {
                    return Err(DmatexError::GlError {
                        op: "quad draw",
                        code,
                    });
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_layout() {
        assert_eq!(uv_byte_offset(), 4 * 3 * 4);
        assert_eq!(geometry_byte_size(), 4 * 3 * 4 + 4 * 2 * 4);
    }

    #[test]
    fn corners_line_up() {
        // Each UV coordinate must name the same corner as its vertex, or the
        // render flips the image.
        for (v, uv) in QUAD_VERTICES.iter().zip(QUAD_UV_COORDS.iter()) {
            assert_eq!(v[0] > 0.0, uv[0] > 0.5);
            assert_eq!(v[1] > 0.0, uv[1] > 0.5);
        }
    }
}
