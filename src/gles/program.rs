// Copyright 2025 The dmatex Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! program: compiles and links the sampling shader pair that copies the
//! external texture across the quad.

/// Pass-through vertex stage.  The quad's positions already are clip-space
/// coordinates.
pub const VERTEX_SHADER: &str = "#version 300 es

in vec3 position;
in vec2 tx_coords;
out vec2 v_tx_coords;

void main() {
    v_tx_coords = tx_coords;
    gl_Position = vec4(position, 1.0);
}
";

/// Samples the imported dma-buf through the external-image target, which is
/// the only target drivers guarantee for imported images.
pub const FRAGMENT_SHADER: &str = "#version 300 es
#extension GL_OES_EGL_image_external_essl3 : require

precision mediump float;

uniform samplerExternalOES tx_sampler;
in vec2 v_tx_coords;
out vec4 frag_color;

void main() {
    frag_color = texture(tx_sampler, v_tx_coords);
}
";

#[cfg(all(feature = "egl", feature = "minigbm"))]
pub use gpu::Program;

#[cfg(all(feature = "egl", feature = "minigbm"))]
mod gpu {
    use std::os::raw::c_char;

    use crate::dmatex_utils::DmatexError;
    use crate::dmatex_utils::DmatexResult;
    use crate::egl::context::GpuContext;
    use crate::gles::bindings::*;

    use super::FRAGMENT_SHADER;
    use super::VERTEX_SHADER;

    /// A linked shader program with its attribute and sampler locations
    /// resolved.
    pub struct Program {
        id: GLuint,
        pos_attrib: GLuint,
        uv_attrib: GLuint,
        sampler: GLint,
    }

    impl Drop for Program {
        fn drop(&mut self) {
            // Safe because the program was linked on the still-current
            // context.
            unsafe {
                glDeleteProgram(self.id);
            }
        }
    }

    fn info_log(
        id: GLuint,
        get_iv: unsafe extern "C" fn(GLuint, GLenum, *mut GLint),
        get_log: unsafe extern "C" fn(GLuint, GLsizei, *mut GLsizei, *mut GLchar),
    ) -> String {
        let mut log_len: GLint = 0;
        // Safe because id is a live shader or program object.
        unsafe {
            get_iv(id, GL_INFO_LOG_LENGTH, &mut log_len);
        }
        if log_len <= 0 {
            return String::new();
        }

        let mut buf: Vec<u8> = vec![0; log_len as usize];
        let mut written: GLsizei = 0;
        // Safe because buf holds log_len bytes including the terminator.
        unsafe {
            get_log(id, log_len, &mut written, buf.as_mut_ptr() as *mut GLchar);
        }
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn compile_stage(stage: &'static str, kind: GLenum, source: &str) -> DmatexResult<GLuint> {
        // Safe because the source pointer and explicit length stay valid for
        // the duration of the call.
        unsafe {
            let shader = glCreateShader(kind);
            let ptr = source.as_ptr() as *const GLchar;
            let len = source.len() as GLint;
            glShaderSource(shader, 1, &ptr, &len);
            glCompileShader(shader);

            let mut status: GLint = 0;
            glGetShaderiv(shader, GL_COMPILE_STATUS, &mut status);
            if status == 0 {
                let log = info_log(shader, glGetShaderiv, glGetShaderInfoLog);
                glDeleteShader(shader);
                return Err(DmatexError::CompileFailed { stage, log });
            }
            Ok(shader)
        }
    }

    fn attrib_location(program: GLuint, name: &'static [u8]) -> DmatexResult<GLuint> {
        // Safe because name is a nul-terminated byte literal.
        let loc = unsafe { glGetAttribLocation(program, name.as_ptr() as *const c_char) };
        if loc < 0 {
            return Err(DmatexError::LinkFailed {
                log: format!(
                    "attribute {} missing from linked program",
                    String::from_utf8_lossy(&name[..name.len() - 1])
                ),
            });
        }
        Ok(loc as GLuint)
    }

    impl Program {
        /// Compiles the default shader pair and links it.
        pub fn new(ctx: &GpuContext) -> DmatexResult<Program> {
            Program::with_sources(ctx, VERTEX_SHADER, FRAGMENT_SHADER)
        }

        pub fn with_sources(
            _ctx: &GpuContext,
            vertex: &str,
            fragment: &str,
        ) -> DmatexResult<Program> {
            let vertex_shader = compile_stage("vertex", GL_VERTEX_SHADER, vertex)?;
            let fragment_shader = compile_stage("fragment", GL_FRAGMENT_SHADER, fragment);
            let fragment_shader = match fragment_shader {
                Ok(s) => s,
                Err(e) => {
                    // Safe because vertex_shader was just created.
                    unsafe {
                        glDeleteShader(vertex_shader);
                    }
                    return Err(e);
                }
            };

            // Safe because both shaders compiled and the program object is
            // checked before use.  The shaders are flagged for deletion
            // immediately; the driver keeps them alive while attached.
            unsafe {
                let id = glCreateProgram();
                glAttachShader(id, vertex_shader);
                glAttachShader(id, fragment_shader);
                glLinkProgram(id);
                glDeleteShader(vertex_shader);
                glDeleteShader(fragment_shader);

                let mut status: GLint = 0;
                glGetProgramiv(id, GL_LINK_STATUS, &mut status);
                if status == 0 {
                    let log = info_log(id, glGetProgramiv, glGetProgramInfoLog);
                    glDeleteProgram(id);
                    return Err(DmatexError::LinkFailed { log });
                }

                let pos_attrib = match attrib_location(id, b"position\0") {
                    Ok(loc) => loc,
                    Err(e) => {
                        glDeleteProgram(id);
                        return Err(e);
                    }
                };
                let uv_attrib = match attrib_location(id, b"tx_coords\0") {
                    Ok(loc) => loc,
                    Err(e) => {
                        glDeleteProgram(id);
                        return Err(e);
                    }
                };
                let sampler =
                    glGetUniformLocation(id, b"tx_sampler\0".as_ptr() as *const c_char);

                Ok(Program {
                    id,
                    pos_attrib,
                    uv_attrib,
                    sampler,
                })
            }
        }

        pub fn id(&self) -> GLuint {
            self.id
        }

        pub fn pos_attrib(&self) -> GLuint {
            self.pos_attrib
        }

        pub fn uv_attrib(&self) -> GLuint {
            self.uv_attrib
        }

        pub fn sampler(&self) -> GLint {
            self.sampler
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_sources_agree_on_varyings() {
        // The stages are compiled separately, so the interface between them
        // is only checked here and at link time.
        assert!(VERTEX_SHADER.contains("out vec2 v_tx_coords"));
        assert!(FRAGMENT_SHADER.contains("in vec2 v_tx_coords"));
        assert!(FRAGMENT_SHADER.contains("samplerExternalOES"));
    }

    #[cfg(all(feature = "egl", feature = "minigbm"))]
    #[test]
    fn bad_shader_reports_stage() {
        use crate::egl::context::GpuContext;
        use crate::egl::context::GpuContextOptions;
        use crate::dmatex_utils::DmatexError;

        let ctx = match GpuContext::new(&GpuContextOptions::default()) {
            Ok(ctx) => ctx,
            Err(_) => return,
        };

        match Program::with_sources(&ctx, "not a shader", FRAGMENT_SHADER) {
            Err(DmatexError::CompileFailed { stage: "vertex", .. }) => (),
            _ => panic!("garbage vertex source compiled"),
        }

        Program::new(&ctx).unwrap();
    }
}
