//! Lens distortion meshes
//!
//! A native mesh is built the way the Cardboard SDK does it: a regular grid
//! over the eye texture, each vertex pushed through the inverse lens
//! distortion into screen space, stitched as one serpentine triangle strip.
//! It is then converted into the renderer's triangle-list mesh with
//! per-vertex vignette.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Grid vertices per side
pub const MESH_RESOLUTION: u32 = 40;

const INVERSE_TOLERANCE: f32 = 1e-4;
const INVERSE_MAX_STEPS: usize = 32;

/// Radial polynomial lens model: r' = r * (1 + k1 r^2 + k2 r^4 + ...)
#[derive(Clone, Debug, PartialEq)]
pub struct PolynomialRadialDistortion {
    coefficients: Vec<f32>,
}

impl PolynomialRadialDistortion {
    pub fn new(coefficients: &[f32]) -> Self {
        Self {
            coefficients: coefficients.to_vec(),
        }
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Scale factor for a squared radius
    pub fn distortion_factor(&self, r_squared: f32) -> f32 {
        let mut r_factor = 1.0;
        let mut result = 1.0;
        for k in &self.coefficients {
            r_factor *= r_squared;
            result += k * r_factor;
        }
        result
    }

    pub fn distort_radius(&self, r: f32) -> f32 {
        r * self.distortion_factor(r * r)
    }

    pub fn distort(&self, p: Vec2) -> Vec2 {
        p * self.distortion_factor(p.length_squared())
    }

    /// Radius that distorts to `r`, by secant iteration.
    pub fn distort_inverse_radius(&self, r: f32) -> f32 {
        let mut r0 = 0.0_f32;
        let mut r1 = 1.0_f32;
        let mut dr0 = r - self.distort_radius(r0);
        let mut dr1 = r - self.distort_radius(r1);
        for _ in 0..INVERSE_MAX_STEPS {
            if (r1 - r0).abs() <= INVERSE_TOLERANCE || dr1 == dr0 {
                break;
            }
            let r2 = r1 - dr1 * ((r1 - r0) / (dr1 - dr0));
            r0 = r1;
            r1 = r2;
            dr0 = dr1;
            dr1 = r - self.distort_radius(r1);
        }
        r1
    }

    pub fn distort_inverse(&self, p: Vec2) -> Vec2 {
        let r = p.length();
        if r > 0.0 {
            p * (self.distort_inverse_radius(r) / r)
        } else {
            p
        }
    }
}

/// One eye's placement, in tan-angle units at the lens
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyeMeshGeometry {
    /// Eye viewport size on the screen
    pub screen_width: f32,
    pub screen_height: f32,
    /// Lens center measured from the viewport's bottom-left corner
    pub x_eye_offset_screen: f32,
    pub y_eye_offset_screen: f32,
    /// Rendered eye texture extent (from the field of view)
    pub texture_width: f32,
    pub texture_height: f32,
    /// Lens center measured from the texture's bottom-left corner
    pub x_eye_offset_texture: f32,
    pub y_eye_offset_texture: f32,
}

/// Mesh as the lens SDK produces it: NDC positions, texture UVs, strip indices
#[derive(Clone, Debug, PartialEq)]
pub struct NativeMesh {
    pub vertices: Vec<Vec2>,
    pub uvs: Vec<Vec2>,
    pub strip_indices: Vec<u32>,
}

impl NativeMesh {
    pub fn generate(distortion: &PolynomialRadialDistortion, geometry: &EyeMeshGeometry) -> Self {
        let res = MESH_RESOLUTION;
        let vertex_count = (res * res) as usize;
        let mut vertices = Vec::with_capacity(vertex_count);
        let mut uvs = Vec::with_capacity(vertex_count);

        for row in 0..res {
            for col in 0..res {
                let uv = Vec2::new(
                    col as f32 / (res - 1) as f32,
                    row as f32 / (res - 1) as f32,
                );
                let texture = Vec2::new(
                    uv.x * geometry.texture_width - geometry.x_eye_offset_texture,
                    uv.y * geometry.texture_height - geometry.y_eye_offset_texture,
                );
                // Undo the lens: find where on the screen this tan-angle must be drawn
                let screen = distortion.distort_inverse(texture)
                    + Vec2::new(geometry.x_eye_offset_screen, geometry.y_eye_offset_screen);
                let normalized = Vec2::new(
                    screen.x / geometry.screen_width,
                    screen.y / geometry.screen_height,
                );
                vertices.push(normalized * 2.0 - Vec2::ONE);
                uvs.push(uv);
            }
        }

        Self {
            vertices,
            uvs,
            strip_indices: serpentine_strip(res),
        }
    }
}

/// Strip indices over a `res` x `res` grid, alternating direction per row and
/// repeating the last index between rows.
fn serpentine_strip(res: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity(((res - 1) * 2 * res + res.saturating_sub(2)) as usize);
    let mut vertex_offset = 0_i64;
    let res_i = res as i64;
    for row in 0..res - 1 {
        if row > 0 {
            if let Some(&last) = indices.last() {
                indices.push(last);
            }
        }
        for col in 0..res {
            if col > 0 {
                if row % 2 == 0 {
                    vertex_offset += 1;
                } else {
                    vertex_offset -= 1;
                }
            }
            indices.push(vertex_offset as u32);
            indices.push((vertex_offset + res_i) as u32);
        }
        vertex_offset += res_i;
    }
    indices
}

/// Expand a triangle strip into a triangle list: (i, i+1, i+2) for every i.
///
/// N strip indices give 3 * (N - 2) list indices; fewer than 3 give none.
pub fn strip_to_list(strip: &[u32]) -> Vec<u32> {
    strip
        .windows(3)
        .flat_map(|tri| tri.iter().copied())
        .collect()
}

/// Smooth edge falloff over normalized UV
pub fn vignette_factor(uv: Vec2, hardness: f32) -> f32 {
    (uv.x * hardness).clamp(0.0, 1.0)
        * ((1.0 - uv.x) * hardness).clamp(0.0, 1.0)
        * (uv.y * hardness).clamp(0.0, 1.0)
        * ((1.0 - uv.y) * hardness).clamp(0.0, 1.0)
}

/// Vignette configuration for mesh conversion
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vignette {
    pub enabled: bool,
    pub hardness: f32,
}

impl Default for Vignette {
    fn default() -> Self {
        Self {
            enabled: true,
            hardness: 25.0,
        }
    }
}

// Distortion vertex as uploaded to the GPU
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DistortionVertex {
    pub position: [f32; 2],
    pub tex_r: [f32; 2],
    pub tex_g: [f32; 2],
    pub tex_b: [f32; 2],
    pub vignette_factor: f32,
    pub timewarp_factor: f32, // unused, always 0
}

/// Per-eye distortion mesh in renderer layout (triangle list)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DistortionMesh {
    pub vertices: Vec<DistortionVertex>,
    pub indices: Vec<u32>,
}

impl DistortionMesh {
    pub fn from_native(native: &NativeMesh, vignette: Vignette) -> Self {
        let vertices = native
            .vertices
            .iter()
            .zip(&native.uvs)
            .map(|(position, uv)| {
                let tex = uv.to_array();
                DistortionVertex {
                    // Renderer Y runs the other way
                    position: [position.x, -position.y],
                    tex_r: tex,
                    tex_g: tex,
                    tex_b: tex,
                    vignette_factor: if vignette.enabled {
                        vignette_factor(*uv, vignette.hardness)
                    } else {
                        1.0
                    },
                    timewarp_factor: 0.0,
                }
            })
            .collect();

        Self {
            vertices,
            indices: strip_to_list(&native.strip_indices),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}
