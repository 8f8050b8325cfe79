// src/models.rs
use bytemuck::{Pod, Zeroable};

// --- Unit quad vertex (instanced into node dots) ---
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    pub const QUAD_VERTICES: [Self; 4] = [
        QuadVertex { position: [-0.5, -0.5] }, // 0: Bottom-left
        QuadVertex { position: [0.5, -0.5] },  // 1: Bottom-right
        QuadVertex { position: [0.5, 0.5] },   // 2: Top-right
        QuadVertex { position: [-0.5, 0.5] },  // 3: Top-left
    ];

    pub const QUAD_INDICES: [u16; 6] = [
        0, 1, 2, // First triangle: BL, BR, TR
        0, 2, 3, // Second triangle: BL, TR, TL
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0, // location 0 for base quad position
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

// --- Instance data for node dots ---
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct NodeInstance {
    pub position: [f32; 2], // node center, logical px
    pub radius: f32,        // logical px
    pub color: [f32; 4],    // RGBA, linear space
}

impl NodeInstance {
    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 1, // location 1 for instance position
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 2, // location 2 for instance radius
                    format: wgpu::VertexFormat::Float32,
                },
                wgpu::VertexAttribute {
                    offset: (mem::size_of::<[f32; 2]>() + mem::size_of::<f32>())
                        as wgpu::BufferAddress,
                    shader_location: 3, // location 3 for instance color
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

// --- Vertex data for link lines ---
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LinkVertex {
    pub position: [f32; 2], // endpoint, logical px
    pub color: [f32; 4],    // RGBA, linear space; alpha carries the link fade
}

impl LinkVertex {
    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0, // location 0 for line vertex position
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1, // location 1 for line vertex color
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}
