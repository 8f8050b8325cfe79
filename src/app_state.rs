use std::sync::Arc;

use glam::Vec2;
use instant::Instant;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::color::Color;
use crate::field::pacing::FramePacer;
use crate::field::params::FieldParams;
use crate::field::{LinkSegment, ParticleField};
use crate::models::{LinkVertex, NodeInstance, QuadVertex};
use crate::viewport::{SizePolicy, Viewport, ViewportUniform};

const LINES_WGSL: &str = include_str!("./shaders/lines.wgsl");
const CIRCLES_WGSL: &str = include_str!("./shaders/circles.wgsl");

/// GPU state and simulation state for one renderer instance. The backdrop
/// and portrait instances each own one of these; they never communicate.
pub struct State {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub is_surface_configured: bool,

    pub viewport: Viewport,
    pub viewport_buffer: wgpu::Buffer,
    pub viewport_bind_group: wgpu::BindGroup,
    pub viewport_uniform: ViewportUniform,
    pub viewport_needs_update: bool,

    pub line_render_pipeline: wgpu::RenderPipeline,
    pub circle_render_pipeline: wgpu::RenderPipeline,

    pub node_instances: Vec<NodeInstance>,
    pub node_instance_buffer: wgpu::Buffer,
    pub quad_vertex_buffer: wgpu::Buffer,
    pub quad_index_buffer: wgpu::Buffer,

    pub link_vertices: Vec<LinkVertex>,
    pub link_vertex_buffer: wgpu::Buffer,
    link_scratch: Vec<LinkSegment>,

    pub field: ParticleField,
    pub pacer: FramePacer,
    /// Pointer position in logical px; written by the event shell, read by
    /// the update pass. The last handled event wins for the next frame.
    pub pointer: Option<Vec2>,

    pub last_fps_instant: Instant,
    pub frame_count_in_second: u32,
    pub current_fps: u32,
}

impl State {
    // Takes Arc<Window> for surface setup, doesn't store it.
    pub async fn new(
        window_arc: Arc<Window>,
        params: FieldParams,
        policy: SizePolicy,
        initial_box: Vec2,
    ) -> anyhow::Result<State> {
        let scale_factor = window_arc.scale_factor();

        let gpu = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::BROWSER_WEBGPU,
            ..Default::default()
        });

        // Surface itself is !Send on WASM due to HtmlCanvasElement
        let surface = gpu.create_surface(window_arc)?;

        let adapter = gpu
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let texture_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or_else(|| {
                log::warn!(
                    "No sRGB surface format found, falling back to {:?}",
                    surface_caps.formats[0]
                );
                surface_caps.formats[0]
            });

        let needs_shader_srgb_output_conversion = !texture_format.is_srgb();

        log::info!(
            "Using {} ({:?}, Target Format: {:?}), Needs Shader sRGB Output Conversion: {}",
            adapter_info.name,
            adapter_info.backend,
            texture_format,
            needs_shader_srgb_output_conversion
        );

        let mut viewport = Viewport::new(policy, scale_factor);
        viewport.resize_to_box(initial_box);
        let (backing_width, backing_height) = viewport.backing_size();

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: texture_format,
            width: backing_width,
            height: backing_height,
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        // Node count is resolved from the starting viewport and stays fixed
        // for the instance's lifetime.
        let field = ParticleField::generate(params, viewport.area(), &mut rand::thread_rng());
        log::info!("Field starts with {} nodes.", field.len());

        let viewport_uniform = ViewportUniform {
            view_proj: viewport.build_projection().to_cols_array_2d(),
            needs_srgb_output_conversion: needs_shader_srgb_output_conversion as u32,
            _padding: [0; 3],
        };

        let viewport_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Viewport Buffer"),
            contents: bytemuck::cast_slice(&[viewport_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let viewport_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some("Viewport Bind Group Layout"),
            });

        let viewport_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &viewport_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: viewport_buffer.as_entire_binding(),
            }],
            label: Some("Viewport Bind Group"),
        });

        let lines_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lines Shader"),
            source: wgpu::ShaderSource::Wgsl(LINES_WGSL.into()),
        });

        let circles_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Circles Shader"),
            source: wgpu::ShaderSource::Wgsl(CIRCLES_WGSL.into()),
        });

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&viewport_bind_group_layout],
                push_constant_ranges: &[],
            });

        let line_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Line Render Pipeline"),
                layout: Some(&render_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &lines_shader_module,
                    entry_point: Some("vs_main"),
                    buffers: &[LinkVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &lines_shader_module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::LineList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        let circle_render_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Circle Render Pipeline"),
                layout: Some(&render_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &circles_shader_module,
                    entry_point: Some("vs_main"),
                    buffers: &[QuadVertex::layout(), NodeInstance::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &circles_shader_module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    // The y-flipping projection reverses the quad's winding,
                    // so back-face culling would drop every instance.
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
                cache: None,
            });

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::QUAD_VERTICES.as_slice()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Index Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::QUAD_INDICES.as_slice()),
            usage: wgpu::BufferUsages::INDEX,
        });

        let node_instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Instance Buffer"),
            size: (field.len().max(1) * std::mem::size_of::<NodeInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Sized for the worst case: every unordered pair linked.
        let max_link_vertices = field.len().max(1) * (field.len().max(1) - 1).max(1);
        let link_vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Link Vertex Buffer"),
            size: (max_link_vertices * std::mem::size_of::<LinkVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            surface,
            device,
            queue,
            config,
            is_surface_configured: true,
            viewport,
            viewport_buffer,
            viewport_bind_group,
            viewport_uniform,
            viewport_needs_update: false,
            line_render_pipeline,
            circle_render_pipeline,
            node_instances: Vec::with_capacity(field.len()),
            node_instance_buffer,
            quad_vertex_buffer,
            quad_index_buffer,
            link_vertices: Vec::new(),
            link_vertex_buffer,
            link_scratch: Vec::new(),
            field,
            pacer: FramePacer::target_60hz(),
            pointer: None,
            last_fps_instant: Instant::now(),
            frame_count_in_second: 0,
            current_fps: 0,
        })
    }

    /// Resize against a freshly measured box (window client box, or the
    /// portrait parent box). Normalized node state is untouched; only the
    /// pixel mapping and backing resolution change, effective before the
    /// next frame's clear.
    pub fn resize(&mut self, box_size: Vec2) {
        self.viewport.resize_to_box(box_size);
        let (width, height) = self.viewport.backing_size();
        log::info!(
            "Resize: logical {:?}, backing {}x{}",
            self.viewport.logical_size(),
            width,
            height
        );
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.viewport_needs_update = true;
        self.is_surface_configured = true;
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.viewport.set_scale_factor(scale_factor);
        let (width, height) = self.viewport.backing_size();
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.viewport_needs_update = true;
    }

    /// Re-apply the current configuration (surface lost).
    pub fn reconfigure_surface(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// One animation frame. Returns false when the frame arrives under the
    /// pacing interval and is skipped whole: no state mutation, no draw.
    pub fn update(&mut self, now: Instant) -> bool {
        if !self.pacer.should_step(now) {
            return false;
        }

        if self.viewport_needs_update {
            self.viewport_uniform.view_proj = self.viewport.build_projection().to_cols_array_2d();
            self.queue.write_buffer(
                &self.viewport_buffer,
                0,
                bytemuck::cast_slice(&[self.viewport_uniform]),
            );
            self.viewport_needs_update = false;
        }

        let logical_size = self.viewport.logical_size();
        self.field.step(logical_size, self.pointer);
        self.rebuild_geometry(logical_size);
        self.upload_geometry();
        true
    }

    // Scale the normalized field out to logical px and bake the palette in.
    fn rebuild_geometry(&mut self, logical_size: Vec2) {
        let params = *self.field.params();
        let link_color = Color::from(params.palette.link);
        let node_color = Color::from(params.palette.node)
            .with_alpha(params.node_alpha)
            .into_linear_rgba();

        self.field.links(logical_size, &mut self.link_scratch);
        self.link_vertices.clear();
        for segment in &self.link_scratch {
            let color = link_color.with_alpha(segment.alpha).into_linear_rgba();
            self.link_vertices.push(LinkVertex {
                position: segment.a.into(),
                color,
            });
            self.link_vertices.push(LinkVertex {
                position: segment.b.into(),
                color,
            });
        }

        self.node_instances.clear();
        for node in self.field.nodes() {
            self.node_instances.push(NodeInstance {
                position: (node.pos * logical_size).into(),
                radius: params.node_radius,
                color: node_color,
            });
        }
    }

    fn upload_geometry(&mut self) {
        let node_data = bytemuck::cast_slice(&self.node_instances);
        let link_data = bytemuck::cast_slice(&self.link_vertices);

        if self.node_instance_buffer.size() < node_data.len() as u64 {
            self.node_instance_buffer =
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Node Instance Buffer (Resized)"),
                        contents: node_data,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
        } else if !node_data.is_empty() {
            self.queue.write_buffer(&self.node_instance_buffer, 0, node_data);
        }

        if self.link_vertex_buffer.size() < link_data.len() as u64 {
            self.link_vertex_buffer =
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Link Vertex Buffer (Resized)"),
                        contents: link_data,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
        } else if !link_data.is_empty() {
            self.queue.write_buffer(&self.link_vertex_buffer, 0, link_data);
        }
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        self.frame_count_in_second += 1;
        let now = Instant::now();
        if (now - self.last_fps_instant).as_secs_f32() >= 1.0 {
            self.current_fps = self.frame_count_in_second;
            self.frame_count_in_second = 0;
            self.last_fps_instant = now;
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let clear_color =
                Color::from(self.field.params().palette.background).into_linear_wgpu_color();
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.viewport_bind_group, &[]);

            render_pass.set_pipeline(&self.line_render_pipeline);
            render_pass.set_vertex_buffer(0, self.link_vertex_buffer.slice(..));
            render_pass.draw(0..self.link_vertices.len() as u32, 0..1);

            render_pass.set_pipeline(&self.circle_render_pipeline);
            render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
            render_pass.set_vertex_buffer(1, self.node_instance_buffer.slice(..));
            render_pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(
                0..QuadVertex::QUAD_INDICES.len() as u32,
                0,
                0..self.node_instances.len() as u32,
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
