//! GPU and window context.
//!
//! [`Context`] owns the render target, device and queue together with every
//! GPU resource the valley needs: camera and light uniforms, the shadow map,
//! the multisampled colour and depth buffers, the pipelines, the cached
//! meshes/materials and the instance buffer.

use std::{iter, sync::Arc};

use anyhow::Context as _;
use winit::window::Window;

use crate::{
    camera::CameraResources,
    data_structures::{
        model::{DrawModel, material_layout},
        scene_graph::Scene,
        texture::Texture,
    },
    landscape::Landscape,
    pipelines::{CullVariants, Pipelines, light::LightResources},
    render::{Batch, GpuCache, InstanceBuffer, collect_batches},
};

/// Samples per pixel of the main pass when the adapter supports it.
pub const MSAA_SAMPLES: u32 = 4;

/// Where finished frames go.
enum Target {
    Window {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
    },
    /// A texture that is read back with [`Context::read_pixels`].
    #[cfg(feature = "integration-tests")]
    Offscreen(wgpu::Texture),
}

pub struct Context {
    target: Target,
    pub(crate) depth_texture: Texture,
    msaa_view: Option<wgpu::TextureView>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub light: LightResources,
    pub material_layout: wgpu::BindGroupLayout,
    pub pipelines: Pipelines,
    cache: GpuCache,
    instances: InstanceBuffer,
    is_surface_configured: bool,
}

fn mk_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        #[cfg(not(target_arch = "wasm32"))]
        backends: wgpu::Backends::PRIMARY,
        #[cfg(target_arch = "wasm32")]
        backends: wgpu::Backends::GL,
        ..Default::default()
    })
}

async fn request_device(
    instance: &wgpu::Instance,
    compatible_surface: Option<&wgpu::Surface<'_>>,
) -> anyhow::Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface,
            force_fallback_adapter: false,
        })
        .await
        .context("No suitable GPU adapter found")?;
    let info = adapter.get_info();
    log::info!("Using {} ({:?})", info.name, info.backend);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            // WebGL doesn't support all of wgpu's features, so if
            // we're building for the web we'll have to disable some.
            required_limits: if cfg!(target_arch = "wasm32") {
                wgpu::Limits::downlevel_webgl2_defaults()
            } else {
                wgpu::Limits::default()
            },
            memory_hints: Default::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            trace: wgpu::Trace::Off,
        })
        .await
        .context("Failed to open the GPU device")?;
    Ok((adapter, device, queue))
}

/// [`MSAA_SAMPLES`] if both the colour format and the depth format can be
/// multisampled and resolved, otherwise 1.
fn pick_sample_count(adapter: &wgpu::Adapter, format: wgpu::TextureFormat) -> u32 {
    let color = adapter.get_texture_format_features(format).flags;
    let depth = adapter
        .get_texture_format_features(Texture::DEPTH_FORMAT)
        .flags;
    if color.sample_count_supported(MSAA_SAMPLES)
        && color.contains(wgpu::TextureFormatFeatureFlags::MULTISAMPLE_RESOLVE)
        && depth.sample_count_supported(MSAA_SAMPLES)
    {
        MSAA_SAMPLES
    } else {
        log::warn!("{format:?} can't be multisampled here, rendering without MSAA");
        1
    }
}

/// The multisampled colour buffer the main pass renders into before it is
/// resolved onto the target. `None` without MSAA.
fn create_msaa_view(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    sample_count: u32,
) -> Option<wgpu::TextureView> {
    if sample_count <= 1 {
        return None;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("msaa_colour"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format: config.format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    Some(texture.create_view(&wgpu::TextureViewDescriptor::default()))
}

#[cfg(feature = "integration-tests")]
fn create_offscreen_texture(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen_target"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: config.format,
        usage: config.usage,
        view_formats: &[],
    })
}

impl Context {
    pub async fn new(window: Arc<Window>, scene: &Scene) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = mk_instance();
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create a surface for the window")?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The shaders output linear colour and rely on an sRGB surface for the
        // conversion. Anything else comes out darker.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("The surface supports no texture format")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let sample_count = pick_sample_count(&adapter, config.format);
        Ok(Self::with_target(
            device,
            queue,
            config,
            sample_count,
            Target::Window { window, surface },
            scene,
        ))
    }

    /// A context without a window that renders into an sRGB texture of the
    /// given size. Frames are fetched with [`read_pixels`](Self::read_pixels).
    #[cfg(feature = "integration-tests")]
    pub async fn offscreen(width: u32, height: u32, scene: &Scene) -> anyhow::Result<Self> {
        let instance = mk_instance();
        let (adapter, device, queue) = request_device(&instance, None).await?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let sample_count = pick_sample_count(&adapter, config.format);
        let texture = create_offscreen_texture(&device, &config);
        let mut ctx = Self::with_target(
            device,
            queue,
            config,
            sample_count,
            Target::Offscreen(texture),
            scene,
        );
        ctx.is_surface_configured = true;
        Ok(ctx)
    }

    fn with_target(
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: wgpu::SurfaceConfiguration,
        sample_count: u32,
        target: Target,
        scene: &Scene,
    ) -> Self {
        let camera = CameraResources::new(&device);
        let light = LightResources::new(&device, scene);
        let material_layout = material_layout(&device);
        let pipelines = Pipelines::new(
            &device,
            config.format,
            sample_count,
            &material_layout,
            &camera.bind_group_layout,
            &light,
        );
        let depth_texture = Texture::create_depth_texture_multisampled(
            &device,
            [config.width, config.height],
            sample_count,
            "depth_texture",
        );
        let msaa_view = create_msaa_view(&device, &config, sample_count);
        let instances = InstanceBuffer::new(&device);

        Self {
            target,
            depth_texture,
            msaa_view,
            device,
            queue,
            config,
            camera,
            light,
            material_layout,
            pipelines,
            cache: GpuCache::default(),
            instances,
            is_surface_configured: false,
        }
    }

    /// The window frames are presented to, `None` when rendering offscreen.
    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.target {
            Target::Window { window, .. } => Some(window),
            #[cfg(feature = "integration-tests")]
            Target::Offscreen(_) => None,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.pipelines.sample_count
    }

    /// Reconfigure the target and recreate the depth and multisample buffers.
    /// Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        match &mut self.target {
            Target::Window { surface, .. } => surface.configure(&self.device, &self.config),
            #[cfg(feature = "integration-tests")]
            Target::Offscreen(texture) => {
                *texture = create_offscreen_texture(&self.device, &self.config);
            }
        }
        self.is_surface_configured = true;
        self.depth_texture = Texture::create_depth_texture_multisampled(
            &self.device,
            [self.config.width, self.config.height],
            self.pipelines.sample_count,
            "depth_texture",
        );
        self.msaa_view = create_msaa_view(&self.device, &self.config, self.pipelines.sample_count);
    }

    /// Draw one frame of `landscape`: shadow pass, then opaque, unlit and
    /// transparent batches.
    pub fn render(&mut self, landscape: &mut Landscape) -> Result<(), wgpu::SurfaceError> {
        if !self.is_surface_configured {
            return Ok(());
        }

        let (output, view) = match &self.target {
            Target::Window { surface, .. } => {
                let output = surface.get_current_texture()?;
                let view = output
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(output), view)
            }
            #[cfg(feature = "integration-tests")]
            Target::Offscreen(texture) => {
                (None, texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
        };

        self.draw(landscape, &view);

        if let Some(output) = output {
            output.present();
        }
        Ok(())
    }

    fn draw(&mut self, landscape: &mut Landscape, view: &wgpu::TextureView) {
        landscape.scene.update_world_transforms();
        self.camera
            .write(&self.queue, &landscape.camera, &landscape.projection);
        self.light.write(&self.queue, &landscape.scene);

        let frame = collect_batches(&landscape.scene, landscape.camera.position);
        self.cache
            .prepare(&self.device, &self.queue, &self.material_layout, &frame);
        let (raw, ranges) = frame.pack();
        self.instances.upload(&self.device, &self.queue, &raw);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        if self.light.uniform.shadows_enabled() {
            let mut shadow_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.light.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            shadow_pass.set_pipeline(&self.pipelines.shadow);
            shadow_pass.set_bind_group(0, &self.light.shadow_bind_group, &[]);
            shadow_pass.set_vertex_buffer(1, self.instances.buffer.slice(..));
            for (batch, range) in frame.shadow_casters.iter().zip(&ranges.shadow_casters) {
                if let Some(mesh) = self.cache.mesh(batch) {
                    shadow_pass.draw_mesh_depth(mesh, range.clone());
                }
            }
        }

        {
            let [r, g, b] = landscape.scene.background;
            // With MSAA the samples are resolved onto the target and dropped.
            let (color_view, resolve_target, store) = match &self.msaa_view {
                Some(msaa) => (msaa, Some(view), wgpu::StoreOp::Discard),
                None => (view, None, wgpu::StoreOp::Store),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: 1.0,
                        }),
                        store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            render_pass.set_vertex_buffer(1, self.instances.buffer.slice(..));

            let passes: [(&CullVariants, &[Batch], &[std::ops::Range<u32>]); 3] = [
                (&self.pipelines.basic, &frame.opaque, &ranges.opaque),
                (&self.pipelines.unlit, &frame.unlit, &ranges.unlit),
                (&self.pipelines.transparent, &frame.transparent, &ranges.transparent),
            ];
            for (variants, batches, ranges) in passes {
                let mut bound = None;
                for (batch, range) in batches.iter().zip(ranges) {
                    let Some((mesh, material)) = self.cache.get(batch) else {
                        continue;
                    };
                    let cull_mode = batch.material.cull_mode();
                    if bound != Some(cull_mode) {
                        render_pass.set_pipeline(variants.for_cull_mode(cull_mode));
                        bound = Some(cull_mode);
                    }
                    render_pass.draw_mesh_instanced(
                        mesh,
                        material,
                        range.clone(),
                        &self.camera.bind_group,
                        &self.light.bind_group,
                    );
                }
            }
        }

        self.queue.submit(iter::once(encoder.finish()));
    }

    /// Copy the last offscreen frame back to the CPU.
    #[cfg(feature = "integration-tests")]
    pub fn read_pixels(&self) -> anyhow::Result<image::RgbaImage> {
        let Target::Offscreen(texture) = &self.target else {
            anyhow::bail!("Only offscreen contexts can be read back");
        };
        let (width, height) = (self.config.width, self.config.height);
        let unpadded_bytes_per_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .context("Waiting for the readback failed")?;
        rx.recv()
            .context("The readback callback never ran")?
            .context("Mapping the readback buffer failed")?;

        let pixels = {
            let data = buffer_slice.get_mapped_range();
            data.chunks(padded_bytes_per_row as usize)
                .flat_map(|row| &row[..unpadded_bytes_per_row as usize])
                .copied()
                .collect::<Vec<u8>>()
        };
        output_buffer.unmap();
        image::RgbaImage::from_raw(width, height, pixels)
            .context("The readback doesn't match the target size")
    }
}
