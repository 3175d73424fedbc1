//! GPU textures and texture creation utilities.
//!
//! This module provides [`Texture`], a wrapper around WGPU texture resources,
//! and helpers for creating depth buffers, the directional light's shadow map,
//! material textures and decoding image bytes on the CPU.

use std::borrow::Cow;

use anyhow::*;
use image::{GenericImageView, ImageFormat, imageops, load_from_memory_with_format};

use crate::data_structures::model::TextureData;

/// A GPU texture with its view and sampler.
///
/// Typically created via [`from_rgba`](Self::from_rgba) for materials or
/// [`create_depth_texture`](Self::create_depth_texture) for depth testing.
#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// Largest texture side every backend accepts, WebGL2 included.
pub const MAX_TEXTURE_DIMENSION: u32 = 2048;

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// # Arguments
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        Self::create_depth_texture_multisampled(device, size, 1, label)
    }

    /// Depth attachment for a multisampled colour target. Multisampled depth
    /// can't be bound as a texture, so it's only a render attachment then.
    pub fn create_depth_texture_multisampled(
        device: &wgpu::Device,
        size: [u32; 2],
        sample_count: u32,
        label: &str,
    ) -> Self {
        let usage = if sample_count > 1 {
            wgpu::TextureUsages::RENDER_ATTACHMENT
        } else {
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
        };
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_comparison_sampler(device, label);

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Square depth target rendered from the light and sampled with a
    /// comparison sampler by the lit shaders.
    pub fn create_shadow_map(device: &wgpu::Device, resolution: u32) -> Self {
        Self::create_depth_texture(device, [resolution, resolution], "shadow_map")
    }

    /// Upload decoded RGBA8 pixels as an sRGB colour texture.
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &TextureData,
        label: &str,
    ) -> Self {
        let data = fit_within(data, device.limits().max_texture_dimension_2d);
        let size = wgpu::Extent3d {
            width: data.width.max(1),
            height: data.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &data.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: Some(size.height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_default_sampler(device);
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// 1x1 white texture so untextured materials can share the textured pipeline.
    pub fn create_white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let data = TextureData {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        };
        Self::from_rgba(device, queue, &data, "white texture")
    }
}

/// Decode image file bytes (PNG, JPEG, ...) into RGBA8 pixels.
///
/// `mime_type` is an optional hint such as `image/png`; without it the format
/// is guessed from the data.
pub fn decode_image(bytes: &[u8], mime_type: Option<&str>) -> Result<TextureData> {
    let format = mime_type
        .and_then(|mt| mt.split('/').last())
        .and_then(ImageFormat::from_extension);
    let img = match format {
        None => image::load_from_memory(bytes)?,
        Some(fmt) => load_from_memory_with_format(bytes, fmt)?,
    };
    let (width, height) = img.dimensions();
    let data = TextureData {
        width,
        height,
        pixels: img.to_rgba8().into_raw(),
    };
    if data.width <= MAX_TEXTURE_DIMENSION && data.height <= MAX_TEXTURE_DIMENSION {
        return Ok(data);
    }
    Ok(fit_within(&data, MAX_TEXTURE_DIMENSION).into_owned())
}

/// Scale `data` down so neither side exceeds `max`, keeping the aspect ratio.
/// Textures that already fit are borrowed unchanged.
pub fn fit_within(data: &TextureData, max: u32) -> Cow<'_, TextureData> {
    if data.width <= max && data.height <= max {
        return Cow::Borrowed(data);
    }
    let Some(img) = image::RgbaImage::from_raw(data.width, data.height, data.pixels.clone())
    else {
        log::warn!(
            "{}x{} texture has {} bytes of pixels, using it unscaled",
            data.width,
            data.height,
            data.pixels.len()
        );
        return Cow::Borrowed(data);
    };

    let scale = max as f64 / data.width.max(data.height) as f64;
    let width = ((data.width as f64 * scale).round() as u32).clamp(1, max);
    let height = ((data.height as f64 * scale).round() as u32).clamp(1, max);
    log::warn!(
        "Downscaling {}x{} texture to {width}x{height}, the limit is {max}",
        data.width,
        data.height
    );
    let resized = imageops::resize(&img, width, height, imageops::FilterType::Triangle);
    Cow::Owned(TextureData {
        width,
        height,
        pixels: resized.into_raw(),
    })
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

fn create_comparison_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        compare: Some(wgpu::CompareFunction::LessEqual),
        lod_min_clamp: 0.0,
        lod_max_clamp: 100.0,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_bytes() {
        let mut png = Vec::new();
        let img = image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let data = decode_image(&png, Some("image/png")).unwrap();
        assert_eq!((data.width, data.height), (2, 3));
        assert_eq!(data.pixels.len(), 2 * 3 * 4);
        assert_eq!(&data.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn oversized_images_are_scaled_to_the_texture_limit() {
        let mut png = Vec::new();
        let img = image::RgbaImage::from_pixel(4096, 16, image::Rgba([200, 10, 10, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let data = decode_image(&png, Some("image/png")).unwrap();
        assert_eq!((data.width, data.height), (MAX_TEXTURE_DIMENSION, 8));
        assert_eq!(data.pixels.len(), (data.width * data.height * 4) as usize);
        assert_eq!(&data.pixels[..4], &[200, 10, 10, 255]);
    }

    #[test]
    fn textures_inside_the_limit_are_borrowed() {
        let data = TextureData {
            width: 4,
            height: 2,
            pixels: vec![255; 4 * 2 * 4],
        };
        assert!(matches!(fit_within(&data, 4), Cow::Borrowed(_)));

        let tall = TextureData {
            width: 2,
            height: 8,
            pixels: vec![255; 2 * 8 * 4],
        };
        let fitted = fit_within(&tall, 4);
        assert_eq!((fitted.width, fitted.height), (1, 4));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_image(&[1, 2, 3], None).is_err());
    }
}
