//! GPU Readback
//!
//! Blocking copies of GPU buffers and textures back to the CPU, for the probe
//! tool and GPU round-trip tests. Never used on the frame path.

use std::sync::mpsc::channel;

use bytemuck::AnyBitPattern;

use crate::error::{ForwardPlusError, Result};

/// Map `staging`, wait for the device, and copy its bytes out.
fn map_staging(device: &wgpu::Device, staging: &wgpu::Buffer) -> Result<Vec<u8>> {
    let slice = staging.slice(..);
    let (tx, rx) = channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });

    device.poll(wgpu::PollType::wait_indefinitely())?;
    rx.recv()
        .map_err(|_| ForwardPlusError::Readback("map callback dropped".to_string()))??;

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}

/// Reinterpret bytes as `T` without assuming the Vec is aligned for `T`.
fn unpack<T: AnyBitPattern>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(std::mem::size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

fn staging_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Read a whole buffer. `source` needs `COPY_SRC`.
pub fn read_buffer(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer) -> Result<Vec<u8>> {
    let staging = staging_buffer(device, source.size());
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_buffer_encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, source.size());
    queue.submit([encoder.finish()]);
    map_staging(device, &staging)
}

/// Read a whole buffer as `T` elements.
pub fn read_buffer_as<T: AnyBitPattern>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
) -> Result<Vec<T>> {
    let bytes = read_buffer(device, queue, source)?;
    Ok(unpack(&bytes))
}

/// Row pitch of a texture copy, padded to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub fn padded_bytes_per_row(width: u32, bytes_per_texel: u32) -> u32 {
    let unpadded = width * bytes_per_texel;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Read mip 0 of a 2D texture as tightly packed rows. `texture` needs `COPY_SRC`.
pub fn read_texture(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<Vec<u8>> {
    let format = texture.format();
    let bytes_per_texel = format
        .block_copy_size(None)
        .ok_or_else(|| ForwardPlusError::Readback(format!("{format:?} has no single-aspect copy size")))?;
    let (width, height) = (texture.width(), texture.height());
    let padded = padded_bytes_per_row(width, bytes_per_texel);

    let staging = staging_buffer(device, padded as u64 * height as u64);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_texture_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit([encoder.finish()]);

    let padded_bytes = map_staging(device, &staging)?;
    let row = (width * bytes_per_texel) as usize;
    let mut packed = Vec::with_capacity(row * height as usize);
    for chunk in padded_bytes.chunks(padded as usize).take(height as usize) {
        packed.extend_from_slice(&chunk[..row]);
    }
    Ok(packed)
}

/// Read mip 0 of a 2D texture as `T` texels.
pub fn read_texture_as<T: AnyBitPattern>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
) -> Result<Vec<T>> {
    let bytes = read_texture(device, queue, texture)?;
    Ok(unpack(&bytes))
}
