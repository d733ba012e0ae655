//! Light Grid Probe
//!
//! Run with: `cargo run --bin light_grid_probe -- [config.json] [--lights N] [--size WxH] [--png out.png]`
//!
//! Headless check of the Forward+ pipeline. Draws one opaque plane facing the
//! camera, scatters synthetic point lights across it, runs a single frame and
//! reads the light grid back. The GPU result is compared tile by tile against
//! the CPU reference culler, and the per-tile light counts are printed as an
//! ASCII heatmap.
//!
//! Set `RUST_LOG=debug` for per-stage logging.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use glam::{Mat4, Vec3};

use forward_plus_engine::readback::{read_buffer_as, read_texture_as};
use forward_plus_engine::{
    CpuCullingInputs, CpuLightGrid, CullingCounters, DepthInstance, DepthMesh, ForwardPlus, ForwardPlusConfig,
    ForwardPlusError, FrameInputs, GpuContext, GpuContextConfig, HeatmapLut, KernelSet, LightRecord, TileFrustum,
    TileGrid, VisibleLight, create_depth_attachment, cull_lights_cpu,
};

/// Distance of the opaque plane from the camera.
const PLANE_DISTANCE: f32 = 20.0;
const FOV_Y: f32 = std::f32::consts::FRAC_PI_3;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 100.0;

/// ASCII ramp for the heatmap, from empty to saturated.
const RAMP: &[u8] = b" .:-=+*#%@";

#[derive(Parser)]
#[command(name = "light_grid_probe", about = "Run one Forward+ frame headless and check the light grid")]
struct Cli {
    /// Forward+ config JSON (defaults when omitted)
    config: Option<PathBuf>,
    /// Number of synthetic point lights
    #[arg(long, default_value_t = 64)]
    lights: u32,
    /// Render target size as WIDTHxHEIGHT
    #[arg(long, default_value = "640x360", value_parser = parse_size)]
    size: (u32, u32),
    /// Write the per-tile heatmap to this PNG
    #[arg(long)]
    png: Option<PathBuf>,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: u32 = width.parse().map_err(|err| format!("width: {err}"))?;
    let height: u32 = height.parse().map_err(|err| format!("height: {err}"))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((width, height))
}

/// Lights on a sunflower spiral over the plane, so every region of the
/// screen gets some and a few overlap.
fn synthetic_lights(count: u32, half_width: f32, half_height: f32) -> Vec<VisibleLight> {
    let golden_angle = std::f32::consts::PI * (3.0 - 5f32.sqrt());
    let mut lights = vec![VisibleLight::main_directional(
        Vec3::new(-0.3, -1.0, -0.2),
        Vec3::new(1.0, 0.95, 0.9),
    )];
    lights.extend((0..count).map(|i| {
        let t = (i as f32 + 0.5) / count.max(1) as f32;
        let angle = i as f32 * golden_angle;
        let position = Vec3::new(
            t.sqrt() * angle.cos() * half_width,
            t.sqrt() * angle.sin() * half_height,
            -PLANE_DISTANCE,
        );
        let hue = i as f32 / count.max(1) as f32;
        VisibleLight::point(position, Vec3::new(hue, 1.0 - hue, 0.5), 1.0 + (i % 4) as f32)
    }));
    lights
}

fn print_heatmap(counts: &[u32], grid: &TileGrid, max_lights_per_tile: u32) {
    let peak = counts.iter().copied().max().unwrap_or(0).max(1);
    println!("Light counts per tile (peak {peak}, capacity {max_lights_per_tile}):");
    for y in 0..grid.tiles_y {
        let row: String = (0..grid.tiles_x)
            .map(|x| {
                let count = counts[grid.tile_index(x, y) as usize];
                let level = (count as usize * (RAMP.len() - 1)).div_ceil(peak as usize);
                RAMP[level.min(RAMP.len() - 1)] as char
            })
            .collect();
        println!("|{row}|");
    }
}

/// Tiles whose GPU index set differs from the CPU reference.
fn compare_grids(gpu_cells: &[[u32; 2]], gpu_indices: &[u32], cpu: &CpuLightGrid) -> Vec<(u32, u32)> {
    let grid = cpu.grid;
    let mut mismatches = Vec::new();
    for y in 0..grid.tiles_y {
        for x in 0..grid.tiles_x {
            let [offset, count] = gpu_cells[grid.tile_index(x, y) as usize];
            let gpu: BTreeSet<u32> = gpu_indices
                .get(offset as usize..(offset + count) as usize)
                .unwrap_or_default()
                .iter()
                .copied()
                .collect();
            let reference: BTreeSet<u32> = cpu.tile_lights(x, y).iter().copied().collect();
            if gpu != reference {
                mismatches.push((x, y));
            }
        }
    }
    mismatches
}

fn run(args: Cli) -> Result<(), ForwardPlusError> {
    let config = match &args.config {
        Some(path) => ForwardPlusConfig::load(path)?,
        None => ForwardPlusConfig::default(),
    };

    let context = match GpuContext::new_headless(&GpuContextConfig::default()) {
        Ok(context) => context,
        Err(err) => {
            log::warn!("[Probe] no GPU available: {err}");
            return Ok(());
        }
    };
    let (device, queue) = (&context.device, &context.queue);
    if context.is_software() {
        log::info!("[Probe] running on a software adapter");
    }

    let (width, height) = args.size;
    let aspect = width as f32 / height.max(1) as f32;
    let projection = Mat4::perspective_rh(FOV_Y, aspect, Z_NEAR, Z_FAR);
    let view = Mat4::IDENTITY;

    // Screen extents of the plane at PLANE_DISTANCE.
    let half_height = PLANE_DISTANCE * (FOV_Y * 0.5).tan();
    let half_width = half_height * aspect;
    let plane = DepthMesh::quad(
        device,
        half_width.max(half_height) * 2.0,
        &[DepthInstance::from_matrix(Mat4::from_translation(Vec3::new(
            0.0,
            0.0,
            -PLANE_DISTANCE,
        )))],
    );
    let lights = synthetic_lights(args.lights, half_width, half_height);

    let color_format = wgpu::TextureFormat::Rgba8Unorm;
    let mut forward_plus = ForwardPlus::new(
        device,
        queue,
        config,
        &KernelSet::embedded(),
        &context.formats,
        color_format,
    )?;
    let (_depth_texture, depth_view) = create_depth_attachment(device, width, height);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("probe_frame_encoder"),
    });
    let report = forward_plus.render_frame(
        device,
        queue,
        &mut encoder,
        &FrameInputs {
            projection,
            view,
            target_size: (width, height),
            render_scale: 1.0,
            depth_attachment: &depth_view,
            color_target: None,
            lights: &lights,
            opaque: &plane,
        },
    );
    queue.submit([encoder.finish()]);
    drop(report.captured_depth);

    log::info!(
        "[Probe] frustums {:?}, depth {:?}, culling {:?}",
        report.frustums,
        report.depth_capture,
        report.culling.status
    );
    if !report.culling.status.produced_output() {
        println!("Culling did not run: {:?}", report.culling.status);
        return Ok(());
    }

    let Some(outputs) = forward_plus.outputs() else {
        return Err(ForwardPlusError::Readback("culling outputs missing after a completed frame".to_string()));
    };
    let Some(frustum_buffer) = forward_plus.frustum_buffer() else {
        return Err(ForwardPlusError::Readback("frustum buffer missing after a completed frame".to_string()));
    };
    let grid = outputs.grid;
    let max_lights_per_tile = outputs.max_lights_per_tile;

    let gpu_cells: Vec<[u32; 2]> = read_texture_as(device, queue, outputs.light_grid)?;
    let gpu_indices: Vec<u32> = read_buffer_as(device, queue, outputs.light_index_list)?;
    let counters: Vec<CullingCounters> = read_buffer_as(device, queue, outputs.counters)?;
    let frustums: Vec<TileFrustum> = read_buffer_as(device, queue, frustum_buffer)?;

    // The plane covers the whole screen, so every captured sample has its depth.
    let plane_depth = projection.project_point3(Vec3::new(0.0, 0.0, -PLANE_DISTANCE)).z;
    let depth = vec![plane_depth; (grid.screen_width * grid.screen_height) as usize];

    let records: Vec<LightRecord> = read_buffer_as(device, queue, outputs.light_data)?;
    let reference = cull_lights_cpu(&CpuCullingInputs {
        grid,
        inverse_projection: projection.inverse(),
        world_to_view: view,
        frustums: &frustums,
        lights: &records,
        light_count: report.culling.active_lights,
        depth: &depth,
        max_lights_per_tile,
    });

    let counts: Vec<u32> = gpu_cells.iter().map(|cell| cell[1]).collect();
    print_heatmap(&counts, &grid, max_lights_per_tile);

    let gpu_counters = counters.first().copied().unwrap_or_default();
    println!(
        "{}x{} tiles, {} lights, main light {}, appended {} (cpu {}), dropped {} (cpu {})",
        grid.tiles_x,
        grid.tiles_y,
        report.culling.active_lights,
        report.culling.has_main_light,
        gpu_counters.appended,
        reference.appended(),
        gpu_counters.dropped,
        reference.dropped,
    );

    let mismatches = compare_grids(&gpu_cells, &gpu_indices, &reference);
    if mismatches.is_empty() {
        println!("GPU light grid matches the CPU reference");
    } else {
        println!("{} tile(s) differ from the CPU reference:", mismatches.len());
        for (x, y) in mismatches.iter().take(16) {
            println!(
                "  tile ({x}, {y}): gpu {} light(s), cpu {:?}",
                counts[grid.tile_index(*x, *y) as usize],
                reference.tile_lights(*x, *y)
            );
        }
    }

    if let Some(path) = &args.png {
        let lut = HeatmapLut::from_config(&forward_plus.config().debug)?;
        lut.render_counts(&counts, grid.tiles_x, grid.tiles_y, max_lights_per_tile)
            .save(path)?;
        println!("Heatmap written to {}", path.display());
    }

    Ok(())
}

fn main() {
    env_logger::init();
    println!("=== Forward+ Light Grid Probe ===");

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("light_grid_probe: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults_and_size() {
        let cli = Cli::parse_from(["light_grid_probe"]);
        assert_eq!((cli.lights, cli.size), (64, (640, 360)));
        assert!(cli.config.is_none() && cli.png.is_none());

        let cli = Cli::parse_from(["light_grid_probe", "fp.json", "--size", "1920x1080", "--lights", "8"]);
        assert_eq!(cli.config, Some(PathBuf::from("fp.json")));
        assert_eq!((cli.lights, cli.size), (8, (1920, 1080)));
    }

    #[test]
    fn test_malformed_size_is_rejected() {
        for size in ["640", "640x", "x360", "0x360", "wide x tall"] {
            assert!(Cli::try_parse_from(["light_grid_probe", "--size", size]).is_err(), "{size}");
        }
    }
}
