//! Force step on the GPU using a wgpu compute pipeline
//!
//! Each call uploads the input snapshot, dispatches one work-group per tile
//! and reads the output back. Point buffers are kept between calls and only
//! reallocated when the point count grows.

use std::sync::Arc;

use tracing::{debug, info, trace};
use wgpu::util::DeviceExt;

use super::shaders::{FORCE_STEP_ENTRY_POINT, force_step_shader};
use super::types::StepUniforms;
use crate::config::ForceConfig;
use crate::error::{ForceError, ForceResult};
use crate::kernel::{ForceStep, StepArgs};
use crate::schedule::TileSchedule;
use crate::types::{Point, RAND_LENGTH, RandTable};

/// Device-side position buffers sized for `capacity` points
struct PointBuffers {
    capacity: usize,
    input: wgpu::Buffer,
    output: wgpu::Buffer,
    staging: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl PointBuffers {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniform_buffer: &wgpu::Buffer,
        rand_buffer: &wgpu::Buffer,
        capacity: usize,
    ) -> Self {
        let size = (capacity * std::mem::size_of::<Point>()) as u64;
        let size = size.max(16);

        let input = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Input Positions"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Positions"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Force Step Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: rand_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            capacity,
            input,
            output,
            staging,
            bind_group,
        }
    }

    /// Reuse the buffers in `slot` if they are large enough, otherwise replace them
    fn ensure<'a>(
        slot: &'a mut Option<PointBuffers>,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniform_buffer: &wgpu::Buffer,
        rand_buffer: &wgpu::Buffer,
        num_points: usize,
    ) -> &'a PointBuffers {
        if !matches!(slot, Some(buffers) if buffers.capacity >= num_points) {
            debug!(num_points, "allocating GPU position buffers");
            *slot = None;
        }
        slot.get_or_insert_with(|| {
            Self::new(device, layout, uniform_buffer, rand_buffer, num_points)
        })
    }
}

/// GPU force step
///
/// Holds the compute pipeline for one tile size, plus the uniform, random
/// table and position buffers it reuses across steps.
pub struct GpuForceKernel {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    rand_buffer: wgpu::Buffer,
    uploaded_rand: Option<RandTable>,
    point_buffers: Option<PointBuffers>,
    config: ForceConfig,
    tile_size: u32,
}

impl GpuForceKernel {
    /// Create a kernel on a freshly requested high-performance device
    pub fn new(config: ForceConfig, tile_size: u32) -> ForceResult<Self> {
        let (device, queue) = pollster::block_on(create_device())?;
        Self::with_device(Arc::new(device), Arc::new(queue), config, tile_size)
    }

    /// Create a kernel using an existing device and queue
    pub fn with_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        config: ForceConfig,
        tile_size: u32,
    ) -> ForceResult<Self> {
        if tile_size == 0 {
            return Err(ForceError::ZeroTileSize);
        }
        config.validate()?;

        let limits = device.limits();
        let max = limits
            .max_compute_workgroup_size_x
            .min(limits.max_compute_invocations_per_workgroup);
        if tile_size > max {
            return Err(ForceError::TileSizeTooLarge { tile_size, max });
        }

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Force Step Shader"),
            source: wgpu::ShaderSource::Wgsl(force_step_shader(tile_size).into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Force Step Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                storage_entry(2, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Force Step Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Force Step Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(FORCE_STEP_ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniforms = StepUniforms::new(&config, 0, 0.0, 0.0, 0);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let rand_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Random Offset Table"),
            size: (RAND_LENGTH * std::mem::size_of::<Point>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            uniform_buffer,
            rand_buffer,
            uploaded_rand: None,
            point_buffers: None,
            config,
            tile_size,
        })
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }
}

impl ForceStep for GpuForceKernel {
    fn step(&mut self, args: &StepArgs<'_>, output: &mut [Point]) -> ForceResult<()> {
        let num_points = args.check_output(output)?;
        if num_points == 0 {
            return Ok(());
        }

        let schedule = TileSchedule::new(num_points, self.tile_size, self.config.tiles_per_iteration);
        let max_groups = self.device.limits().max_compute_workgroups_per_dimension;
        if schedule.num_tiles() > max_groups {
            return Err(ForceError::TooManyTiles {
                tiles: schedule.num_tiles(),
                max: max_groups,
            });
        }
        trace!(
            backend = "gpu",
            step = args.step_number,
            num_points,
            groups = schedule.num_tiles(),
            "force step"
        );

        let buffers = PointBuffers::ensure(
            &mut self.point_buffers,
            &self.device,
            &self.bind_group_layout,
            &self.uniform_buffer,
            &self.rand_buffer,
            args.input.len(),
        );

        let uniforms = StepUniforms::new(
            &self.config,
            num_points,
            args.width,
            args.height,
            args.step_number,
        );
        self.queue
            .write_buffer(&buffers.input, 0, bytemuck::cast_slice(args.input));
        // The table is normally filled once per layout; only re-upload on change
        if self.uploaded_rand.as_ref() != Some(args.rand_values) {
            debug!("uploading random offset table");
            self.queue.write_buffer(
                &self.rand_buffer,
                0,
                bytemuck::cast_slice(args.rand_values.as_slice()),
            );
            self.uploaded_rand = Some(args.rand_values.clone());
        }
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let byte_len = std::mem::size_of_val(output) as u64;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Force Step Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Force Step Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &buffers.bind_group, &[]);
            pass.dispatch_workgroups(schedule.num_tiles(), 1, 1);
        }
        encoder.copy_buffer_to_buffer(&buffers.output, 0, &buffers.staging, 0, byte_len);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffers.staging.slice(..byte_len);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv().map_err(|_| wgpu::BufferAsyncError)??;

        let data = buffer_slice.get_mapped_range();
        output.copy_from_slice(bytemuck::cast_slice(&data));
        drop(data);
        buffers.staging.unmap();

        Ok(())
    }

    fn name(&self) -> &str {
        "gpu"
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Request a high-performance adapter and a device with default limits
pub async fn create_device() -> ForceResult<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok_or(ForceError::NoAdapter)?;

    let adapter_info = adapter.get_info();
    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "using GPU adapter"
    );

    let device = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Force Step Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None, // trace path
        )
        .await?;
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceKernel;

    fn gpu_kernel(config: ForceConfig, tile_size: u32) -> Option<GpuForceKernel> {
        match GpuForceKernel::new(config, tile_size) {
            Ok(kernel) => Some(kernel),
            Err(ForceError::NoAdapter) => {
                eprintln!("skipping: no GPU adapter");
                None
            }
            Err(e) => panic!("GPU setup failed: {e}"),
        }
    }

    fn table() -> RandTable {
        let values: Vec<Point> = (0..RAND_LENGTH)
            .map(|i| Point::new(i as f32 * 0.25, 18.0 - i as f32 * 0.25))
            .collect();
        RandTable::try_from(values).unwrap()
    }

    #[test]
    fn test_rejects_oversized_tiles() {
        let Some(kernel) = gpu_kernel(ForceConfig::default(), 64) else {
            return;
        };
        let result = GpuForceKernel::with_device(
            kernel.device.clone(),
            kernel.queue.clone(),
            ForceConfig::default(),
            1 << 16,
        );
        assert!(matches!(result, Err(ForceError::TileSizeTooLarge { .. })));
    }

    fn assert_matches_reference(
        gpu: &mut GpuForceKernel,
        config: ForceConfig,
        tile_size: u32,
        input: &[Point],
        rand: &RandTable,
        steps: &[u32],
    ) {
        let mut reference = ReferenceKernel::new(config, tile_size).unwrap();
        for &step in steps {
            let args = StepArgs::new(input, 20.0, 20.0, rand, step);
            let mut expected = vec![Point::ZERO; input.len()];
            let mut actual = vec![Point::ZERO; input.len()];
            reference.step(&args, &mut expected).unwrap();
            gpu.step(&args, &mut actual).unwrap();

            for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
                assert!(
                    (a.x - e.x).abs() < 1e-4 && (a.y - e.y).abs() < 1e-4,
                    "point {i} at step {step}: gpu {a:?}, reference {e:?}"
                );
            }
        }
    }

    fn cloud(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new((i % 20) as f32, (i / 20) as f32 * 0.4))
            .collect()
    }

    #[test]
    fn test_matches_reference() {
        let config = ForceConfig::default();
        let Some(mut gpu) = gpu_kernel(config, 32) else {
            return;
        };
        let rand = table();
        // 10 tiles of 32, modulus 1
        assert_matches_reference(&mut gpu, config, 32, &cloud(300), &rand, &[0, 1, 5, 33]);
    }

    #[test]
    fn test_matches_reference_with_rotating_tiles() {
        let config = ForceConfig::default();
        let Some(mut gpu) = gpu_kernel(config, 32) else {
            return;
        };
        let rand = table();
        // 32 tiles of 32, modulus 4
        assert_eq!(TileSchedule::new(1000, 32, 7).modulus(), 4);
        assert_matches_reference(&mut gpu, config, 32, &cloud(1000), &rand, &[0, 1, 2, 3, 9]);
    }

    #[test]
    fn test_matches_reference_with_optional_terms() {
        let config = ForceConfig::default()
            .with_wall_repulsion(-0.0002)
            .with_clamp_to_bounds(true)
            .with_balanced_gravity(true);
        let Some(mut gpu) = gpu_kernel(config, 32) else {
            return;
        };
        let rand = table();
        let mut input = cloud(1000);
        // A few points off the canvas so the clamp has work to do
        input[0] = Point::new(-3.0, 25.0);
        input[999] = Point::new(30.0, -1.0);
        assert_matches_reference(&mut gpu, config, 32, &input, &rand, &[0, 2, 7]);
    }

    #[test]
    fn test_picks_up_a_new_rand_table() {
        // Strong enough that a table swap moves points well past the tolerance
        let config = ForceConfig::default().with_point_repulsion(-10.0);
        let Some(mut gpu) = gpu_kernel(config, 64) else {
            return;
        };
        // Coincident points read the table, so a stale upload would show
        let input = [Point::new(5.0, 5.0); 4];
        let first = table();
        let second = RandTable::new([Point::new(1.0, 19.0); RAND_LENGTH]);

        assert_matches_reference(&mut gpu, config, 64, &input, &first, &[3]);
        assert_matches_reference(&mut gpu, config, 64, &input, &second, &[3]);
        assert_matches_reference(&mut gpu, config, 64, &input, &first, &[3]);
    }

    #[test]
    fn test_single_point_gets_gravity_only() {
        let Some(mut gpu) = gpu_kernel(ForceConfig::default(), 64) else {
            return;
        };
        let rand = table();
        let input = [Point::new(4.0, 6.0)];
        let mut output = [Point::ZERO];
        gpu.step(&StepArgs::new(&input, 20.0, 20.0, &rand, 2), &mut output)
            .unwrap();

        // (10 - 4, 10 - 6) * 0.2
        assert!((output[0].x - 5.2).abs() < 1e-5);
        assert!((output[0].y - 6.8).abs() < 1e-5);
    }
}
