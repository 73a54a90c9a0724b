//! GPU-accelerated kernels using WGPU.
//!
//! This module runs every operation as a WGSL compute shader. It handles GPU
//! context initialization, shader validation and pipeline creation (once, via
//! `lazy_static`), and dispatch of the kernels:
//!
//! - `axpby`: weighted sum, also used for subtraction
//! - `scale`: scalar multiple
//! - `hadamard`: elementwise product, and square by binding one input twice
//! - `matmul`: matrix product with transpose and accumulate flags
//! - `convolve`: strided 2-D convolution with zero padding
//!
//! All kernels share one bind group layout: a uniform parameter block at
//! binding 0, two read-only inputs at bindings 1 and 2, and the read-write
//! output at binding 3. Matrix data is converted to `f32` for the device and
//! back to the container's scalar afterwards, so `f64` containers compute at
//! single precision here. Every call blocks until the device has finished.
//!
//! The context is created the first time a kernel runs. If no adapter or
//! device is available, every call returns [`GpuFailure::Unavailable`]
//! instead of panicking.

use briny::prelude::*;
use wgpu::util::DeviceExt;

use crate::backend::Wgpu;
use crate::error::Result;
use crate::matrix::{Contiguous, DenseMatrix, Matrix, Scalar};
use crate::ops::{
    AddKernel, ConvolveKernel, ConvolveOptions, ElementwiseProductKernel, ElementwiseSquareKernel,
    MatrixProductKernel, ProductOptions, ScaleKernel, SquareTarget,
};

const AXPBY: &str = include_str!("shaders/axpby.wgsl");
const SCALE: &str = include_str!("shaders/scale.wgsl");
const HADAMARD: &str = include_str!("shaders/hadamard.wgsl");
const MATMUL: &str = include_str!("shaders/matmul.wgsl");
const CONVOLVE: &str = include_str!("shaders/convolve.wgsl");

/// Invocations per workgroup in the elementwise shaders.
const LINEAR_WORKGROUP: u32 = 64;
/// Side of the square workgroup in the 2-D shaders.
const TILE: u32 = 16;

/// Basic wrapper for errors while acquiring the GPU.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// An error in requesting the adapter.
    #[error("adapter error: {0}")]
    Adapter(wgpu::RequestAdapterError),
    /// An error in requesting the device.
    #[error("device error: {0}")]
    Device(wgpu::RequestDeviceError),
}

/// A failure while running a kernel on the GPU.
#[derive(Debug, thiserror::Error)]
pub enum GpuFailure {
    /// Context creation failed; holds the underlying reason.
    #[error("GPU unavailable: {0}")]
    Unavailable(String),
    /// Acquiring the adapter or device failed.
    #[error(transparent)]
    Gpu(#[from] GpuError),
    /// A bundled shader was rejected before compilation.
    #[error("shader `{label}` failed validation: {reason}")]
    Shader {
        /// Kernel name.
        label: &'static str,
        /// Validation message.
        reason: String,
    },
    /// Waiting for the queue failed.
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    /// Mapping the result buffer for reading failed.
    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    /// The mapping callback was dropped without reporting.
    #[error("buffer mapping was abandoned")]
    MapAbandoned,
    /// The data does not fit the device limits.
    #[error("{what} exceeds the device limit ({size} > {limit})")]
    TooLarge {
        /// The quantity that overflowed.
        what: &'static str,
        /// Requested size.
        size: u64,
        /// Device limit.
        limit: u64,
    },
}

/// Holds the WGPU device and queue plus the compiled kernels.
///
/// Initialized once globally and reused for all operations via `lazy_static`.
pub struct GpuContext {
    /// The actual GPU device.
    pub device: wgpu::Device,
    /// Submission queue for the device.
    pub queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipelines: Pipelines,
}

struct Pipelines {
    axpby: wgpu::ComputePipeline,
    scale: wgpu::ComputePipeline,
    hadamard: wgpu::ComputePipeline,
    matmul: wgpu::ComputePipeline,
    convolve: wgpu::ComputePipeline,
}

impl GpuContext {
    /// Selects the default adapter, creates a device and queue, and compiles
    /// every kernel.
    ///
    /// The device is requested with the adapter's own limits, so large
    /// matrices are bounded by the hardware rather than by the WebGPU
    /// defaults.
    ///
    /// # Errors
    /// - [`GpuFailure::Gpu`] if adapter or device acquisition fails
    /// - [`GpuFailure::Shader`] if a bundled shader fails validation
    pub fn new() -> core::result::Result<Self, GpuFailure> {
        let instance = wgpu::Instance::default();
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(GpuError::Adapter)?;
        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("linalg_dispatch"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(GpuError::Device)?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("linalg_bgl"),
            entries: &[
                buffer_entry(0, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(2, wgpu::BufferBindingType::Storage { read_only: true }),
                buffer_entry(3, wgpu::BufferBindingType::Storage { read_only: false }),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("linalg_pipeline_layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipelines = Pipelines {
            axpby: compute_pipeline(&device, &pipeline_layout, "axpby", AXPBY)?,
            scale: compute_pipeline(&device, &pipeline_layout, "scale", SCALE)?,
            hadamard: compute_pipeline(&device, &pipeline_layout, "hadamard", HADAMARD)?,
            matmul: compute_pipeline(&device, &pipeline_layout, "matmul", MATMUL)?,
            convolve: compute_pipeline(&device, &pipeline_layout, "convolve", CONVOLVE)?,
        };

        tracing::info!(
            adapter = %info.name,
            api = ?info.backend,
            device_type = ?info.device_type,
            "wgpu context ready"
        );

        Ok(Self {
            device,
            queue,
            layout,
            pipelines,
        })
    }
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Wrapper for bundled WGSL source, checked before it reaches the compiler.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 || !src.contains("fn main") {
            return Err(ValidationError);
        }

        // no source inclusion
        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError);
        }

        let forbidden = ["asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Validates a WGSL shader and compiles it on `device`.
///
/// # Errors
/// [`GpuFailure::Shader`] when the source is rejected.
pub fn load_shader(
    device: &wgpu::Device,
    label: &'static str,
    source: &str,
) -> core::result::Result<wgpu::ShaderModule, GpuFailure> {
    WgslSource(source)
        .validate()
        .map_err(|err| GpuFailure::Shader {
            label,
            reason: err.to_string(),
        })?;

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    }))
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    label: &'static str,
    source: &str,
) -> core::result::Result<wgpu::ComputePipeline, GpuFailure> {
    let module = load_shader(device, label, source)?;
    Ok(device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module: &module,
        entry_point: Some("main"),
        cache: None,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    }))
}

lazy_static::lazy_static! {
    static ref GPU_CONTEXT: core::result::Result<GpuContext, String> =
        GpuContext::new().map_err(|err| {
            tracing::warn!(error = %err, "wgpu context initialization failed");
            err.to_string()
        });
}

/// The shared GPU context, created on first use.
///
/// # Errors
/// [`GpuFailure::Unavailable`] when initialization failed; the failure is
/// remembered and reported on every later call.
pub fn context() -> core::result::Result<&'static GpuContext, GpuFailure> {
    GPU_CONTEXT
        .as_ref()
        .map_err(|reason| GpuFailure::Unavailable(reason.clone()))
}

fn to_device<T: Scalar>(data: &[T]) -> Vec<f32> {
    data.iter().map(|x| x.to_f32()).collect()
}

fn from_device<T: Scalar>(src: &[f32], dst: &mut [T]) {
    for (y, &x) in dst.iter_mut().zip(src) {
        *y = T::from_f32(x);
    }
}

fn f32_bytes(data: &[f32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn u32_bytes(data: &[u32]) -> Vec<u8> {
    data.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

fn bytes_to_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word.copy_from_slice(chunk);
            f32::from_ne_bytes(word)
        })
        .collect()
}

fn to_u32(what: &'static str, value: usize) -> core::result::Result<u32, GpuFailure> {
    u32::try_from(value).map_err(|_| GpuFailure::TooLarge {
        what,
        size: value as u64,
        limit: u64::from(u32::MAX),
    })
}

/// One compute dispatch.
struct Launch<'a> {
    label: &'static str,
    pipeline: &'a wgpu::ComputePipeline,
    /// Uniform block; a multiple of four words.
    params: &'a [u32],
    lhs: &'a [f32],
    /// Bound at binding 2; `lhs` is bound again when absent.
    rhs: Option<&'a [f32]>,
    /// Initial contents of the output buffer.
    out: &'a [f32],
    groups: (u32, u32),
}

/// Workgroup grid for `len` invocations of a linear shader, folded into a
/// second dimension when one dimension cannot hold it.
fn linear_groups(ctx: &GpuContext, len: usize) -> core::result::Result<(u32, u32), GpuFailure> {
    let max = ctx.device.limits().max_compute_workgroups_per_dimension;
    let groups = to_u32("element count", len)?.div_ceil(LINEAR_WORKGROUP);
    let x = groups.min(max);
    let y = groups.div_ceil(x.max(1));
    if y > max {
        return Err(GpuFailure::TooLarge {
            what: "workgroup count",
            size: u64::from(groups),
            limit: u64::from(max) * u64::from(max),
        });
    }
    Ok((x, y))
}

/// Workgroup grid for a `rows x cols` output of a tiled shader.
fn tiled_groups(
    ctx: &GpuContext,
    rows: usize,
    cols: usize,
) -> core::result::Result<(u32, u32), GpuFailure> {
    let max = ctx.device.limits().max_compute_workgroups_per_dimension;
    let x = to_u32("column count", cols)?.div_ceil(TILE);
    let y = to_u32("row count", rows)?.div_ceil(TILE);
    if x > max || y > max {
        return Err(GpuFailure::TooLarge {
            what: "workgroup count",
            size: u64::from(x.max(y)),
            limit: u64::from(max),
        });
    }
    Ok((x, y))
}

fn storage_buffer(
    ctx: &GpuContext,
    label: &'static str,
    data: &[f32],
    usage: wgpu::BufferUsages,
) -> core::result::Result<wgpu::Buffer, GpuFailure> {
    // zero-sized bindings are invalid; an empty input is never read anyway
    let padded = [0.0f32];
    let data = if data.is_empty() { &padded[..] } else { data };
    let size = (data.len() * 4) as u64;
    let limit = u64::from(ctx.device.limits().max_storage_buffer_binding_size);
    if size > limit {
        return Err(GpuFailure::TooLarge {
            what: "buffer size",
            size,
            limit,
        });
    }
    Ok(ctx
        .device
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &f32_bytes(data),
            usage,
        }))
}

/// Uploads the operands, runs one compute pass and returns the output buffer.
fn run(ctx: &GpuContext, launch: Launch<'_>) -> core::result::Result<Vec<f32>, GpuFailure> {
    let device = &ctx.device;
    tracing::debug!(
        kernel = launch.label,
        elements = launch.out.len(),
        groups_x = launch.groups.0,
        groups_y = launch.groups.1,
        "launching compute pass"
    );

    let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("params"),
        contents: &u32_bytes(launch.params),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let lhs = storage_buffer(ctx, "lhs", launch.lhs, wgpu::BufferUsages::STORAGE)?;
    let rhs = launch
        .rhs
        .map(|rhs| storage_buffer(ctx, "rhs", rhs, wgpu::BufferUsages::STORAGE))
        .transpose()?;
    let out = storage_buffer(
        ctx,
        "out",
        launch.out,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
    )?;
    let out_size = out.size();

    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(launch.label),
        layout: &ctx.layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lhs.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: rhs.as_ref().unwrap_or(&lhs).as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: out.as_entire_binding(),
            },
        ],
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some(launch.label),
    });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(launch.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(launch.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(launch.groups.0, launch.groups.1, 1);
    }

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("staging"),
        size: out_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    encoder.copy_buffer_to_buffer(&out, 0, &staging, 0, out_size);
    ctx.queue.submit(Some(encoder.finish()));

    let (tx, rx) = std::sync::mpsc::channel();
    let slice = staging.slice(..);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::PollType::Wait)?;
    rx.recv().map_err(|_| GpuFailure::MapAbandoned)??;

    let view = slice.get_mapped_range();
    let mut result = bytes_to_f32(&view);
    drop(view);
    staging.unmap();

    result.truncate(launch.out.len());
    Ok(result)
}

/// Runs a linear kernel over `len` elements with `alpha`, `beta` in the
/// parameter block.
fn run_linear<T: Scalar>(
    label: &'static str,
    pipeline: impl FnOnce(&Pipelines) -> &wgpu::ComputePipeline,
    lhs: &[T],
    rhs: Option<&[T]>,
    out: &mut [T],
    alpha: T,
    beta: T,
) -> Result<()> {
    if out.is_empty() {
        return Ok(());
    }
    let ctx = context()?;
    let params = [
        to_u32("element count", out.len())?,
        alpha.to_f32().to_bits(),
        beta.to_f32().to_bits(),
        0,
    ];
    let lhs = to_device(lhs);
    let rhs = rhs.map(to_device);
    let init = vec![0.0f32; out.len()];
    let result = run(
        ctx,
        Launch {
            label,
            pipeline: pipeline(&ctx.pipelines),
            params: &params,
            lhs: &lhs,
            rhs: rhs.as_deref(),
            out: &init,
            groups: linear_groups(ctx, out.len())?,
        },
    )?;
    from_device(&result, out);
    Ok(())
}

impl<M: Contiguous> AddKernel<M> for Wgpu {
    fn add(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()> {
        run_linear(
            "axpby",
            |p| &p.axpby,
            a.as_slice(),
            Some(b.as_slice()),
            c.as_mut_slice(),
            alpha,
            beta,
        )
    }
}

impl<M: Contiguous> ScaleKernel<M> for Wgpu {
    fn scale(a: &M, b: &mut M, alpha: M::Scalar) -> Result<()> {
        run_linear(
            "scale",
            |p| &p.scale,
            a.as_slice(),
            None,
            b.as_mut_slice(),
            alpha,
            M::Scalar::ZERO,
        )
    }
}

impl<M: Contiguous> ElementwiseProductKernel<M> for Wgpu {
    fn elementwise_product(a: &M, b: &M, c: &mut M) -> Result<()> {
        run_linear(
            "hadamard",
            |p| &p.hadamard,
            a.as_slice(),
            Some(b.as_slice()),
            c.as_mut_slice(),
            M::Scalar::ONE,
            M::Scalar::ZERO,
        )
    }
}

impl<M: Contiguous> ElementwiseSquareKernel<M> for Wgpu {
    type Output = DenseMatrix<M::Scalar>;

    fn elementwise_square(m: &M) -> Result<Self::Output> {
        let mut out = DenseMatrix::zeros(m.rows(), m.cols());
        Self::elementwise_square_into(m, &mut out)?;
        Ok(out)
    }

    fn elementwise_square_into<R>(m: &M, result: &mut R) -> Result<()>
    where
        R: SquareTarget<M::Scalar>,
    {
        let one = M::Scalar::ONE;
        let zero = M::Scalar::ZERO;
        if let Some(out) = result.as_contiguous_mut() {
            return run_linear("square", |p| &p.hadamard, m.as_slice(), None, out, one, zero);
        }

        let mut staged = vec![zero; m.len()];
        run_linear("square", |p| &p.hadamard, m.as_slice(), None, &mut staged, one, zero)?;
        let cols = m.cols();
        for (i, &x) in staged.iter().enumerate() {
            result.set(i / cols, i % cols, x);
        }
        Ok(())
    }
}

impl<M: Contiguous> MatrixProductKernel<M> for Wgpu {
    fn matrix_product(a: &M, b: &M, c: &mut M, options: ProductOptions) -> Result<()> {
        let (m, n) = (c.rows(), c.cols());
        if m == 0 || n == 0 {
            return Ok(());
        }
        let k = if options.transpose_a { a.rows() } else { a.cols() };
        let ctx = context()?;

        let flags = u32::from(options.transpose_a)
            | u32::from(options.transpose_b) << 1
            | u32::from(!options.overwrite) << 2;
        let params = [
            to_u32("row count", m)?,
            to_u32("inner dimension", k)?,
            to_u32("column count", n)?,
            flags,
        ];

        let lhs = to_device(a.as_slice());
        let rhs = to_device(b.as_slice());
        let init = if options.overwrite {
            vec![0.0f32; c.len()]
        } else {
            to_device(c.as_slice())
        };
        let result = run(
            ctx,
            Launch {
                label: "matmul",
                pipeline: &ctx.pipelines.matmul,
                params: &params,
                lhs: &lhs,
                rhs: Some(&rhs),
                out: &init,
                groups: tiled_groups(ctx, m, n)?,
            },
        )?;
        from_device(&result, c.as_mut_slice());
        Ok(())
    }
}

impl<M: Contiguous> ConvolveKernel<M> for Wgpu {
    fn convolve(x: &M, w: &M, y: &mut M, options: ConvolveOptions) -> Result<()> {
        let (out_h, out_w) = (y.rows(), y.cols());
        if out_h == 0 || out_w == 0 {
            return Ok(());
        }
        let ctx = context()?;

        let flags = u32::from(options.flip) | u32::from(!options.overwrite) << 1;
        let params = [
            to_u32("input width", x.cols())?,
            to_u32("input height", x.rows())?,
            to_u32("filter width", w.cols())?,
            to_u32("filter height", w.rows())?,
            to_u32("output width", out_w)?,
            to_u32("output height", out_h)?,
            to_u32("column stride", options.stride_x)?,
            to_u32("row stride", options.stride_y)?,
            flags,
            0,
            0,
            0,
        ];

        let input = to_device(x.as_slice());
        let filter = to_device(w.as_slice());
        let init = if options.overwrite {
            vec![0.0f32; y.len()]
        } else {
            to_device(y.as_slice())
        };
        let result = run(
            ctx,
            Launch {
                label: "convolve",
                pipeline: &ctx.pipelines.convolve,
                params: &params,
                lhs: &input,
                rhs: Some(&filter),
                out: &init,
                groups: tiled_groups(ctx, out_h, out_w)?,
            },
        )?;
        from_device(&result, y.as_mut_slice());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_shaders_pass_validation() {
        for source in [AXPBY, SCALE, HADAMARD, MATMUL, CONVOLVE] {
            assert!(WgslSource(source).validate().is_ok());
        }
    }

    #[test]
    fn shader_validation_rejects_inclusion() {
        assert!(WgslSource("#include \"x.wgsl\"\nfn main() {}").validate().is_err());
        assert!(WgslSource("@compute fn entry() {}").validate().is_err());
    }

    #[test]
    fn byte_conversions_preserve_values() {
        let values = [1.5f32, -0.0, f32::MAX, 3.25];
        assert_eq!(bytes_to_f32(&f32_bytes(&values)), values);
        assert_eq!(u32_bytes(&[1, 2]).len(), 8);
    }
}
