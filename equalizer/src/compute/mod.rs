//! Compute backend contract and the kernel catalogue shared by all backends.
//!
//! A backend exposes the handful of device primitives the pipeline needs:
//! compile a program, allocate buffers, move bytes between host and device,
//! dispatch a kernel over a problem size and fence on completion.

mod cpu;
#[cfg(feature = "wgpu")]
mod gpu;

pub use cpu::{CpuBackend, CpuBuffer, CpuProgram};
#[cfg(feature = "wgpu")]
pub use gpu::{Gpu, GpuBackend, GpuBuffer, GpuProgram};

use crate::common::{Error, Result};
use crate::tables::BINS;

const PARAMS_WGSL: &str = include_str!("shaders/params.wgsl");
const HIST_WGSL: &str = include_str!("shaders/hist.wgsl");
const CUM_HIST_WGSL: &str = include_str!("shaders/cum_hist.wgsl");
const LUT_SCALE_WGSL: &str = include_str!("shaders/lut_scale.wgsl");
const REPROJ_WGSL: &str = include_str!("shaders/reproj.wgsl");

/// Element type stored in a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ElementType {
    #[strum(serialize = "u8")]
    U8,
    #[strum(serialize = "i32")]
    I32,
}

impl ElementType {
    pub fn size(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::I32 => 4,
        }
    }
}

/// Kernel-side access mode of a device buffer. Host transfers ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl BufferAccess {
    pub fn kernel_can_read(self) -> bool {
        self != BufferAccess::WriteOnly
    }

    pub fn kernel_can_write(self) -> bool {
        self != BufferAccess::ReadOnly
    }
}

/// Logical description of a device buffer. Sizes derive from element count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub elem: ElementType,
    pub len: usize,
    pub access: BufferAccess,
}

impl BufferDesc {
    pub fn new(label: &'static str, elem: ElementType, len: usize, access: BufferAccess) -> Self {
        Self {
            label,
            elem,
            len,
            access,
        }
    }

    pub fn size_in_bytes(&self) -> Result<usize> {
        self.len.checked_mul(self.elem.size()).ok_or_else(|| {
            Error::DeviceResource(format!(
                "buffer '{}' of {} {} elements does not fit in memory",
                self.label, self.len, self.elem
            ))
        })
    }

    /// Validates a host transfer of `len` bytes starting at byte `offset`.
    pub fn check_transfer(&self, offset: usize, len: usize) -> Result<()> {
        if offset % self.elem.size() != 0 {
            return Err(Error::DeviceResource(format!(
                "transfer offset {} into '{}' is not aligned to {} elements",
                offset, self.label, self.elem
            )));
        }

        let size = self.size_in_bytes()?;
        let in_range = offset.checked_add(len).is_some_and(|end| end <= size);
        if !in_range {
            return Err(Error::DeviceResource(format!(
                "transfer of {} bytes at offset {} exceeds '{}' ({} bytes)",
                len,
                offset,
                self.label, size
            )));
        }

        Ok(())
    }
}

/// How a kernel touches one of its arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgAccess {
    Read,
    Write,
    ReadWrite,
}

impl ArgAccess {
    pub fn reads(self) -> bool {
        self != ArgAccess::Write
    }

    pub fn writes(self) -> bool {
        self != ArgAccess::Read
    }
}

/// Number of elements a kernel argument must hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extent {
    /// At least one element per work-item.
    WorkItems,
    /// Exactly one element per intensity level.
    Bins,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub access: ArgAccess,
    pub elem: ElementType,
    pub extent: Extent,
}

const fn arg(
    name: &'static str,
    access: ArgAccess,
    elem: ElementType,
    extent: Extent,
) -> ArgSpec {
    ArgSpec {
        name,
        access,
        elem,
        extent,
    }
}

/// The four equalization kernels. `Display` yields the entry-point name.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
pub enum Kernel {
    #[strum(serialize = "hist")]
    Histogram,
    #[strum(serialize = "cum_hist")]
    Cumulative,
    #[strum(serialize = "lut_scale")]
    Lut,
    #[strum(serialize = "reproj")]
    Reproject,
}

impl Kernel {
    pub fn entry_point(self) -> &'static str {
        self.into()
    }

    /// Ordered argument list; argument `i` binds to slot `i + 1` on the GPU.
    pub fn args(self) -> &'static [ArgSpec] {
        use ArgAccess::*;
        use ElementType::*;
        use Extent::*;

        const HISTOGRAM: &[ArgSpec] = &[
            arg("image", Read, U8, WorkItems),
            arg("histogram", ReadWrite, I32, Bins),
        ];
        const CUMULATIVE: &[ArgSpec] = &[
            arg("histogram", Read, I32, WorkItems),
            arg("cumulative", Write, I32, WorkItems),
        ];
        const LUT: &[ArgSpec] = &[
            arg("cumulative", Read, I32, WorkItems),
            arg("lut", Write, I32, WorkItems),
        ];
        const REPROJECT: &[ArgSpec] = &[
            arg("image", Read, U8, WorkItems),
            arg("lut", Read, I32, Bins),
            arg("output", Write, U8, WorkItems),
        ];

        match self {
            Kernel::Histogram => HISTOGRAM,
            Kernel::Cumulative => CUMULATIVE,
            Kernel::Lut => LUT,
            Kernel::Reproject => REPROJECT,
        }
    }

    /// Kernels that work on the bin tables only accept exactly `BINS` work-items.
    pub fn fixed_problem_size(self) -> Option<usize> {
        match self {
            Kernel::Cumulative | Kernel::Lut => Some(BINS),
            Kernel::Histogram | Kernel::Reproject => None,
        }
    }

    fn wgsl(self) -> &'static str {
        match self {
            Kernel::Histogram => HIST_WGSL,
            Kernel::Cumulative => CUM_HIST_WGSL,
            Kernel::Lut => LUT_SCALE_WGSL,
            Kernel::Reproject => REPROJ_WGSL,
        }
    }
}

/// Kernel program source: one WGSL module per kernel.
///
/// The CPU backend runs native kernels and only uses the kernel list.
#[derive(Clone, Debug)]
pub struct KernelSource {
    pub label: String,
    pub kernels: Vec<(Kernel, String)>,
}

impl KernelSource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kernels: Vec::new(),
        }
    }

    /// Adds a kernel module. The shared `Params` uniform declaration is prepended.
    pub fn with_kernel(mut self, kernel: Kernel, wgsl: &str) -> Self {
        self.kernels
            .push((kernel, format!("{}\n{}", PARAMS_WGSL, wgsl)));
        self
    }

    /// All four equalization kernels.
    pub fn equalization() -> Self {
        use strum::IntoEnumIterator;

        Kernel::iter().fold(Self::new("equalization"), |source, kernel| {
            source.with_kernel(kernel, kernel.wgsl())
        })
    }

    pub fn contains(&self, kernel: Kernel) -> bool {
        self.kernels.iter().any(|(k, _)| *k == kernel)
    }

    /// Problems that make the kernel list unbuildable, one per line.
    pub(crate) fn structural_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.kernels.is_empty() {
            problems.push("program contains no kernels".to_string());
        }
        for (index, (kernel, _)) in self.kernels.iter().enumerate() {
            if self.kernels[..index].iter().any(|(k, _)| k == kernel) {
                problems.push(format!("kernel '{}' is defined more than once", kernel));
            }
        }
        problems
    }
}

/// Device primitives the equalization pipeline is built on.
///
/// `write`, `read` and `synchronize` block until the device has finished;
/// `dispatch` may return before the kernel has completed, so callers fence
/// with `synchronize` before depending on a kernel's writes.
pub trait ComputeBackend {
    type Buffer;
    type Program;

    /// Human-readable platform and device description.
    fn name(&self) -> String;

    fn compile(&self, source: &KernelSource) -> Result<Self::Program>;

    fn allocate(&self, desc: BufferDesc) -> Result<Self::Buffer>;

    fn buffer_desc<'b>(&self, buffer: &'b Self::Buffer) -> &'b BufferDesc;

    fn write(&self, buffer: &Self::Buffer, offset: usize, data: &[u8]) -> Result<()>;

    fn read(&self, buffer: &Self::Buffer, offset: usize, out: &mut [u8]) -> Result<()>;

    fn dispatch(
        &self,
        program: &Self::Program,
        kernel: Kernel,
        args: &[&Self::Buffer],
        problem_size: usize,
    ) -> Result<()>;

    fn synchronize(&self) -> Result<()>;
}

/// Checks a dispatch against the kernel's argument list before any device work.
pub(crate) fn validate_dispatch<T>(
    kernel: Kernel,
    args: &[&T],
    desc_of: impl Fn(&T) -> &BufferDesc,
    problem_size: usize,
) -> Result<()> {
    let specs = kernel.args();
    if args.len() != specs.len() {
        return Err(Error::dispatch(
            kernel,
            format!("expected {} arguments, got {}", specs.len(), args.len()),
        ));
    }

    if let Some(fixed) = kernel.fixed_problem_size() {
        if problem_size != fixed {
            return Err(Error::dispatch(
                kernel,
                format!(
                    "problem size must be {} elements, got {}",
                    fixed, problem_size
                ),
            ));
        }
    }

    for (index, (spec, buffer)) in specs.iter().zip(args).enumerate() {
        let desc = desc_of(buffer);

        if desc.elem != spec.elem {
            return Err(Error::dispatch(
                kernel,
                format!(
                    "argument {} '{}' expects {} elements, buffer '{}' holds {}",
                    index, spec.name, spec.elem, desc.label, desc.elem
                ),
            ));
        }
        if spec.access.reads() && !desc.access.kernel_can_read() {
            return Err(Error::dispatch(
                kernel,
                format!(
                    "buffer '{}' is write-only but argument '{}' is read",
                    desc.label, spec.name
                ),
            ));
        }
        if spec.access.writes() && !desc.access.kernel_can_write() {
            return Err(Error::dispatch(
                kernel,
                format!(
                    "buffer '{}' is read-only but argument '{}' is written",
                    desc.label, spec.name
                ),
            ));
        }

        let extent_ok = match spec.extent {
            Extent::WorkItems => desc.len >= problem_size,
            Extent::Bins => desc.len == BINS,
        };
        if !extent_ok {
            return Err(Error::dispatch(
                kernel,
                format!(
                    "buffer '{}' has {} elements, argument '{}' needs {:?} for problem size {}",
                    desc.label, desc.len, spec.name, spec.extent, problem_size
                ),
            ));
        }

        if spec.access.writes() {
            let aliased = args
                .iter()
                .enumerate()
                .any(|(other, buf)| other != index && std::ptr::eq(*buf, *buffer));
            if aliased {
                return Err(Error::dispatch(
                    kernel,
                    format!(
                        "written buffer '{}' is also bound to another argument",
                        desc.label
                    ),
                ));
            }
        }
    }

    Ok(())
}
