mod kernels;

use parking_lot::RwLock;

use super::{validate_dispatch, BufferDesc, ComputeBackend, Kernel, KernelSource};
use crate::common::{Error, Result};
use crate::tables::BINS;

/// Host-memory buffer. Storage is kept in words so `i32` views are always aligned.
#[derive(Debug)]
pub struct CpuBuffer {
    desc: BufferDesc,
    words: RwLock<Vec<u32>>,
}

impl CpuBuffer {
    fn new(desc: BufferDesc) -> Result<Self> {
        let len = desc.size_in_bytes()?.div_ceil(4);

        let mut words = Vec::new();
        words.try_reserve_exact(len).map_err(|e| {
            Error::DeviceResource(format!("failed to allocate '{}': {}", desc.label, e))
        })?;
        words.resize(len, 0);

        Ok(Self {
            desc,
            words: RwLock::new(words),
        })
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }
}

#[derive(Debug)]
pub struct CpuProgram {
    label: String,
    kernels: Vec<Kernel>,
}

/// Data-parallel backend running native kernels on the rayon thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Program = CpuProgram;

    fn name(&self) -> String {
        format!("CPU (rayon, {} threads)", rayon::current_num_threads())
    }

    fn compile(&self, source: &KernelSource) -> Result<CpuProgram> {
        let problems = source.structural_problems();
        if !problems.is_empty() {
            let log = problems.join("\n");
            log::error!("Build log for '{}':\n{}", source.label, log);
            return Err(Error::KernelBuild {
                label: source.label.clone(),
                log,
            });
        }

        Ok(CpuProgram {
            label: source.label.clone(),
            kernels: source.kernels.iter().map(|(kernel, _)| *kernel).collect(),
        })
    }

    fn allocate(&self, desc: BufferDesc) -> Result<CpuBuffer> {
        CpuBuffer::new(desc)
    }

    fn buffer_desc<'b>(&self, buffer: &'b CpuBuffer) -> &'b BufferDesc {
        &buffer.desc
    }

    fn write(&self, buffer: &CpuBuffer, offset: usize, data: &[u8]) -> Result<()> {
        buffer.desc.check_transfer(offset, data.len())?;

        let mut words = buffer.words.write();
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        bytes[offset..offset + data.len()].copy_from_slice(data);

        Ok(())
    }

    fn read(&self, buffer: &CpuBuffer, offset: usize, out: &mut [u8]) -> Result<()> {
        buffer.desc.check_transfer(offset, out.len())?;

        let words = buffer.words.read();
        let bytes: &[u8] = bytemuck::cast_slice(words.as_slice());
        out.copy_from_slice(&bytes[offset..offset + out.len()]);

        Ok(())
    }

    fn dispatch(
        &self,
        program: &CpuProgram,
        kernel: Kernel,
        args: &[&CpuBuffer],
        problem_size: usize,
    ) -> Result<()> {
        if !program.kernels.contains(&kernel) {
            return Err(Error::dispatch(
                kernel,
                format!("kernel is not part of program '{}'", program.label),
            ));
        }
        validate_dispatch(kernel, args, CpuBuffer::desc, problem_size)?;

        // Arguments are distinct buffers once validated, so taking one lock per
        // argument cannot deadlock.
        match kernel {
            Kernel::Histogram => {
                let image = args[0].words.read();
                let mut bins = args[1].words.write();
                kernels::histogram(bytes(&image, problem_size), ints_mut(&mut bins, BINS));
            }
            Kernel::Cumulative => {
                let histogram = args[0].words.read();
                let mut cumulative = args[1].words.write();
                kernels::cumulative(
                    ints(&histogram, problem_size),
                    ints_mut(&mut cumulative, problem_size),
                );
            }
            Kernel::Lut => {
                let cumulative = args[0].words.read();
                let mut lut = args[1].words.write();
                kernels::lut_scale(
                    ints(&cumulative, problem_size),
                    ints_mut(&mut lut, problem_size),
                );
            }
            Kernel::Reproject => {
                let image = args[0].words.read();
                let lut = args[1].words.read();
                let mut output = args[2].words.write();
                kernels::reproject(
                    bytes(&image, problem_size),
                    ints(&lut, BINS),
                    bytes_mut(&mut output, problem_size),
                );
            }
        }

        Ok(())
    }

    /// Kernels join their rayon scope before `dispatch` returns.
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}

fn bytes(words: &[u32], len: usize) -> &[u8] {
    &bytemuck::cast_slice::<u32, u8>(words)[..len]
}

fn bytes_mut(words: &mut [u32], len: usize) -> &mut [u8] {
    &mut bytemuck::cast_slice_mut::<u32, u8>(words)[..len]
}

fn ints(words: &[u32], len: usize) -> &[i32] {
    &bytemuck::cast_slice::<u32, i32>(words)[..len]
}

fn ints_mut(words: &mut [u32], len: usize) -> &mut [i32] {
    &mut bytemuck::cast_slice_mut::<u32, i32>(words)[..len]
}
