// SPDX-License-Identifier: Apache-2.0

//! Kernel descriptors and reference datasets.
//!
//! The kernel bodies themselves are external; the engine only needs each
//! kernel's argument-port shape to drive buffer allocation and marshalling,
//! plus a preloaded input and reference output to validate results against.
//! Words are 32-bit, matching the accelerator data type.

use awm_config::{KERNEL_KINDS, KernelId};

/// Direction of an argument port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Written by the host before execution.
    Input,
    /// Read back by the host after execution.
    Output,
    /// Written before and read back after.
    InOut,
}

impl PortDirection {
    /// Whether the host marshals input bytes into this port.
    #[must_use]
    pub fn takes_input(self) -> bool {
        matches!(self, Self::Input | Self::InOut)
    }

    /// Whether the host demarshals output bytes from this port.
    #[must_use]
    pub fn yields_output(self) -> bool {
        matches!(self, Self::Output | Self::InOut)
    }
}

/// One argument port of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    /// Port name, as known to the accelerator runtime.
    pub name: &'static str,
    /// Port direction.
    pub direction: PortDirection,
    /// 32-bit words transferred per execution.
    pub words: usize,
}

impl PortSpec {
    /// Bytes transferred per execution.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.words * 4
    }
}

/// Fixed description of a kernel's host-visible interface.
#[derive(Debug, Clone, Copy)]
pub struct KernelDescriptor {
    /// The kernel this describes.
    pub kernel: KernelId,
    /// Argument ports, in marshalling order.
    pub ports: &'static [PortSpec],
    /// Baseline execution cost for one run on one compute unit, in
    /// microseconds. Used by the simulated accelerator.
    pub base_cost_us: u64,
}

impl KernelDescriptor {
    /// Bytes of the kernel's fixed-size input struct (one execution).
    #[must_use]
    pub fn input_bytes(&self) -> usize {
        self.ports
            .iter()
            .filter(|p| p.direction.takes_input())
            .map(PortSpec::bytes)
            .sum()
    }

    /// Bytes of the kernel's output (one execution).
    #[must_use]
    pub fn output_bytes(&self) -> usize {
        self.ports
            .iter()
            .filter(|p| p.direction.yields_output())
            .map(PortSpec::bytes)
            .sum()
    }
}

use PortDirection::{InOut, Input, Output};

macro_rules! port {
    ($name:literal, $dir:expr, $words:expr) => {
        PortSpec {
            name: $name,
            direction: $dir,
            words: $words,
        }
    };
}

static DESCRIPTORS: [KernelDescriptor; KERNEL_KINDS] = [
    KernelDescriptor {
        kernel: KernelId::Aes,
        ports: &[
            port!("aes_key", Input, 32),
            port!("aes_enckey", Input, 32),
            port!("aes_deckey", Input, 1),
            port!("aes_k", Input, 32),
            port!("aes_buf", InOut, 16),
        ],
        base_cost_us: 1800,
    },
    KernelDescriptor {
        kernel: KernelId::Bulk,
        ports: &[
            port!("bulk_edges", Input, 4096),
            port!("bulk_pack", InOut, 779),
        ],
        base_cost_us: 3600,
    },
    KernelDescriptor {
        kernel: KernelId::Crs,
        ports: &[
            port!("crs_val", Input, 1666),
            port!("crs_cols", Input, 1666),
            port!("crs_rowDelimiters", Input, 495),
            port!("crs_vec", Input, 494),
            port!("crs_out", Output, 494),
        ],
        base_cost_us: 2400,
    },
    KernelDescriptor {
        kernel: KernelId::Kmp,
        ports: &[
            port!("kmp_input", Input, 4096),
            port!("kmp_pack", InOut, 9),
        ],
        base_cost_us: 1500,
    },
    KernelDescriptor {
        kernel: KernelId::Knn,
        ports: &[
            port!("knn_nl", Input, 4096),
            port!("knn_pack", InOut, 1536),
        ],
        base_cost_us: 4200,
    },
    KernelDescriptor {
        kernel: KernelId::Merge,
        ports: &[port!("merge_a", InOut, 2048)],
        base_cost_us: 2000,
    },
    KernelDescriptor {
        kernel: KernelId::Nw,
        ports: &[
            port!("nw_m", Input, 4225),
            port!("nw_ptr", Input, 4225),
            port!("nw_pack", InOut, 384),
        ],
        base_cost_us: 3000,
    },
    KernelDescriptor {
        kernel: KernelId::Queue,
        ports: &[
            port!("queue_edges", Input, 4096),
            port!("queue_pack", InOut, 779),
        ],
        base_cost_us: 3800,
    },
    KernelDescriptor {
        kernel: KernelId::Stencil2d,
        ports: &[
            port!("stencil2d_orig", Input, 8192),
            port!("stencil2d_sol", Output, 8192),
            port!("stencil2d_filter", Input, 9),
        ],
        base_cost_us: 2800,
    },
    KernelDescriptor {
        kernel: KernelId::Stencil3d,
        ports: &[
            port!("stencil3d_orig", Input, 16384),
            port!("stencil3d_sol", Output, 16384),
            port!("stencil3d_c", Input, 2),
        ],
        base_cost_us: 5200,
    },
    KernelDescriptor {
        kernel: KernelId::Strided,
        ports: &[
            port!("strided_real", InOut, 1024),
            port!("strided_img", InOut, 1024),
            port!("strided_real_twid", Input, 512),
            port!("strided_img_twid", Input, 512),
        ],
        base_cost_us: 2600,
    },
];

/// The descriptor of `kernel`.
#[must_use]
pub fn descriptor(kernel: KernelId) -> &'static KernelDescriptor {
    &DESCRIPTORS[kernel.index()]
}

/// The byte-local transform the simulated accelerator applies to output
/// data. Each kernel gets a distinct constant so cross-kernel mixups fail
/// validation.
#[must_use]
pub fn golden(kernel: KernelId, byte: u8) -> u8 {
    byte.wrapping_add(0x3B ^ (kernel.index() as u8).wrapping_mul(29))
        .rotate_left((kernel.index() as u32 % 7) + 1)
}

/// Preloaded inputs and reference outputs, one pair per kernel.
///
/// Owned for the lifetime of the run; workers deep-copy the input of their
/// kernel per dispatch.
#[derive(Debug)]
pub struct KernelDataset {
    inputs: Vec<Vec<u8>>,
    references: Vec<Vec<u8>>,
}

impl Default for KernelDataset {
    fn default() -> Self {
        Self::generate()
    }
}

impl KernelDataset {
    /// Deterministically generates inputs and the matching references.
    #[must_use]
    pub fn generate() -> Self {
        let mut inputs = Vec::with_capacity(KERNEL_KINDS);
        let mut references = Vec::with_capacity(KERNEL_KINDS);
        for kernel in KernelId::ALL {
            let desc = descriptor(kernel);
            let input = synthetic_bytes(kernel, desc.input_bytes());
            let reference = reference_for(kernel, &input);
            inputs.push(input);
            references.push(reference);
        }
        Self { inputs, references }
    }

    /// Deep copy of the input struct for one execution of `kernel`.
    #[must_use]
    pub fn clone_input(&self, kernel: KernelId) -> Vec<u8> {
        self.inputs[kernel.index()].clone()
    }

    /// The reference output for one execution of `kernel`.
    #[must_use]
    pub fn reference(&self, kernel: KernelId) -> &[u8] {
        &self.references[kernel.index()]
    }

    /// Whether `output` matches the reference for `kernel`.
    #[must_use]
    pub fn validate(&self, kernel: KernelId, output: &[u8]) -> bool {
        self.references[kernel.index()].as_slice() == output
    }
}

/// Expected output of one execution given the marshalled input.
///
/// In-out ports transform their input bytes; output-only ports transform the
/// zero-initialised device buffer.
#[must_use]
pub fn reference_for(kernel: KernelId, input: &[u8]) -> Vec<u8> {
    let desc = descriptor(kernel);
    let mut reference = Vec::with_capacity(desc.output_bytes());
    let mut input_at = 0;
    for spec in desc.ports {
        match spec.direction {
            Input => input_at += spec.bytes(),
            InOut => {
                reference.extend(
                    input[input_at..input_at + spec.bytes()]
                        .iter()
                        .map(|&b| golden(kernel, b)),
                );
                input_at += spec.bytes();
            }
            Output => reference.extend(std::iter::repeat_n(golden(kernel, 0), spec.bytes())),
        }
    }
    reference
}

fn synthetic_bytes(kernel: KernelId, len: usize) -> Vec<u8> {
    // xorshift keyed by kernel index; reproducible across runs.
    let mut state = 0x9E37_79B9u32 ^ ((kernel.index() as u32 + 1) << 16);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kernel_has_an_output_port() {
        for kernel in KernelId::ALL {
            let desc = descriptor(kernel);
            assert_eq!(desc.kernel, kernel);
            assert!(desc.output_bytes() > 0, "{kernel} yields no output");
            assert!(desc.input_bytes() > 0, "{kernel} takes no input");
        }
    }

    #[test]
    fn dataset_validates_its_own_references() {
        let dataset = KernelDataset::generate();
        for kernel in KernelId::ALL {
            let input = dataset.clone_input(kernel);
            assert_eq!(input.len(), descriptor(kernel).input_bytes());
            let output = reference_for(kernel, &input);
            assert!(dataset.validate(kernel, &output));
            // A corrupted output must fail.
            let mut bad = output.clone();
            bad[0] = bad[0].wrapping_add(1);
            assert!(!dataset.validate(kernel, &bad));
        }
    }

    #[test]
    fn golden_transform_differs_across_kernels() {
        assert_ne!(
            golden(KernelId::Aes, 0x11),
            golden(KernelId::Bulk, 0x11)
        );
    }
}
