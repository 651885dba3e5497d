//! Compute device selection for the generation model.

use std::fmt;

use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

use crate::config::DevicePreference;

/// Device the generation model runs on, resolved once per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    /// Resolve a configured preference against what the runtime offers.
    ///
    /// `Auto` picks CUDA only when ONNX Runtime reports the provider as
    /// available. An explicit `Cuda` is honored as-is; if the provider cannot
    /// be registered the model load fails instead of silently falling back.
    pub fn resolve(preference: DevicePreference) -> Self {
        match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => Device::Cuda,
            DevicePreference::Auto => {
                if cuda_available() {
                    Device::Cuda
                } else {
                    Device::Cpu
                }
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

fn cuda_available() -> bool {
    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            tracing::debug!("CUDA availability check failed: {e}");
            false
        }
    }
}
