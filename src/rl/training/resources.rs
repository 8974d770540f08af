//! Resource Allocation
//!
//! Checks a run's CPU and accelerator request against what the host offers
//! before any worker is started.

use tracing::{info, warn};

use crate::error::TrainError;

/// What the host can provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableResources {
    pub cpus: usize,
    pub gpus: usize,
}

impl AvailableResources {
    /// Probe the host. The learner has no accelerator backend, so no GPUs
    /// are ever reported.
    pub fn detect() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { cpus, gpus: 0 }
    }
}

/// Granted resources for a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub num_workers: usize,
    pub num_gpus: usize,
    /// More threads requested than CPUs available
    pub oversubscribed: bool,
}

/// Allocate `num_workers` rollout workers plus the driver and `num_gpus`
/// accelerators.
pub fn allocate(
    num_workers: usize,
    num_gpus: usize,
    available: AvailableResources,
) -> Result<Allocation, TrainError> {
    if num_gpus > available.gpus {
        return Err(TrainError::ResourceAllocation {
            resource: "GPU",
            requested: num_gpus,
            available: available.gpus,
        });
    }

    // The driver thread runs the learner
    let requested_cpus = num_workers + 1;
    let oversubscribed = requested_cpus > available.cpus;
    if oversubscribed {
        warn!(
            requested = requested_cpus,
            available = available.cpus,
            "More rollout workers than CPUs; workers will share cores"
        );
    }

    info!(num_workers, num_gpus, cpus = available.cpus, "Resources allocated");

    Ok(Allocation {
        num_workers,
        num_gpus,
        oversubscribed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_request_fails_without_backend() {
        let err = allocate(1, 1, AvailableResources { cpus: 8, gpus: 0 }).unwrap_err();
        assert!(matches!(
            err,
            TrainError::ResourceAllocation {
                resource: "GPU",
                requested: 1,
                available: 0
            }
        ));
    }

    #[test]
    fn test_cpu_oversubscription_is_allowed() {
        let alloc = allocate(16, 0, AvailableResources { cpus: 4, gpus: 0 }).unwrap();
        assert!(alloc.oversubscribed);
        assert_eq!(alloc.num_workers, 16);
    }

    #[test]
    fn test_fitting_request() {
        let alloc = allocate(3, 0, AvailableResources { cpus: 4, gpus: 0 }).unwrap();
        assert!(!alloc.oversubscribed);
    }

    #[test]
    fn test_detect_reports_at_least_one_cpu() {
        let res = AvailableResources::detect();
        assert!(res.cpus >= 1);
        assert_eq!(res.gpus, 0);
    }
}
