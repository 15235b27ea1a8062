use std::process::ExitStatus;

use anyhow::Result;
use log::{debug, info};
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};

use crate::governor::handle::TerminationReason;

/// Apply a hard data-segment ceiling to the current process.
///
/// Both the soft and the hard limit are lowered to `limit` (or to the
/// current hard maximum when that is lower), so the process cannot raise
/// it again. Children inherit the ceiling and may only tighten it.
/// `0` means unlimited and leaves the process untouched.
#[cfg(unix)]
pub fn apply_memory_limit(limit: u64) -> Result<()> {
    use anyhow::Context;
    use std::io;

    if limit == 0 {
        debug!("No memory limit requested");
        return Ok(());
    }

    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit only writes into the rlimit struct we own
    if unsafe { libc::getrlimit(libc::RLIMIT_DATA, &mut current) } != 0 {
        return Err(io::Error::last_os_error()).context("Failed to read data segment limit");
    }

    let ceiling = (limit as libc::rlim_t).min(current.rlim_max);
    let requested = libc::rlimit {
        rlim_cur: ceiling,
        rlim_max: ceiling,
    };
    // SAFETY: setrlimit only reads the rlimit struct we pass
    if unsafe { libc::setrlimit(libc::RLIMIT_DATA, &requested) } != 0 {
        return Err(io::Error::last_os_error()).context("Failed to set data segment limit");
    }

    info!("Data segment limit set to {} bytes", ceiling);
    Ok(())
}

#[cfg(not(unix))]
pub fn apply_memory_limit(limit: u64) -> Result<()> {
    if limit > 0 {
        log::warn!("Memory limits are not supported on this platform, ignoring {} bytes", limit);
    }
    Ok(())
}

/// Classify how a worker process ended.
///
/// The OS enforces the memory ceiling by failing allocations, which Rust
/// turns into an abort, or by killing the process outright. Those signals
/// read as `MemoryExceeded`; every other abnormal end is `Crashed`.
pub fn classify_exit(status: &ExitStatus) -> TerminationReason {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return match signal {
                libc::SIGKILL | libc::SIGABRT | libc::SIGSEGV => TerminationReason::MemoryExceeded,
                _ => TerminationReason::Crashed,
            };
        }
    }

    if status.success() {
        TerminationReason::Shutdown
    } else {
        TerminationReason::Crashed
    }
}

/// Resident memory sampling for live processes.
pub struct MemorySampler {
    system: System,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self { system: System::new() }
    }

    /// Resident memory of `pid` in bytes, `None` once the process is gone
    pub fn sample(&mut self, pid: u32) -> Option<u64> {
        let pid = Pid::from_u32(pid);
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system.process(pid).map(|process| process.memory())
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_is_noop() {
        apply_memory_limit(0).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_soft_and_hard_limits_are_lowered() {
        let limit: u64 = 1 << 60;
        apply_memory_limit(limit).unwrap();

        let mut current = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_DATA, &mut current) }, 0);
        assert!(current.rlim_cur as u64 <= limit);
        assert!(current.rlim_max as u64 <= limit);
        assert_eq!(current.rlim_cur, current.rlim_max);

        // A lower ceiling still applies, a higher one cannot lift it
        apply_memory_limit(1 << 59).unwrap();
        apply_memory_limit(limit).unwrap();
        assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_DATA, &mut current) }, 0);
        assert!(current.rlim_max as u64 <= 1 << 59);
    }

    #[test]
    fn test_sample_own_process() {
        let mut sampler = MemorySampler::new();
        let used = sampler.sample(std::process::id()).unwrap();
        assert!(used > 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exit() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(classify_exit(&ExitStatus::from_raw(0)), TerminationReason::Shutdown);
        assert_eq!(classify_exit(&ExitStatus::from_raw(1 << 8)), TerminationReason::Crashed);
        assert_eq!(classify_exit(&ExitStatus::from_raw(libc::SIGKILL)), TerminationReason::MemoryExceeded);
        assert_eq!(classify_exit(&ExitStatus::from_raw(libc::SIGABRT)), TerminationReason::MemoryExceeded);
        assert_eq!(classify_exit(&ExitStatus::from_raw(libc::SIGTERM)), TerminationReason::Crashed);
    }
}
