//! Architecture facade: the only place that touches raw
//! instructions, MSRs, port I/O, or TLB/IPI hardware directly. x86_64 is the
//! fully implemented target; RISC-V64 is carried as a set of hooks with the
//! same signatures so the rest of the kernel never branches on architecture.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::*;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub mod riscv;

#[cfg(target_arch = "riscv64")]
pub mod riscv64;

#[cfg(target_arch = "riscv64")]
pub use riscv64::*;

// Common timer module
pub mod timer;

// Common context module
pub mod context;

// Architecture-independent memory barrier and entropy facades, shared by
// both targets so non-arch code never branches on `target_arch` directly.
pub mod barriers;
pub mod entropy;

// Serial initialization is handled per-architecture
