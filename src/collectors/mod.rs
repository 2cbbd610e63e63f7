pub mod cpu;
pub mod disk;
pub mod filesystem;
pub mod memory;
pub mod network;

pub use cpu::{CpuCollector, CpuStats};
pub use disk::DiskCollector;
pub use filesystem::{FilesystemCollector, FilesystemStats, MountUsage};
pub use memory::{MemoryCollector, MemoryStats};
pub use network::NetworkCollector;
