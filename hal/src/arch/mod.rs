//! # Architecture Support
//!
//! One submodule per supported CPU architecture. Corten's interrupt-vector
//! subsystem currently models IA-32 only; the module boundary is where
//! further architectures would slot in.

pub mod x86;
