//! Architecture-dependent code: the aarch64 primitives [`hal_impl::AarchHal`]
//! bridges into [`crate::hal::Hal`].

pub mod arm;
pub mod hal_impl;

pub use hal_impl::AarchHal;
