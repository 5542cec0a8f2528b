//! Architecture-dependent code: just the UART driver [`crate::arch::hal_impl::AarchHal`]
//! wraps. Virtual memory, trap handling, timers, power-off, and the rest of
//! the arch-specific surface belong to collaborators this core treats as out
//! of scope (§1, §11).

pub mod uart;
