//! Silicon model for the 2-D convolution accelerator tile.
//!
//! This crate has **no dependencies** and **no hardware access** — it is a
//! pure model of the device: register offsets, access widths, the default
//! address window, and the start/busy handshake semantics.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Register offsets, widths, strobe/busy values, [`regs::RegisterMap`] |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod regs;

pub use regs::{Register, RegisterMap, RegisterWidth};
