// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Normal world clients for two secure world services:
//!
//! - MM communication with the standalone MM trusted application, over OP-TEE sessions
//!   ([`mm::MmCommunication`]).
//! - Memory attribute changes through the Secure Partition Manager, using either direct SPM calls
//!   or FF-A direct messages ([`mmu::MmuAttributes`]).
//!
//! Both sit on top of a [`call::SecureCall`], which performs a single call with registers x0-x7.

#![cfg_attr(not(test), no_std)]

pub mod call;
pub mod codec;
pub mod config;
pub mod error;
#[cfg(test)]
mod fake;
pub mod logger;
pub mod mm;
pub mod mmu;
pub mod optee;
pub mod smccc;
pub mod status;

pub use config::{CallingConvention, Config};
pub use error::Error;
pub use mm::{LifecycleEvent, MmCommunication};
pub use mmu::{MemoryAttributes, MmuAttributes};
