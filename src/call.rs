// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The privileged call primitive.

use crate::smccc::ArgumentBlock;

/// Something which can pass an argument block to the secure world and wait for the result.
///
/// The call is synchronous: it returns once the secure side has produced its response registers.
/// A secure side which never returns is outside of what this crate handles.
pub trait SecureCall {
    /// Performs one call with the given x0-x7 and returns the resulting x0-x7.
    fn call(&mut self, args: &ArgumentBlock) -> ArgumentBlock;
}

/// Issues SMC64 calls to EL3, for use from the normal world.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Default)]
pub struct Smc;

#[cfg(target_arch = "aarch64")]
impl SecureCall for Smc {
    fn call(&mut self, args: &ArgumentBlock) -> ArgumentBlock {
        let slots = args.slots();
        let mut smc_args = [0u64; 17];
        smc_args[..ArgumentBlock::SLOTS - 1].copy_from_slice(&slots[1..]);
        let result = smccc::smc64(slots[0] as u32, smc_args);
        let mut out = ArgumentBlock::EMPTY;
        out.slots_mut()
            .copy_from_slice(&result[..ArgumentBlock::SLOTS]);
        out
    }
}

/// Issues SVC calls to the SPM, for use from a secure partition running at S-EL0.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Default)]
pub struct Svc;

#[cfg(target_arch = "aarch64")]
impl SecureCall for Svc {
    fn call(&mut self, args: &ArgumentBlock) -> ArgumentBlock {
        let mut regs = *args.slots();
        // SAFETY: The SVC only hands the registers to the SPM, which returns its response in the
        // same registers. Any memory it touches is described by the arguments and owned by the
        // caller for the duration of the call.
        unsafe {
            core::arch::asm!(
                "svc #0",
                inout("x0") regs[0],
                inout("x1") regs[1],
                inout("x2") regs[2],
                inout("x3") regs[3],
                inout("x4") regs[4],
                inout("x5") regs[5],
                inout("x6") regs[6],
                inout("x7") regs[7],
                options(nostack)
            );
        }
        regs.into()
    }
}
