// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Types and helpers related to the SMC Calling Convention.

use core::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Index, IndexMut},
};
use uuid::Uuid;

const FAST_CALL: u32 = 0x8000_0000;
const SMC64: u32 = 0x4000_0000;
const OEN_MASK: u32 = 0x3f00_0000;
const OEN_SHIFT: u8 = 24;
const SVE_HINT: u32 = 1 << 16;

/// The type of an SMCCC call: whether it is a fast call or yielding call, and which calling
/// convention it uses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SmcccCallType {
    /// An SMC32/HVC32 fast call.
    Fast32,
    /// An SMC64/HVC64 fast call.
    Fast64,
    /// A yielding call.
    Yielding,
}

/// Owning Entity Number (OEN)
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct OwningEntityNumber(pub u8);

#[allow(missing_docs)]
impl OwningEntityNumber {
    pub const ARM_ARCHITECTURE: Self = Self(0);
    pub const CPU: Self = Self(1);
    pub const SIP: Self = Self(2);
    pub const OEM: Self = Self(3);
    pub const STANDARD_SECURE: Self = Self(4);
    pub const STANDARD_HYPERVISOR: Self = Self(5);
    pub const VENDOR_SPECIFIC_HYPERVISOR: Self = Self(6);
    pub const VENDOR_SPECIFIC_EL3_MONITOR: Self = Self(7);
    /// The first Trusted OS OEN, used by OP-TEE for its yielding calls.
    pub const TRUSTED_OS: Self = Self(50);
    /// The last Trusted OS OEN, which hosts the general service queries such as `CALLS_UID`.
    pub const TRUSTED_OS_END: Self = Self(63);
}

impl Display for OwningEntityNumber {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An SMCCC function ID.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Creates a new `FunctionId` from its components.
    pub const fn new(call_type: SmcccCallType, oen: OwningEntityNumber, number: u16) -> Self {
        let type_bits = match call_type {
            SmcccCallType::Fast32 => FAST_CALL,
            SmcccCallType::Fast64 => FAST_CALL | SMC64,
            SmcccCallType::Yielding => 0,
        };
        Self(type_bits | (((oen.0 as u32) << OEN_SHIFT) & OEN_MASK) | (number as u32))
    }

    /// Returns the Owning Entity Number of the function ID.
    pub fn oen(self) -> OwningEntityNumber {
        OwningEntityNumber(((self.0 & OEN_MASK) >> OEN_SHIFT) as u8)
    }

    /// Returns the lower 16 bits of the function ID.
    pub fn number(self) -> u16 {
        self.0 as u16
    }

    /// Returns what type of call this is.
    pub fn call_type(self) -> SmcccCallType {
        if self.0 & FAST_CALL != 0 {
            if self.0 & SMC64 != 0 {
                SmcccCallType::Fast64
            } else {
                SmcccCallType::Fast32
            }
        } else {
            SmcccCallType::Yielding
        }
    }

    /// Clears the SVE hint bit.
    ///
    /// The hint never takes part in function identification, so it is dropped before comparing a
    /// returned function ID against a known one.
    pub fn clear_sve_hint(&mut self) {
        self.0 &= !SVE_HINT
    }
}

impl Display for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Debug for FunctionId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:#010x} ({:?} OEN {} number {:#x})",
            self.0,
            self.call_type(),
            self.oen(),
            self.number()
        )
    }
}

/// The general purpose registers x0-x7 passed to, and returned from, a secure call.
///
/// A block is built for exactly one call and thrown away once the response has been decoded.
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct ArgumentBlock {
    slots: [u64; Self::SLOTS],
}

impl ArgumentBlock {
    /// The number of argument registers carried by one call.
    pub const SLOTS: usize = 8;

    /// A block with every register zeroed.
    pub const EMPTY: Self = Self {
        slots: [0; Self::SLOTS],
    };

    /// Returns all of the registers, starting with x0.
    pub fn slots(&self) -> &[u64; Self::SLOTS] {
        &self.slots
    }

    /// Returns all of the registers mutably, starting with x0.
    pub fn slots_mut(&mut self) -> &mut [u64; Self::SLOTS] {
        &mut self.slots
    }

    /// Returns the function ID held in x0.
    pub fn function_id(&self) -> FunctionId {
        FunctionId(self.slots[0] as u32)
    }
}

impl Index<usize> for ArgumentBlock {
    type Output = u64;

    fn index(&self, index: usize) -> &u64 {
        &self.slots[index]
    }
}

impl IndexMut<usize> for ArgumentBlock {
    fn index_mut(&mut self, index: usize) -> &mut u64 {
        &mut self.slots[index]
    }
}

impl Debug for ArgumentBlock {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "ArgumentBlock([")?;
        let (first, rest) = (self.slots[0], &self.slots[1..]);
        write!(f, "{first:#x}")?;
        for value in rest {
            write!(f, ", {value:#x}")?;
        }
        write!(f, "])")?;
        Ok(())
    }
}

impl From<[u64; ArgumentBlock::SLOTS]> for ArgumentBlock {
    fn from(slots: [u64; ArgumentBlock::SLOTS]) -> Self {
        Self { slots }
    }
}

macro_rules! argument_block_from_array {
    ($length:literal) => {
        impl From<[u64; $length]> for ArgumentBlock {
            fn from(value: [u64; $length]) -> Self {
                let mut slots = [0; Self::SLOTS];
                slots[..$length].copy_from_slice(&value);
                Self { slots }
            }
        }
    };
}

argument_block_from_array!(1);
argument_block_from_array!(2);
argument_block_from_array!(3);
argument_block_from_array!(4);
argument_block_from_array!(5);
argument_block_from_array!(6);
argument_block_from_array!(7);

/// According to section 5.3 of the SMCCC, UUIDs are returned as a single 128-bit value using the
/// SMC32 calling convention, mapped to x0-x3. x0 holds bytes 0 to 3, with byte 0 in the low-order
/// bits.
pub const fn uuid_from_words(words: [u32; 4]) -> Uuid {
    let mut bytes = [0u8; 16];
    let mut i = 0;
    while i < 16 {
        bytes[i] = words[i / 4].to_le_bytes()[i % 4];
        i += 1;
    }
    Uuid::from_bytes(bytes)
}

/// Reads a UUID returned in x0-x3, see [`uuid_from_words`].
pub fn uuid_from_regs(regs: &ArgumentBlock) -> Uuid {
    uuid_from_words([
        regs[0] as u32,
        regs[1] as u32,
        regs[2] as u32,
        regs[3] as u32,
    ])
}
