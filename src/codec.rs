// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Register layouts of the SPM memory attribute calls, for both calling conventions.
//!
//! This is the only place which knows where each field lives in x0-x7. Everything above it works
//! with [`AttributeRequest`] and [`RawResponse`].

use crate::{
    config::CallingConvention,
    smccc::{ArgumentBlock, FunctionId, OwningEntityNumber, SmcccCallType},
};
use arm_ffa::{Interface, Version, interface_args::DirectMsgArgs};

/// `SP_GET_MEM_ATTRIBUTES_AARCH64`
pub const SP_GET_MEM_ATTRIBUTES: FunctionId =
    FunctionId::new(SmcccCallType::Fast64, OwningEntityNumber::STANDARD_SECURE, 0x64);
/// `SP_SET_MEM_ATTRIBUTES_AARCH64`
pub const SP_SET_MEM_ATTRIBUTES: FunctionId =
    FunctionId::new(SmcccCallType::Fast64, OwningEntityNumber::STANDARD_SECURE, 0x65);

/// The FF-A version whose register layout is used for direct messages.
pub const FFA_VERSION: Version = Version(1, 2);

/// The number of registers `arm-ffa` marshals a 64-bit direct message through. Only x0-x7 are
/// carried by a secure call, the rest stay zero.
const FFA_REGISTERS: usize = 18;

/// FF-A endpoint ID of the partition which handles memory attribute requests.
pub const SPM_ENDPOINT_ID: u16 = 3;

/// FF-A endpoint ID of the caller.
const OWN_ENDPOINT_ID: u16 = 0;

const PAGE_SHIFT: u32 = 12;
const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Converts a length in bytes to the number of 4 KiB pages needed to cover it.
pub const fn size_to_pages(length: u64) -> u64 {
    (length >> PAGE_SHIFT) + if length & (PAGE_SIZE - 1) != 0 { 1 } else { 0 }
}

/// A memory attribute request, independent of how it is framed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttributeRequest {
    /// Reads the attributes of the page containing `base`.
    Get {
        /// Address within the region.
        base: u64,
    },
    /// Writes `permissions` to `page_count` pages starting at `base`.
    Set {
        /// Start of the region.
        base: u64,
        /// Number of 4 KiB pages in the region.
        page_count: u64,
        /// The new attribute mask.
        permissions: u32,
    },
}

impl AttributeRequest {
    /// Returns the SPM function which serves this request.
    pub fn function_id(&self) -> FunctionId {
        match self {
            Self::Get { .. } => SP_GET_MEM_ATTRIBUTES,
            Self::Set { .. } => SP_SET_MEM_ATTRIBUTES,
        }
    }

    /// The arguments which follow the function ID, in order.
    fn args(&self) -> [u64; 3] {
        match *self {
            Self::Get { base } => [base, 0, 0],
            Self::Set {
                base,
                page_count,
                permissions,
            } => [base, page_count, permissions.into()],
        }
    }
}

/// The part of a response which carries the result, with any framing removed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RawResponse {
    /// The SPM's own return value: x0 of a legacy call, or the first payload register of an FF-A
    /// direct response.
    Payload(u32),
    /// The FF-A call was answered with something other than a direct response. Holds x2, where
    /// `FFA_ERROR` reports its error code.
    Routing(u32),
}

/// Builds the registers for `request`.
pub fn encode(convention: CallingConvention, request: &AttributeRequest) -> ArgumentBlock {
    let function_id = request.function_id();
    let [base, page_count, permissions] = request.args();

    match convention {
        CallingConvention::Legacy => {
            ArgumentBlock::from([function_id.0.into(), base, page_count, permissions])
        }
        CallingConvention::FfaDirect => {
            let mut payload = [0; 15];
            payload[..4].copy_from_slice(&[function_id.0.into(), base, page_count, permissions]);

            let mut regs = [0; FFA_REGISTERS];
            Interface::MsgSendDirectReq {
                src_id: OWN_ENDPOINT_ID,
                dst_id: SPM_ENDPOINT_ID,
                args: DirectMsgArgs::Args64(payload),
            }
            .to_regs(FFA_VERSION, &mut regs);

            let mut block = ArgumentBlock::EMPTY;
            block.slots_mut().copy_from_slice(&regs[..ArgumentBlock::SLOTS]);
            block
        }
    }
}

/// Extracts the result from the registers returned by the secure side.
pub fn decode(convention: CallingConvention, block: &ArgumentBlock) -> RawResponse {
    match convention {
        CallingConvention::Legacy => RawResponse::Payload(block[0] as u32),
        CallingConvention::FfaDirect => {
            let mut function_id = block.function_id();
            function_id.clear_sve_hint();

            let mut regs = [0; FFA_REGISTERS];
            regs[..ArgumentBlock::SLOTS].copy_from_slice(block.slots());
            regs[0] = function_id.0.into();

            match Interface::from_regs(FFA_VERSION, &regs) {
                Ok(Interface::MsgSendDirectResp {
                    args: DirectMsgArgs::Args64(args),
                    ..
                }) => RawResponse::Payload(args[0] as u32),
                _ => RawResponse::Routing(block[2] as u32),
            }
        }
    }
}
