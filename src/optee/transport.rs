// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Delivery of a message argument to OP-TEE through its SMC interface.

use super::MessageArg;
use crate::{
    call::SecureCall,
    error::Error,
    smccc::{
        ArgumentBlock, FunctionId, OwningEntityNumber, SmcccCallType, uuid_from_regs,
        uuid_from_words,
    },
};
use core::ptr;
use log::{debug, error, trace};
use num_enum::TryFromPrimitive;
use uuid::Uuid;

/// `OPTEE_SMC_CALLS_UID`
pub const OPTEE_SMC_CALLS_UID: FunctionId =
    FunctionId::new(SmcccCallType::Fast32, OwningEntityNumber::TRUSTED_OS_END, 0xff01);
/// `OPTEE_SMC_RETURN_FROM_RPC`
pub const OPTEE_SMC_RETURN_FROM_RPC: FunctionId =
    FunctionId::new(SmcccCallType::Yielding, OwningEntityNumber::TRUSTED_OS, 3);
/// `OPTEE_SMC_CALL_WITH_ARG`
pub const OPTEE_SMC_CALL_WITH_ARG: FunctionId =
    FunctionId::new(SmcccCallType::Yielding, OwningEntityNumber::TRUSTED_OS, 4);

/// The UID reported by OP-TEE for `OPTEE_SMC_CALLS_UID`.
pub const OPTEE_MSG_UID: Uuid =
    uuid_from_words([0x384f_b3e0, 0xe7f8_11e3, 0xaf63_0002, 0xa5d5_c51b]);

/// Statuses returned in x0 by OP-TEE yielding calls, other than RPC requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u64)]
#[allow(missing_docs)]
pub enum OpteeSmcStatus {
    Success = 0,
    ThreadLimit = 1,
    Busy = 2,
    Resume = 3,
    BadAddress = 4,
    BadCommand = 5,
    NoMemory = 6,
    NotAvailable = 7,
}

const OPTEE_SMC_RETURN_OK: u64 = OpteeSmcStatus::Success as u64;
const OPTEE_SMC_RETURN_RPC_PREFIX_MASK: u64 = 0xffff_0000;
const OPTEE_SMC_RETURN_RPC_PREFIX: u64 = 0xffff_0000;
const OPTEE_SMC_RPC_FUNC_FOREIGN_INTR: u64 = 4;

/// Converts addresses from the physical mapping to the virtual mapping in use after the address
/// space has been relocated.
pub trait AddressConverter {
    /// Returns the new address for `address`.
    fn convert(&self, address: u64) -> Result<u64, Error>;
}

/// A [`SecureCall`] which owns a [`MessageArg`] in memory shared with OP-TEE.
pub trait OpteeTransport: SecureCall {
    /// Returns the shared message argument.
    fn message_arg(&mut self) -> &mut MessageArg;

    /// Returns the address of the message argument as seen by OP-TEE.
    fn message_arg_address(&self) -> u64;

    /// Returns the address as seen by OP-TEE of a caller buffer at `address`.
    fn buffer_address(&self, address: u64) -> u64 {
        address
    }

    /// Updates any pointers the transport keeps after the address space has been relocated.
    fn set_virtual_address_map(&mut self, _converter: &dyn AddressConverter) -> Result<(), Error> {
        Ok(())
    }
}

/// Translates a normal world address into the physical address OP-TEE uses for it.
pub trait PhysicalTranslation {
    /// Returns the physical address of `address`.
    fn physical_address(&self, address: u64) -> u64;
}

/// Translation for a normal world which runs with its memory identity mapped.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IdentityMapped;

impl PhysicalTranslation for IdentityMapped {
    fn physical_address(&self, address: u64) -> u64 {
        address
    }
}

/// An [`OpteeTransport`] over a [`SecureCall`], with the message argument in statically allocated
/// memory shared with OP-TEE.
#[derive(Debug)]
pub struct SharedMemoryTransport<C, P = IdentityMapped> {
    caller: C,
    arg: &'static mut MessageArg,
    arg_address: u64,
    translation: P,
}

impl<C: SecureCall, P: PhysicalTranslation> SharedMemoryTransport<C, P> {
    /// Creates a transport which passes `arg` to OP-TEE through `caller`.
    ///
    /// The physical address of `arg` is looked up once, here. Buffer addresses are translated with
    /// `translation` on every call.
    pub fn new(caller: C, arg: &'static mut MessageArg, translation: P) -> Self {
        let arg_address = translation.physical_address(address_of(arg));
        Self {
            caller,
            arg,
            arg_address,
            translation,
        }
    }

    /// Returns the secure call used to reach OP-TEE.
    pub fn caller(&self) -> &C {
        &self.caller
    }

    /// Returns the secure call used to reach OP-TEE, mutably.
    pub fn caller_mut(&mut self) -> &mut C {
        &mut self.caller
    }
}

fn address_of(arg: &MessageArg) -> u64 {
    ptr::from_ref(arg) as u64
}

impl<C: SecureCall, P: PhysicalTranslation> SecureCall for SharedMemoryTransport<C, P> {
    fn call(&mut self, args: &ArgumentBlock) -> ArgumentBlock {
        self.caller.call(args)
    }
}

impl<C: SecureCall, P: PhysicalTranslation> OpteeTransport for SharedMemoryTransport<C, P> {
    fn message_arg(&mut self) -> &mut MessageArg {
        &mut *self.arg
    }

    fn message_arg_address(&self) -> u64 {
        self.arg_address
    }

    fn buffer_address(&self, address: u64) -> u64 {
        self.translation.physical_address(address)
    }

    /// Moves the message argument to its new mapping. Its physical address is unchanged.
    fn set_virtual_address_map(&mut self, converter: &dyn AddressConverter) -> Result<(), Error> {
        let current = address_of(self.arg);
        let relocated = converter.convert(current)?;
        if relocated == current {
            return Ok(());
        }
        if relocated == 0 || relocated % align_of::<MessageArg>() as u64 != 0 {
            error!("Message argument at {current:#x} relocated to bad address {relocated:#x}");
            return Err(Error::InvalidParameter);
        }
        debug!("Message argument relocated from {current:#x} to {relocated:#x}");
        // SAFETY: The converter returns the address at which the memory behind `self.arg` is
        // mapped after relocation. It is non-null and suitably aligned, and the old mapping is no
        // longer used.
        self.arg = unsafe { &mut *(relocated as *mut MessageArg) };
        Ok(())
    }
}

/// Checks whether the trusted OS is OP-TEE.
pub fn is_optee_present(caller: &mut impl SecureCall) -> bool {
    let result = caller.call(&ArgumentBlock::from([u64::from(OPTEE_SMC_CALLS_UID.0)]));
    uuid_from_regs(&result) == OPTEE_MSG_UID
}

/// Passes the transport's message argument to OP-TEE and waits for it to complete.
///
/// OP-TEE may hand the CPU back to service a foreign interrupt before it is done. The call is then
/// resumed with the registers it returned, at most `rpc_limit` times. Any other RPC request is not
/// supported and fails the call.
pub fn call_with_arg<T: OpteeTransport + ?Sized>(
    transport: &mut T,
    rpc_limit: u32,
) -> Result<(), Error> {
    let address = transport.message_arg_address();
    let mut args = ArgumentBlock::from([
        OPTEE_SMC_CALL_WITH_ARG.0.into(),
        address >> 32,
        address & 0xffff_ffff,
    ]);
    let mut resumed = 0;

    loop {
        let result = transport.call(&args);
        match result[0] {
            OPTEE_SMC_RETURN_OK => return Ok(()),
            status
                if status & OPTEE_SMC_RETURN_RPC_PREFIX_MASK == OPTEE_SMC_RETURN_RPC_PREFIX
                    && status & !OPTEE_SMC_RETURN_RPC_PREFIX_MASK
                        == OPTEE_SMC_RPC_FUNC_FOREIGN_INTR =>
            {
                if resumed == rpc_limit {
                    error!("OP-TEE call still interrupted after {resumed} resumes");
                    return Err(Error::DeviceError);
                }
                trace!("Resuming OP-TEE call after foreign interrupt");
                resumed += 1;
                args = result;
                args[0] = OPTEE_SMC_RETURN_FROM_RPC.0.into();
            }
            status => {
                match OpteeSmcStatus::try_from(status) {
                    Ok(known) => error!("OP-TEE call failed with {known:?} ({status:#x})"),
                    Err(_) => error!("OP-TEE call failed with SMC status {status:#x}"),
                }
                return Err(Error::DeviceError);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeOptee;

    /// Answers every call with success and records the argument blocks.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<ArgumentBlock>,
    }

    impl SecureCall for Recorder {
        fn call(&mut self, args: &ArgumentBlock) -> ArgumentBlock {
            self.calls.push(*args);
            ArgumentBlock::EMPTY
        }
    }

    /// A normal world mapped at a fixed offset above physical memory.
    struct Offset(u64);

    impl PhysicalTranslation for Offset {
        fn physical_address(&self, address: u64) -> u64 {
            address - self.0
        }
    }

    /// Maps one address to another, and refuses anything else.
    struct Relocate {
        from: u64,
        to: u64,
    }

    impl AddressConverter for Relocate {
        fn convert(&self, address: u64) -> Result<u64, Error> {
            if address == self.from {
                Ok(self.to)
            } else {
                Err(Error::NotReady)
            }
        }
    }

    fn leaked_arg() -> &'static mut MessageArg {
        Box::leak(Box::default())
    }

    #[test]
    fn function_ids() {
        assert_eq!(OPTEE_SMC_CALLS_UID.0, 0xbf00_ff01);
        assert_eq!(OPTEE_SMC_RETURN_FROM_RPC.0, 0x3200_0003);
        assert_eq!(OPTEE_SMC_CALL_WITH_ARG.0, 0x3200_0004);
    }

    #[test]
    fn detects_optee() {
        let mut optee = FakeOptee::new();
        assert!(is_optee_present(&mut optee));

        optee.uid = [0x1234, 0, 0, 0];
        assert!(!is_optee_present(&mut optee));
    }

    #[test]
    fn passes_arg_address() {
        let mut optee = FakeOptee::new();
        optee.arg_address = 0x1_2345_6000;
        call_with_arg(&mut optee, 0).unwrap();
        assert_eq!(
            optee.calls[0].slots(),
            &[0x3200_0004, 0x1, 0x2345_6000, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn resumes_after_foreign_interrupts() {
        let mut optee = FakeOptee::new();
        optee.foreign_interrupts = 2;
        call_with_arg(&mut optee, 2).unwrap();

        assert_eq!(optee.calls.len(), 3);
        assert_eq!(optee.calls[1][0], 0x3200_0003);
        // The resume information returned by OP-TEE is passed back unchanged.
        assert_eq!(optee.calls[1][1], FakeOptee::RESUME_TOKEN);
        assert_eq!(optee.calls[2][0], 0x3200_0003);
    }

    #[test]
    fn bounds_foreign_interrupts() {
        let mut optee = FakeOptee::new();
        optee.foreign_interrupts = 5;
        assert_eq!(call_with_arg(&mut optee, 2), Err(Error::DeviceError));
        assert_eq!(optee.calls.len(), 3);
    }

    #[test]
    fn other_status_fails() {
        let mut optee = FakeOptee::new();
        optee.smc_status = Some(2);
        assert_eq!(call_with_arg(&mut optee, 8), Err(Error::DeviceError));

        // An RPC other than a foreign interrupt is not serviced.
        optee.smc_status = Some(0xffff_0005);
        assert_eq!(call_with_arg(&mut optee, 8), Err(Error::DeviceError));
    }

    #[test]
    fn shared_memory_passes_physical_arg_address() {
        let arg = leaked_arg();
        let virtual_address = address_of(arg);
        let mut transport = SharedMemoryTransport::new(Recorder::default(), arg, Offset(0x1000));
        assert_eq!(transport.message_arg_address(), virtual_address - 0x1000);

        call_with_arg(&mut transport, 0).unwrap();
        let physical = virtual_address - 0x1000;
        assert_eq!(transport.caller().calls.len(), 1);
        assert_eq!(
            transport.caller().calls[0].slots()[..3],
            [0x3200_0004, physical >> 32, physical & 0xffff_ffff]
        );
    }

    #[test]
    fn shared_memory_translates_buffers() {
        let identity =
            SharedMemoryTransport::new(Recorder::default(), leaked_arg(), IdentityMapped);
        assert_eq!(identity.buffer_address(0x8000_1234), 0x8000_1234);

        let offset = SharedMemoryTransport::new(Recorder::default(), leaked_arg(), Offset(0x4000));
        assert_eq!(offset.buffer_address(0x8000_5234), 0x8000_1234);
    }

    #[test]
    fn shared_memory_relocates_arg() {
        let arg = leaked_arg();
        let original = address_of(arg);
        let moved: *mut MessageArg = Box::into_raw(Box::default());
        let mut transport = SharedMemoryTransport::new(Recorder::default(), arg, IdentityMapped);

        transport
            .set_virtual_address_map(&Relocate {
                from: original,
                to: moved as u64,
            })
            .unwrap();
        transport.message_arg().session = 0x42;
        // The physical address given to OP-TEE does not move.
        assert_eq!(transport.message_arg_address(), original);
        drop(transport);

        // SAFETY: `moved` came from `Box::into_raw` and is only read once the transport is done.
        let moved = unsafe { &*moved };
        assert_eq!(moved.session, 0x42);
    }

    #[test]
    fn shared_memory_rejects_bad_relocation() {
        let arg = leaked_arg();
        let original = address_of(arg);
        let mut transport = SharedMemoryTransport::new(Recorder::default(), arg, IdentityMapped);

        assert_eq!(
            transport.set_virtual_address_map(&Relocate { from: 0, to: 0x1000 }),
            Err(Error::NotReady)
        );
        assert_eq!(
            transport.set_virtual_address_map(&Relocate {
                from: original,
                to: 0
            }),
            Err(Error::InvalidParameter)
        );
        assert_eq!(
            transport.set_virtual_address_map(&Relocate {
                from: original,
                to: 0x1004
            }),
            Err(Error::InvalidParameter)
        );

        transport.message_arg().session = 7;
        assert_eq!(address_of(transport.message_arg()), original);
    }
}
