// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Memory attribute management through the Secure Partition Manager.

use crate::{
    call::SecureCall,
    codec::{AttributeRequest, decode, encode, size_to_pages},
    config::CallingConvention,
    error::Error,
    status::{RequestKind, normalize},
};
use bitflags::bitflags;
use log::{debug, warn};

bitflags! {
    /// Memory attributes as the SPM reports and accepts them.
    ///
    /// Bits 1:0 hold the data permission, bit 2 the code permission. Bits the SPM reports beyond
    /// these are kept as they are.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct MemoryAttributes: u32 {
        /// Data may only be read.
        const DATA_READ_ONLY = 0b11;
        /// Data may be read and written.
        const DATA_READ_WRITE = 0b01;
        /// Instructions may not be fetched.
        const EXECUTE_NEVER = 1 << 2;

        const _ = !0;
    }
}

impl MemoryAttributes {
    /// No data access, executable.
    pub const NO_ACCESS: Self = Self::empty();

    /// Mask of the data access permission field.
    pub const DATA_PERMISSION_MASK: Self = Self::from_bits_retain(0b11);

    /// Returns the data permission field with every other bit cleared.
    pub fn data_permission(self) -> Self {
        self.intersection(Self::DATA_PERMISSION_MASK)
    }

    /// Returns whether the data permission is read-only.
    pub fn is_read_only(self) -> bool {
        self.data_permission() == Self::DATA_READ_ONLY
    }

    fn with_data_permission(self, permission: Self) -> Self {
        self.difference(Self::DATA_PERMISSION_MASK).union(permission)
    }
}

/// Changes memory attributes of regions through the SPM.
///
/// Every operation is a direct call, nothing is cached.
#[derive(Debug)]
pub struct MmuAttributes<C> {
    caller: C,
    convention: CallingConvention,
}

impl<C: SecureCall> MmuAttributes<C> {
    /// Creates a client which frames its requests according to `convention`.
    pub fn new(caller: C, convention: CallingConvention) -> Self {
        Self { caller, convention }
    }

    /// Returns the secure call used for requests.
    pub fn caller(&self) -> &C {
        &self.caller
    }

    /// Returns the attributes of the page containing `base`.
    pub fn get_attributes(&mut self, base: u64) -> Result<MemoryAttributes, Error> {
        let value = self.request(AttributeRequest::Get { base }, RequestKind::GetAttributes)?;
        Ok(MemoryAttributes::from_bits_retain(value))
    }

    /// Sets the attributes of every page overlapping `length` bytes from `base`.
    pub fn set_attributes(
        &mut self,
        base: u64,
        length: u64,
        attributes: MemoryAttributes,
    ) -> Result<(), Error> {
        let request = AttributeRequest::Set {
            base,
            page_count: size_to_pages(length),
            permissions: attributes.bits(),
        };
        self.request(request, RequestKind::SetAttributes)?;
        Ok(())
    }

    /// Makes the region non-executable.
    pub fn set_no_exec(&mut self, base: u64, length: u64) -> Result<(), Error> {
        self.update(base, length, |attributes| {
            attributes.union(MemoryAttributes::EXECUTE_NEVER)
        })
    }

    /// Makes the region executable.
    pub fn clear_no_exec(&mut self, base: u64, length: u64) -> Result<(), Error> {
        self.update(base, length, |attributes| {
            attributes.difference(MemoryAttributes::EXECUTE_NEVER)
        })
    }

    /// Makes the region read-only.
    pub fn set_read_only(&mut self, base: u64, length: u64) -> Result<(), Error> {
        self.update(base, length, |attributes| {
            attributes.with_data_permission(MemoryAttributes::DATA_READ_ONLY)
        })
    }

    /// Makes the region writable.
    pub fn clear_read_only(&mut self, base: u64, length: u64) -> Result<(), Error> {
        self.update(base, length, |attributes| {
            attributes.with_data_permission(MemoryAttributes::DATA_READ_WRITE)
        })
    }

    /// Reads the attributes at `base`, changes them with `modify` and writes them to the region.
    ///
    /// If the read fails for any reason other than invalid parameters, the change is applied to
    /// [`MemoryAttributes::NO_ACCESS`] and the SPM decides whether to accept it.
    fn update(
        &mut self,
        base: u64,
        length: u64,
        modify: impl FnOnce(MemoryAttributes) -> MemoryAttributes,
    ) -> Result<(), Error> {
        let current = match self.get_attributes(base) {
            Ok(attributes) => attributes,
            Err(Error::InvalidParameter) => return Err(Error::InvalidParameter),
            Err(e) => {
                warn!("Reading attributes at {base:#x} failed ({e}), starting from none");
                MemoryAttributes::NO_ACCESS
            }
        };
        let attributes = modify(current);
        debug!("Attributes of {base:#x}+{length:#x}: {current:?} -> {attributes:?}");
        self.set_attributes(base, length, attributes)
    }

    fn request(&mut self, request: AttributeRequest, kind: RequestKind) -> Result<u32, Error> {
        let args = encode(self.convention, &request);
        let response = self.caller.call(&args);
        normalize(self.convention, kind, decode(self.convention, &response)).inspect_err(|e| {
            warn!(
                "{:?} request {request:?} failed: {e}, response {response:?}",
                self.convention
            );
        })
    }
}
