// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! MM communication with the standalone MM trusted application in OP-TEE.

use crate::{
    config::Config,
    error::Error,
    optee::{
        Direction, InvokeRequest, MemoryParameter, Session,
        session::Channel,
        transport::{AddressConverter, OpteeTransport, is_optee_present},
    },
    status::spm_status,
};
use bitflags::bitflags;
use log::{debug, error, info, warn};
use uuid::Uuid;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// The MM trusted application.
pub const MM_TA_UUID: Uuid = Uuid::from_u128(0xed32d533_99e6_4209_9cc0_2d72cdd998a7);

/// `OPTEE_TA_MM_FUNC_COMMUNICATE`
const MM_FUNC_COMMUNICATE: u32 = 0;

/// A boot lifecycle event which the MM side is told about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleEvent {
    /// The end of the DXE phase.
    EndOfDxe,
    /// Boot services are about to be exited.
    ExitBootServices,
    /// The boot manager is about to load a boot option.
    ReadyToBoot,
}

impl LifecycleEvent {
    /// Returns the event group GUID used as the header GUID of the notification.
    pub fn guid(self) -> Uuid {
        match self {
            Self::EndOfDxe => Uuid::from_fields(
                0x02ce_967a,
                0xdd7e,
                0x4ffc,
                &[0x9e, 0xe7, 0x81, 0x0c, 0xf0, 0x47, 0x08, 0x80],
            ),
            Self::ExitBootServices => Uuid::from_fields(
                0x27ab_f055,
                0xb1b8,
                0x4c26,
                &[0x80, 0x48, 0x74, 0x8f, 0x37, 0xba, 0xa2, 0xdf],
            ),
            Self::ReadyToBoot => Uuid::from_fields(
                0x7ce8_8fb3,
                0x4bd7,
                0x4679,
                &[0x87, 0xa8, 0xa8, 0xd8, 0xde, 0xe5, 0x0d, 0x2b],
            ),
        }
    }

    fn flag(self) -> Notified {
        match self {
            Self::EndOfDxe => Notified::END_OF_DXE,
            Self::ExitBootServices => Notified::EXIT_BOOT_SERVICES,
            Self::ReadyToBoot => Notified::READY_TO_BOOT,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    struct Notified: u8 {
        const END_OF_DXE = 1 << 0;
        const EXIT_BOOT_SERVICES = 1 << 1;
        const READY_TO_BOOT = 1 << 2;
    }
}

/// The header of an MM communicate buffer, followed by a one byte message.
#[derive(Clone, Debug, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
struct CommunicateHeader {
    /// The handler GUID, in its mixed-endian byte layout.
    guid: [u8; 16],
    message_length: u64,
    data: [u8; 8],
}

impl CommunicateHeader {
    fn event(event: LifecycleEvent) -> Self {
        Self {
            guid: event.guid().to_bytes_le(),
            message_length: 1,
            data: [0; 8],
        }
    }
}

/// The MM communication service.
#[derive(Debug)]
pub struct MmCommunication<T> {
    channel: Channel<T>,
    notified: Notified,
    relocated: bool,
}

impl<T: OpteeTransport> MmCommunication<T> {
    /// Creates the service, after checking that OP-TEE is present and that the MM trusted
    /// application can be reached.
    pub fn new(mut transport: T, config: Config) -> Result<Self, Error> {
        if !is_optee_present(&mut transport) {
            error!("OP-TEE not found");
            return Err(Error::NotSupported);
        }

        let mut channel = Channel::new(transport, config);
        channel.open(&MM_TA_UUID).map_err(|e| {
            error!("MM trusted application not reachable: {e}");
            Error::AccessDenied
        })?;
        if let Err(e) = channel.close() {
            warn!("Closing MM compatibility session failed: {e}");
        }
        info!("MM communication over OP-TEE ready");

        Ok(Self {
            channel,
            notified: Notified::empty(),
            relocated: false,
        })
    }

    /// Returns the OP-TEE channel.
    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    /// Returns the OP-TEE channel mutably.
    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    /// Passes the first `size` bytes of `buffer` to the MM side, which handles the request in
    /// place. Returns the size of the response now at the start of `buffer`.
    ///
    /// A session is opened for the call and closed again before returning, whatever the result.
    pub fn communicate(&mut self, buffer: &mut [u8], size: usize) -> Result<usize, Error> {
        if size == 0 || size > buffer.len() {
            return Err(Error::InvalidParameter);
        }
        if self.channel.is_open() {
            error!("MM communicate while a session is open");
            return Err(Error::DeviceError);
        }

        let session = self.channel.open(&MM_TA_UUID).map_err(|e| {
            error!("Opening MM session failed: {e}");
            Error::AccessDenied
        })?;
        let result = self.invoke_communicate(session, buffer, size);
        if let Err(e) = self.channel.close() {
            warn!("Closing MM session failed: {e}");
        }
        result
    }

    fn invoke_communicate(
        &mut self,
        session: Session,
        buffer: &mut [u8],
        size: usize,
    ) -> Result<usize, Error> {
        let address = self
            .channel
            .transport()
            .buffer_address(buffer.as_mut_ptr() as u64);
        let mut request = InvokeRequest::new(MM_FUNC_COMMUNICATE, session);
        request.push(MemoryParameter::Memory {
            direction: Direction::InOut,
            address,
            length: size as u64,
        })?;
        request.push(MemoryParameter::VALUE_OUTPUT)?;

        if self.channel.invoke(&mut request).is_err() {
            error!(
                "MM communicate failed: {:?}",
                self.channel.last_status()
            );
            return Err(Error::DeviceError);
        }

        let (
            Some(&MemoryParameter::Memory { length, .. }),
            Some(&MemoryParameter::Value { a: status, .. }),
        ) = (request.params.first(), request.params.get(1))
        else {
            return Err(Error::DeviceError);
        };
        mm_status(status)?;

        match usize::try_from(length) {
            Ok(length) if length <= size => Ok(length),
            _ => {
                error!("MM response of {length:#x} bytes overflows {size:#x} byte buffer");
                Err(Error::DeviceError)
            }
        }
    }

    /// Tells the MM side about a lifecycle event. An event which was already sent is ignored.
    pub fn notify(&mut self, event: LifecycleEvent) -> Result<(), Error> {
        if self.notified.contains(event.flag()) {
            debug!("Ignoring repeated {event:?}");
            return Ok(());
        }
        self.notified.insert(event.flag());

        let mut header = CommunicateHeader::event(event);
        let buffer = header.as_mut_bytes();
        let size = buffer.len();
        self.communicate(buffer, size).map(|_| ()).inspect_err(|e| {
            warn!("Notifying MM of {event:?} failed: {e}");
        })
    }

    /// Switches the addresses held by the transport to the virtual mapping. Later calls do
    /// nothing.
    pub fn set_virtual_address_map(
        &mut self,
        converter: &dyn AddressConverter,
    ) -> Result<(), Error> {
        if self.relocated {
            return Ok(());
        }
        self.channel
            .transport_mut()
            .set_virtual_address_map(converter)?;
        self.relocated = true;
        Ok(())
    }
}

/// Maps the status the MM side reports in value `a`. It is a 32-bit code, sign- or
/// zero-extended.
fn mm_status(value: u64) -> Result<(), Error> {
    let code = value as i32;
    if value != code as u32 as u64 && value != code as i64 as u64 {
        error!("MM status {value:#x} out of range");
        return Err(Error::DeviceError);
    }
    spm_status(code)
}
