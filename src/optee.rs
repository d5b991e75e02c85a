// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! OP-TEE message protocol: the shared message argument and the parameters it carries.

pub mod session;
pub mod transport;

use crate::error::Error;
use arrayvec::ArrayVec;
use core::{
    fmt::{self, Display, Formatter},
    num::NonZeroU32,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// The maximum number of parameters carried by one message.
pub const OPTEE_MAX_CALL_PARAMS: usize = 4;

/// Parameter attribute flag marking a parameter as meta information for the trusted OS.
pub const ATTRIBUTE_META: u64 = 0x100;

const ATTRIBUTE_TYPE_MASK: u64 = 0xff;

/// Login method for sessions opened without any client identity.
const LOGIN_PUBLIC: u64 = 0;

/// The operation requested by a message.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum MessageCommand {
    /// Opens a session with a trusted application.
    OpenSession = 0,
    /// Invokes a function of a trusted application within an open session.
    InvokeFunction = 1,
    /// Closes a session.
    CloseSession = 2,
}

/// The type of a single message parameter.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u64)]
pub enum ParamType {
    /// The parameter is unused.
    None = 0x0,
    /// A value read by the trusted application.
    ValueInput = 0x1,
    /// A value written by the trusted application.
    ValueOutput = 0x2,
    /// A value both read and written by the trusted application.
    ValueInout = 0x3,
    /// A buffer read by the trusted application.
    MemoryInput = 0x9,
    /// A buffer written by the trusted application.
    MemoryOutput = 0xa,
    /// A buffer both read and written by the trusted application.
    MemoryInout = 0xb,
}

/// Return codes of the trusted OS and of trusted applications.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum TeeResult {
    Success = 0x0000_0000,
    Generic = 0xffff_0000,
    AccessDenied = 0xffff_0001,
    Cancel = 0xffff_0002,
    BadFormat = 0xffff_0005,
    BadParameters = 0xffff_0006,
    BadState = 0xffff_0007,
    ItemNotFound = 0xffff_0008,
    NotImplemented = 0xffff_0009,
    NotSupported = 0xffff_000a,
    OutOfMemory = 0xffff_000c,
    Busy = 0xffff_000d,
    Communication = 0xffff_000e,
    TargetDead = 0xffff_3024,
}

impl TeeResult {
    /// Returns the outcome this code stands for.
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Self::Success => Ok(()),
            Self::AccessDenied => Err(Error::AccessDenied),
            Self::BadFormat | Self::BadParameters => Err(Error::InvalidParameter),
            Self::NotImplemented | Self::NotSupported | Self::ItemNotFound => {
                Err(Error::NotSupported)
            }
            Self::OutOfMemory => Err(Error::OutOfResources),
            Self::Busy => Err(Error::NotReady),
            Self::Cancel => Err(Error::Aborted),
            Self::Generic | Self::BadState | Self::Communication | Self::TargetDead => {
                Err(Error::DeviceError)
            }
        }
    }
}

/// Where a return code was produced.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum ReturnOrigin {
    /// The client API.
    Api = 1,
    /// The communication stack between the normal and secure worlds.
    Communication = 2,
    /// The trusted OS.
    Tee = 3,
    /// The trusted application.
    TrustedApp = 4,
}

/// The return code and origin reported for one message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TeeStatus {
    /// Raw return code, see [`TeeResult`].
    pub code: u32,
    /// Raw return origin, see [`ReturnOrigin`].
    pub origin: u32,
}

impl TeeStatus {
    /// The status used when a message never reached the trusted OS.
    pub const COMMUNICATION_FAILURE: Self = Self {
        code: TeeResult::Communication as u32,
        origin: ReturnOrigin::Communication as u32,
    };

    /// Returns whether the code is [`TeeResult::Success`].
    pub fn is_success(&self) -> bool {
        self.code == TeeResult::Success as u32
    }

    /// Classifies the return code. Unknown codes are a [`Error::DeviceError`].
    pub fn result(&self) -> Result<(), Error> {
        TeeResult::try_from(self.code).map_or(Err(Error::DeviceError), TeeResult::into_result)
    }
}

impl Display for TeeStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "return {:#x}", self.code)?;
        match ReturnOrigin::try_from(self.origin) {
            Ok(origin) => write!(f, " origin {origin:?}"),
            Err(_) => write!(f, " origin {}", self.origin),
        }
    }
}

/// A handle for an open session with a trusted application.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Session(NonZeroU32);

impl Session {
    /// Wraps a session ID returned by the trusted OS. 0 never names a session.
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Returns the raw session ID.
    pub fn id(self) -> u32 {
        self.0.get()
    }
}

/// One message parameter, as laid out in shared memory.
#[derive(Clone, Copy, Debug, Default, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct MessageParam {
    /// [`ParamType`] in the low byte, plus flags such as [`ATTRIBUTE_META`].
    pub attribute: u64,
    /// Value `a`, or the buffer address.
    pub a: u64,
    /// Value `b`, or the buffer size.
    pub b: u64,
    /// Value `c`, or the shared memory reference.
    pub c: u64,
}

impl MessageParam {
    /// Returns the parameter type, ignoring flags.
    pub fn param_type(&self) -> Option<ParamType> {
        ParamType::try_from(self.attribute & ATTRIBUTE_TYPE_MASK).ok()
    }
}

/// The message argument passed to OP-TEE by physical address.
#[derive(Clone, Debug, Default, Eq, FromBytes, Immutable, IntoBytes, KnownLayout, PartialEq)]
#[repr(C)]
pub struct MessageArg {
    /// [`MessageCommand`]
    pub command: u32,
    /// Trusted application function, for [`MessageCommand::InvokeFunction`].
    pub function: u32,
    /// Session ID.
    pub session: u32,
    /// Cancellation ID, unused.
    pub cancel_id: u32,
    /// Padding, must be zero.
    pub pad: u32,
    /// Return code.
    pub ret: u32,
    /// Origin of the return code.
    pub ret_origin: u32,
    /// Number of entries of `params` in use.
    pub num_params: u32,
    /// Parameters.
    pub params: [MessageParam; OPTEE_MAX_CALL_PARAMS],
}

impl MessageArg {
    /// Returns the return code and origin.
    pub fn status(&self) -> TeeStatus {
        TeeStatus {
            code: self.ret,
            origin: self.ret_origin,
        }
    }

    /// Fills in an `OPEN_SESSION` message for the trusted application `identifier`.
    ///
    /// The identifier and the login method travel as two meta parameters ahead of any client
    /// parameters. Values `a` and `b` of the first one hold the identifier's 16 octets in order,
    /// as they appear in memory.
    pub fn set_open_session(&mut self, identifier: &uuid::Uuid) {
        let [high, low]: [u64; 2] = zerocopy::transmute!(*identifier.as_bytes());
        *self = Self {
            command: MessageCommand::OpenSession.into(),
            num_params: 2,
            ..Default::default()
        };
        self.params[0] = MessageParam {
            attribute: u64::from(ParamType::ValueInput) | ATTRIBUTE_META,
            a: high,
            b: low,
            c: 0,
        };
        self.params[1] = MessageParam {
            attribute: u64::from(ParamType::ValueInput) | ATTRIBUTE_META,
            a: 0,
            b: 0,
            c: LOGIN_PUBLIC,
        };
    }

    /// Fills in an `INVOKE_COMMAND` message for `request`.
    pub fn set_invoke(&mut self, request: &InvokeRequest) {
        *self = Self {
            command: MessageCommand::InvokeFunction.into(),
            function: request.function,
            session: request.session.id(),
            num_params: OPTEE_MAX_CALL_PARAMS as u32,
            ..Default::default()
        };
        for (slot, param) in self.params.iter_mut().zip(&request.params) {
            *slot = param.encode();
        }
    }

    /// Fills in a `CLOSE_SESSION` message.
    pub fn set_close_session(&mut self, session: Session) {
        *self = Self {
            command: MessageCommand::CloseSession.into(),
            session: session.id(),
            ..Default::default()
        };
    }
}

/// Whether the trusted application reads, writes or does both with a parameter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Read by the trusted application.
    Input,
    /// Written by the trusted application.
    Output,
    /// Read and written by the trusted application.
    InOut,
}

impl Direction {
    fn is_output(self) -> bool {
        matches!(self, Self::Output | Self::InOut)
    }
}

/// A parameter of an invocation.
///
/// Buffers are referenced by address only. The memory stays owned by the caller and is never
/// copied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoryParameter {
    /// Small integers passed in the message itself.
    Value {
        /// Which way the value travels.
        direction: Direction,
        /// Value `a`.
        a: u64,
        /// Value `b`.
        b: u64,
        /// Value `c`.
        c: u64,
    },
    /// A buffer in memory which the trusted application can access.
    Memory {
        /// Which way the contents travel.
        direction: Direction,
        /// Address of the buffer, as seen by the secure world.
        address: u64,
        /// Length of the buffer in bytes. On return, the length of the data written.
        length: u64,
    },
}

impl MemoryParameter {
    /// An output value, initially zero.
    pub const VALUE_OUTPUT: Self = Self::Value {
        direction: Direction::Output,
        a: 0,
        b: 0,
        c: 0,
    };

    fn param_type(&self) -> ParamType {
        match self {
            Self::Value { direction, .. } => match direction {
                Direction::Input => ParamType::ValueInput,
                Direction::Output => ParamType::ValueOutput,
                Direction::InOut => ParamType::ValueInout,
            },
            Self::Memory { direction, .. } => match direction {
                Direction::Input => ParamType::MemoryInput,
                Direction::Output => ParamType::MemoryOutput,
                Direction::InOut => ParamType::MemoryInout,
            },
        }
    }

    fn encode(&self) -> MessageParam {
        let attribute = self.param_type().into();
        match *self {
            Self::Value { a, b, c, .. } => MessageParam { attribute, a, b, c },
            Self::Memory {
                address, length, ..
            } => MessageParam {
                attribute,
                a: address,
                b: length,
                c: 0,
            },
        }
    }

    /// Takes over whatever the trusted application wrote back.
    fn update(&mut self, param: &MessageParam) {
        match self {
            Self::Value {
                direction, a, b, c, ..
            } if direction.is_output() => {
                *a = param.a;
                *b = param.b;
                *c = param.c;
            }
            Self::Memory {
                direction, length, ..
            } if direction.is_output() => *length = param.b,
            _ => {}
        }
    }
}

/// A call to a function of a trusted application within an open session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvokeRequest {
    /// The function to call.
    pub function: u32,
    /// The session to call it in.
    pub session: Session,
    /// The parameters, in order.
    pub params: ArrayVec<MemoryParameter, OPTEE_MAX_CALL_PARAMS>,
}

impl InvokeRequest {
    /// Creates a request without any parameters.
    pub fn new(function: u32, session: Session) -> Self {
        Self {
            function,
            session,
            params: ArrayVec::new(),
        }
    }

    /// Appends a parameter, failing if all of them are already in use.
    pub fn push(&mut self, param: MemoryParameter) -> Result<(), Error> {
        self.params
            .try_push(param)
            .map_err(|_| Error::InvalidParameter)
    }

    /// Copies the output parameters back from a completed message.
    pub fn update(&mut self, arg: &MessageArg) {
        for (param, message_param) in self.params.iter_mut().zip(&arg.params) {
            param.update(message_param);
        }
    }
}
