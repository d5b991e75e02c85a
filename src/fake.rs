// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Fake secure worlds for unit tests.

use crate::{
    call::SecureCall,
    config::CallingConvention,
    optee::{
        MessageArg, MessageCommand, ReturnOrigin, TeeResult, TeeStatus,
        transport::{AddressConverter, OpteeTransport},
    },
    smccc::ArgumentBlock,
};
use std::collections::VecDeque;

const OPTEE_SMC_CALLS_UID: u64 = 0xbf00_ff01;
const OPTEE_SMC_RETURN_FROM_RPC: u64 = 0x3200_0003;
const OPTEE_SMC_CALL_WITH_ARG: u64 = 0x3200_0004;
const OPTEE_SMC_RETURN_RPC_FOREIGN_INTR: u64 = 0xffff_0004;
const OPTEE_SMC_RETURN_EBADCMD: u64 = 5;
const SMCCC_NOT_SUPPORTED: u64 = u64::MAX;

const TEE_SUCCESS: TeeStatus = TeeStatus {
    code: 0,
    origin: ReturnOrigin::TrustedApp as u32,
};

/// What the fake MM trusted application answers to a communicate request.
#[derive(Clone, Copy, Debug)]
pub struct MmResponse {
    /// Return code and origin of the invoke message.
    pub tee: TeeStatus,
    /// Written to value `a` of the second parameter.
    pub mm_status: u64,
    /// Written to the size of the first parameter, or left as it was if `None`.
    pub length: Option<u64>,
}

/// OP-TEE with an MM trusted application, behind its own shared message argument.
#[derive(Debug)]
pub struct FakeOptee {
    pub arg: MessageArg,
    pub arg_address: u64,
    pub uid: [u32; 4],
    /// Every argument block received.
    pub calls: Vec<ArgumentBlock>,
    /// Every message received, as it was before being processed.
    pub messages: Vec<MessageArg>,
    /// How many more calls are interrupted before a message is processed.
    pub foreign_interrupts: u32,
    /// If set, every yielding call returns this status without processing the message.
    pub smc_status: Option<u64>,
    /// Messages with this command fail at the transport level.
    pub failing_command: Option<MessageCommand>,
    /// Statuses for the next open session messages, which then fail.
    pub open_failures: VecDeque<TeeStatus>,
    pub next_session: u32,
    pub open_sessions: Vec<u32>,
    pub mm_response: MmResponse,
    pub relocations: u32,
}

impl FakeOptee {
    pub const RESUME_TOKEN: u64 = 0x5eed;

    pub fn new() -> Self {
        Self {
            arg: MessageArg::default(),
            arg_address: 0x8000_0000,
            uid: [0x384f_b3e0, 0xe7f8_11e3, 0xaf63_0002, 0xa5d5_c51b],
            calls: Vec::new(),
            messages: Vec::new(),
            foreign_interrupts: 0,
            smc_status: None,
            failing_command: None,
            open_failures: VecDeque::new(),
            next_session: 1,
            open_sessions: Vec::new(),
            mm_response: MmResponse {
                tee: TEE_SUCCESS,
                mm_status: 0,
                length: None,
            },
            relocations: 0,
        }
    }

    /// Returns the messages received with the given command.
    pub fn messages_with(&self, command: MessageCommand) -> impl Iterator<Item = &MessageArg> {
        self.messages
            .iter()
            .filter(move |arg| arg.command == u32::from(command))
    }

    fn yielding_call(&mut self) -> ArgumentBlock {
        if let Some(status) = self.smc_status {
            return ArgumentBlock::from([status]);
        }
        if self.foreign_interrupts > 0 {
            self.foreign_interrupts -= 1;
            return ArgumentBlock::from([OPTEE_SMC_RETURN_RPC_FOREIGN_INTR, Self::RESUME_TOKEN]);
        }
        let command = MessageCommand::try_from(self.arg.command).ok();
        if command.is_some() && command == self.failing_command {
            return ArgumentBlock::from([OPTEE_SMC_RETURN_EBADCMD]);
        }

        self.messages.push(self.arg.clone());
        let status = match command {
            Some(MessageCommand::OpenSession) => self.open_session(),
            Some(MessageCommand::InvokeFunction) => self.invoke(),
            Some(MessageCommand::CloseSession) => {
                self.open_sessions.retain(|&id| id != self.arg.session);
                TEE_SUCCESS
            }
            None => TeeStatus {
                code: TeeResult::BadParameters.into(),
                origin: ReturnOrigin::Tee.into(),
            },
        };
        self.arg.ret = status.code;
        self.arg.ret_origin = status.origin;
        ArgumentBlock::EMPTY
    }

    fn open_session(&mut self) -> TeeStatus {
        if let Some(status) = self.open_failures.pop_front() {
            return status;
        }
        let id = self.next_session;
        self.next_session += 1;
        self.open_sessions.push(id);
        self.arg.session = id;
        TEE_SUCCESS
    }

    fn invoke(&mut self) -> TeeStatus {
        if !self.open_sessions.contains(&self.arg.session) {
            return TeeStatus {
                code: TeeResult::BadState.into(),
                origin: ReturnOrigin::Tee.into(),
            };
        }
        let response = self.mm_response;
        if let Some(length) = response.length {
            self.arg.params[0].b = length;
        }
        self.arg.params[1].a = response.mm_status;
        response.tee
    }
}

impl SecureCall for FakeOptee {
    fn call(&mut self, args: &ArgumentBlock) -> ArgumentBlock {
        self.calls.push(*args);
        match args[0] {
            OPTEE_SMC_CALLS_UID => ArgumentBlock::from(self.uid.map(u64::from)),
            OPTEE_SMC_CALL_WITH_ARG | OPTEE_SMC_RETURN_FROM_RPC => self.yielding_call(),
            _ => ArgumentBlock::from([SMCCC_NOT_SUPPORTED]),
        }
    }
}

impl OpteeTransport for FakeOptee {
    fn message_arg(&mut self) -> &mut MessageArg {
        &mut self.arg
    }

    fn message_arg_address(&self) -> u64 {
        self.arg_address
    }

    fn set_virtual_address_map(
        &mut self,
        converter: &dyn AddressConverter,
    ) -> Result<(), crate::error::Error> {
        self.arg_address = converter.convert(self.arg_address)?;
        self.relocations += 1;
        Ok(())
    }
}

/// An SPM which keeps a single attribute mask for all of memory.
#[derive(Debug)]
pub struct FakeSpm {
    pub convention: CallingConvention,
    pub attributes: u32,
    /// Every argument block received.
    pub calls: Vec<ArgumentBlock>,
    /// If set, get requests return this status instead of the attributes.
    pub get_status: Option<i32>,
    /// If set, set requests return this status and change nothing.
    pub set_status: Option<i32>,
    /// If set, FF-A requests are answered with `FFA_ERROR` and this code.
    pub routing_error: Option<i32>,
}

impl FakeSpm {
    const FFA_ERROR: u64 = 0x8400_0060;
    const FFA_MSG_SEND_DIRECT_RESP_64: u64 = 0xc400_0070;
    const GET: u64 = 0xc400_0064;
    const SET: u64 = 0xc400_0065;

    pub fn new(convention: CallingConvention, attributes: u32) -> Self {
        Self {
            convention,
            attributes,
            calls: Vec::new(),
            get_status: None,
            set_status: None,
            routing_error: None,
        }
    }

    /// Returns the set requests received, as `(base, page_count, permissions)`.
    pub fn writes(&self) -> Vec<(u64, u64, u32)> {
        self.calls
            .iter()
            .map(|call| self.request(call))
            .filter(|&[function, ..]| function == Self::SET)
            .map(|[_, base, pages, permissions]| (base, pages, permissions as u32))
            .collect()
    }

    fn request(&self, args: &ArgumentBlock) -> [u64; 4] {
        let offset = match self.convention {
            CallingConvention::Legacy => 0,
            CallingConvention::FfaDirect => 3,
        };
        [
            args[offset],
            args[offset + 1],
            args[offset + 2],
            args[offset + 3],
        ]
    }

    fn serve(&mut self, [function, _base, _pages, permissions]: [u64; 4]) -> u32 {
        match function {
            Self::GET => match self.get_status {
                Some(status) => status as u32,
                None => self.attributes,
            },
            Self::SET => match self.set_status {
                Some(status) => status as u32,
                None => {
                    self.attributes = permissions as u32;
                    0
                }
            },
            _ => -1i32 as u32,
        }
    }
}

impl SecureCall for FakeSpm {
    fn call(&mut self, args: &ArgumentBlock) -> ArgumentBlock {
        self.calls.push(*args);
        let request = self.request(args);
        match self.convention {
            CallingConvention::Legacy => ArgumentBlock::from([u64::from(self.serve(request))]),
            CallingConvention::FfaDirect => {
                if let Some(code) = self.routing_error {
                    return ArgumentBlock::from([Self::FFA_ERROR, 0, u64::from(code as u32)]);
                }
                let value = self.serve(request);
                ArgumentBlock::from([
                    Self::FFA_MSG_SEND_DIRECT_RESP_64,
                    (u64::from(args[1] as u16) << 16) | ((args[1] >> 16) & 0xffff),
                    0,
                    u64::from(value),
                ])
            }
        }
    }
}
