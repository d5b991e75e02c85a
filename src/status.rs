// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Translation of raw status codes into [`Error`].
//!
//! There are two code spaces. FF-A routing errors come back in an `FFA_ERROR` instead of a direct
//! response. SPM status codes come back from the secure partition itself, either as the whole
//! result of a legacy call, in the payload of a direct response, or as the MM communicate status.
//! Both have an "invalid parameters" and a "denied" code, but they are detected in different
//! registers and are never mixed up.

use crate::{codec::RawResponse, config::CallingConvention, error::Error};
use arm_ffa::FfaError;
use log::warn;
use num_enum::{IntoPrimitive, TryFromPrimitive};

const ERROR_BIT: u32 = 1 << 31;

/// Status codes returned by the SPM and by the MM communicate service.
#[derive(Clone, Copy, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(i32)]
pub enum SpmStatus {
    /// `ARM_SVC_SPM_RET_SUCCESS`
    Success = 0,
    /// `ARM_SVC_SPM_RET_NOT_SUPPORTED`
    NotSupported = -1,
    /// `ARM_SVC_SPM_RET_INVALID_PARAMS`
    InvalidParams = -2,
    /// `ARM_SVC_SPM_RET_DENIED`
    Denied = -3,
    /// `ARM_SVC_SPM_RET_NO_MEMORY`
    NoMemory = -5,
}

impl SpmStatus {
    /// Returns the outcome this status stands for.
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            SpmStatus::Success => Ok(()),
            SpmStatus::NotSupported => Err(Error::NotSupported),
            SpmStatus::InvalidParams => Err(Error::InvalidParameter),
            SpmStatus::Denied => Err(Error::AccessDenied),
            SpmStatus::NoMemory => Err(Error::OutOfResources),
        }
    }
}

/// Maps an SPM status code. Unknown codes are a [`Error::DeviceError`].
pub fn spm_status(code: i32) -> Result<(), Error> {
    match SpmStatus::try_from(code) {
        Ok(status) => status.into_result(),
        Err(_) => {
            warn!("Unrecognised SPM status {code:#x}");
            Err(Error::DeviceError)
        }
    }
}

/// Maps an FF-A error code. Unknown codes, and codes which are never a meaningful answer to a
/// direct request, are a [`Error::DeviceError`].
pub fn ffa_error(code: i32) -> Error {
    match FfaError::try_from(code) {
        Ok(FfaError::NotSupported) => Error::NotSupported,
        Ok(FfaError::InvalidParameters) => Error::InvalidParameter,
        Ok(FfaError::NoMemory) => Error::OutOfResources,
        Ok(FfaError::Busy) | Ok(FfaError::Retry) => Error::NotReady,
        Ok(FfaError::Denied) => Error::AccessDenied,
        Ok(FfaError::Aborted) => Error::Aborted,
        Ok(error) => {
            warn!("Unexpected FF-A error {error:?} for a direct request");
            Error::DeviceError
        }
        Err(_) => {
            warn!("Unrecognised FF-A error {code:#x}");
            Error::DeviceError
        }
    }
}

/// What a response is expected to carry on success.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestKind {
    /// The response is an attribute mask.
    GetAttributes,
    /// The response is only a status.
    SetAttributes,
}

/// Turns a decoded response into either the value it carries or an error.
///
/// For [`RequestKind::SetAttributes`] the returned value is always 0.
pub fn normalize(
    convention: CallingConvention,
    kind: RequestKind,
    response: RawResponse,
) -> Result<u32, Error> {
    let payload = match response {
        RawResponse::Routing(code) => return Err(ffa_error(code as i32)),
        RawResponse::Payload(payload) => payload,
    };

    if payload & ERROR_BIT != 0 {
        spm_status(payload as i32)?;
        // A negative code that maps to success cannot exist, but never let it through.
        return Err(Error::DeviceError);
    }

    match (kind, convention) {
        (RequestKind::GetAttributes, _) => Ok(payload),
        (RequestKind::SetAttributes, CallingConvention::FfaDirect) => Ok(0),
        (RequestKind::SetAttributes, CallingConvention::Legacy) => {
            spm_status(payload as i32)?;
            Ok(0)
        }
    }
}
