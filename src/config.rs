// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Build-time configuration.

use core::num::NonZeroU32;

/// The register layout and framing used to reach the Secure Partition Manager.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallingConvention {
    /// SPM calls are made directly, with the SPM function ID in x0.
    Legacy,
    /// SPM calls are wrapped in an FF-A direct request to the secure partition.
    FfaDirect,
}

impl CallingConvention {
    /// The convention selected by the `ffa` feature.
    pub const BUILD_TIME: Self = if cfg!(feature = "ffa") {
        Self::FfaDirect
    } else {
        Self::Legacy
    };
}

/// Process-wide settings, fixed once the bridge has been created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// How attribute requests are framed.
    pub convention: CallingConvention,
    /// How many times opening a session is attempted before giving up.
    pub open_session_attempts: NonZeroU32,
    /// How many foreign interrupt returns a single OP-TEE call may be resumed from.
    pub rpc_limit: u32,
}

impl Config {
    const DEFAULT_OPEN_SESSION_ATTEMPTS: NonZeroU32 = NonZeroU32::new(3).unwrap();
    const DEFAULT_RPC_LIMIT: u32 = 1024;

    /// The configuration selected by the build-time environment.
    pub const BUILD_TIME: Self = Self {
        convention: CallingConvention::BUILD_TIME,
        open_session_attempts: build_time_open_session_attempts(),
        rpc_limit: Self::DEFAULT_RPC_LIMIT,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::BUILD_TIME
    }
}

/// Returns the number of session open attempts set by the build-time environment variable
/// `MM_OPEN_SESSION_ATTEMPTS`, a positive decimal number. If it is absent or malformed the default
/// of 3 is used.
pub const fn build_time_open_session_attempts() -> NonZeroU32 {
    let attempts = match option_env!("MM_OPEN_SESSION_ATTEMPTS") {
        Some(attempts) => attempts,
        None => "",
    };
    match parse_decimal(attempts.as_bytes()) {
        Some(attempts) => match NonZeroU32::new(attempts) {
            Some(attempts) => attempts,
            None => Config::DEFAULT_OPEN_SESSION_ATTEMPTS,
        },
        None => Config::DEFAULT_OPEN_SESSION_ATTEMPTS,
    }
}

const fn parse_decimal(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }
    let mut value: u32 = 0;
    let mut i = 0;
    while i < digits.len() {
        let digit = digits[i];
        if !digit.is_ascii_digit() {
            return None;
        }
        value = match value.checked_mul(10) {
            Some(value) => match value.checked_add((digit - b'0') as u32) {
                Some(value) => value,
                None => return None,
            },
            None => return None,
        };
        i += 1;
    }
    Some(value)
}
