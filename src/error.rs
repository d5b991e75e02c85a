// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

/// The outcome of a failed call across the secure world boundary.
///
/// Every raw status code, whichever calling convention or protocol layer it came from, is
/// translated into one of these before it reaches a caller. Codes that have no translation become
/// [`Error::DeviceError`].
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// A parameter was rejected, either locally or by the secure side.
    #[error("Invalid parameter")]
    InvalidParameter,
    /// The secure side refused the request.
    #[error("Access denied")]
    AccessDenied,
    /// The secure side ran out of memory or another resource.
    #[error("Out of resources")]
    OutOfResources,
    /// The request is not implemented by the secure side.
    #[error("Not supported")]
    NotSupported,
    /// The secure side is busy and the request may be retried later.
    #[error("Not ready")]
    NotReady,
    /// The secure side aborted the request.
    #[error("Aborted")]
    Aborted,
    /// Generic failure, including any status code which could not be classified.
    #[error("Device error")]
    DeviceError,
}
