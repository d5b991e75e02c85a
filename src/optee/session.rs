// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Sessions with a trusted application.

use super::{
    InvokeRequest, Session, TeeStatus,
    transport::{OpteeTransport, call_with_arg},
};
use crate::{config::Config, error::Error};
use log::{debug, error, warn};
use uuid::Uuid;

/// A channel to OP-TEE over which at most one session is open at a time.
#[derive(Debug)]
pub struct Channel<T> {
    transport: T,
    config: Config,
    session: Option<Session>,
    last_status: Option<TeeStatus>,
}

impl<T: OpteeTransport> Channel<T> {
    /// Creates a channel with no open session.
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            transport,
            config,
            session: None,
            last_status: None,
        }
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Returns the open session, if any.
    pub fn session(&self) -> Option<Session> {
        self.session
    }

    /// Returns whether a session is open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the status of the most recent message, including failed ones.
    pub fn last_status(&self) -> Option<TeeStatus> {
        self.last_status
    }

    /// Opens a session with the trusted application `identifier`.
    ///
    /// A failed open is attempted again, up to the configured number of attempts in total.
    pub fn open(&mut self, identifier: &Uuid) -> Result<Session, Error> {
        if let Some(session) = self.session {
            error!("Session {:#x} is still open", session.id());
            return Err(Error::DeviceError);
        }

        let attempts = self.config.open_session_attempts.get();
        let mut last_error = Error::DeviceError;
        for attempt in 1..=attempts {
            match self.open_once(identifier) {
                Ok(session) => {
                    debug!("Opened session {:#x} with {identifier}", session.id());
                    self.session = Some(session);
                    return Ok(session);
                }
                Err(e) => {
                    warn!("Opening session with {identifier} failed ({attempt}/{attempts}): {e}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn open_once(&mut self, identifier: &Uuid) -> Result<Session, Error> {
        self.transport.message_arg().set_open_session(identifier);
        let status = self.send();
        if let Err(e) = status.result() {
            error!("OP-TEE refused to open session: {status}");
            return Err(e);
        }
        Session::new(self.transport.message_arg().session).ok_or_else(|| {
            error!("OP-TEE opened session 0");
            Error::DeviceError
        })
    }

    /// Invokes a function within the open session, copying output parameters back into
    /// `request` on success.
    pub fn invoke(&mut self, request: &mut InvokeRequest) -> Result<(), Error> {
        if self.session != Some(request.session) {
            error!("Invoke on session {:#x} which is not open", request.session.id());
            return Err(Error::DeviceError);
        }

        self.transport.message_arg().set_invoke(request);
        let status = self.send();
        if let Err(e) = status.result() {
            error!(
                "Invoking function {} on session {:#x} failed: {status}",
                request.function,
                request.session.id()
            );
            return Err(e);
        }
        request.update(self.transport.message_arg());
        Ok(())
    }

    /// Closes the open session, if any.
    ///
    /// The channel has no open session afterwards even if OP-TEE reports a failure, which is
    /// still returned. Closing is never retried.
    pub fn close(&mut self) -> Result<(), Error> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        self.transport.message_arg().set_close_session(session);
        let status = self.send();
        status.result().inspect_err(|_| {
            warn!("Closing session {:#x} failed: {status}", session.id());
        })?;
        debug!("Closed session {:#x}", session.id());
        Ok(())
    }

    /// Sends the message argument and returns its status.
    fn send(&mut self) -> TeeStatus {
        let status = match call_with_arg(&mut self.transport, self.config.rpc_limit) {
            Ok(()) => self.transport.message_arg().status(),
            Err(_) => {
                let arg = self.transport.message_arg();
                arg.ret = TeeStatus::COMMUNICATION_FAILURE.code;
                arg.ret_origin = TeeStatus::COMMUNICATION_FAILURE.origin;
                TeeStatus::COMMUNICATION_FAILURE
            }
        };
        self.last_status = Some(status);
        status
    }
}
