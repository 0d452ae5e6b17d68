use std::net::{Ipv4Addr, TcpListener};

use tracing::debug;

use crate::{Result, WizardError};

/// Find the first free local TCP port in `start..start + max_tries`
///
/// A port counts as free when a loopback listener can bind it; the probe
/// listener is dropped immediately so the caller can bind it again.
///
/// # Errors
///
/// Returns [`WizardError::NoPortAvailable`] if none of the ports bind, or if
/// `max_tries` is zero.
pub fn find_available_port(start: u16, max_tries: u16) -> Result<u16> {
    let end = start.saturating_add(max_tries.saturating_sub(1));

    for offset in 0..max_tries {
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        if is_port_available(port) {
            return Ok(port);
        }
        debug!("Port {} is busy", port);
    }

    Err(WizardError::NoPortAvailable { start, end })
}

/// Probe on loopback, where the callback server binds
fn is_port_available(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}
