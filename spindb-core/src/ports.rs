//! Port availability probing and advisory allocation.
//!
//! Allocation is advisory only: the probe binds and immediately releases,
//! and the engine's own `start` performs the real bind later.

use std::net::TcpListener;

use spindb_model::SpinError;

/// Try to bind `127.0.0.1:port`; success means the port is free right
/// now.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// `preferred` if free, otherwise the lowest free port in the inclusive
/// `range`.
pub fn allocate_port(
    range: (u16, u16),
    preferred: u16,
) -> Result<u16, SpinError> {
    let (start, end) = range;
    if start == 0 && end == 0 {
        // File-based engines have no port.
        return Ok(0);
    }
    if (start..=end).contains(&preferred) && is_port_available(preferred) {
        return Ok(preferred);
    }
    for port in start..=end {
        if port != preferred && is_port_available(port) {
            return Ok(port);
        }
    }
    Err(SpinError::PortRangeExhausted { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_port_wins_when_free() {
        // An ephemeral port the OS just handed us is free after drop.
        let probe = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        assert_eq!(allocate_port((port, port), port).unwrap(), port);
    }

    #[test]
    fn allocation_skips_a_held_port() {
        let held = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = held.local_addr().unwrap().port();
        // Range of exactly the held port: exhausted.
        let err = allocate_port((port, port), port).unwrap_err();
        assert_eq!(err.code(), "PORT_RANGE_EXHAUSTED");
    }

    #[test]
    fn file_based_range_allocates_port_zero() {
        assert_eq!(allocate_port((0, 0), 0).unwrap(), 0);
    }
}
