use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};

use anyhow::anyhow;

use crate::error::{LibError, Result};

/// Address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick a route.
/// Hosts without a route fall back to loopback.
pub fn local_address() -> IpAddr {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());

    match probe {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(err) => {
            tracing::warn!(error = %err, "no outbound interface, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// A TCP port the OS reports as free right now.
pub fn random_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(|err| LibError::config("Failed to reserve a port", anyhow!(err)))?;
    let port = listener
        .local_addr()
        .map_err(|err| LibError::config("Failed to reserve a port", anyhow!(err)))?
        .port();
    Ok(port)
}
