//! TCP servers: the IQ stream fan-out and the control channel

pub mod control;
pub mod stream;

use std::net::{SocketAddr, TcpListener};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::NetworkError;

pub use control::{ControlHandler, ControlMessage, ControlServer};
pub use stream::{ClientConnection, StreamServer};

/// Create a listening socket with `SO_REUSEADDR` set
pub fn create_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, NetworkError> {
    let bind_failed = |source| NetworkError::BindFailed { addr, source };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_failed)?;
    socket.set_reuse_address(true).map_err(bind_failed)?;
    socket.bind(&addr.into()).map_err(bind_failed)?;
    socket.listen(backlog).map_err(bind_failed)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_binds_ephemeral_port() {
        let listener = create_listener("127.0.0.1:0".parse().unwrap(), 1).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_conflict_reports_address() {
        let first = create_listener("127.0.0.1:0".parse().unwrap(), 1).unwrap();
        let addr = first.local_addr().unwrap();
        match create_listener(addr, 1) {
            Err(NetworkError::BindFailed { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("expected bind failure, got {other:?}"),
        }
    }
}
