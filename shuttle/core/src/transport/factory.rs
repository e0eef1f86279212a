//! Transport Factory
//!
//! Builds the transport selected by a configuration. The returned transport
//! is created but not started.

use super::{
    config::{TransportConfig, TransportType},
    pipe::PipeTransport,
    shared_memory::SharedMemoryTransport,
    socket::SocketTransport,
    traits::{Transport, TransportError},
};

/// Create a transport based on configuration
///
/// # Arguments
///
/// * `config` - The transport configuration specifying which transport to use
///
/// # Errors
///
/// Returns `TransportError::InvalidState` if the configuration fails
/// validation (for example a segment too small to hold one element).
///
/// # Example
///
/// ```no_run
/// use shuttle_core::transport::{create_transport, TransportConfig, TransportType};
/// use shuttle_core::payload;
///
/// let config = TransportConfig::for_type(TransportType::Socket);
/// let mut transport = create_transport(&config)?;
/// transport.start_session()?;
/// let reply = transport.request(&payload::generate(4))?;
/// transport.end_session()?;
/// # Ok::<(), shuttle_core::transport::TransportError>(())
/// ```
pub fn create_transport(config: &TransportConfig) -> Result<Box<dyn Transport>, TransportError> {
    config
        .validate()
        .map_err(|msg| TransportError::InvalidState(format!("Invalid transport config: {msg}")))?;

    Ok(match config.transport {
        TransportType::Pipe => Box::new(PipeTransport::new(config.pipe.clone())),
        TransportType::SharedMemory => {
            Box::new(SharedMemoryTransport::new(config.shared_memory.clone()))
        }
        TransportType::Socket => Box::new(SocketTransport::new(config.socket.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::config::SharedMemoryConfig;
    use crate::transport::SessionState;

    #[test]
    fn test_create_each_transport() {
        for (transport, name) in [
            (TransportType::Pipe, "Pipe"),
            (TransportType::SharedMemory, "SharedMemory"),
            (TransportType::Socket, "Socket"),
        ] {
            let created = create_transport(&TransportConfig::for_type(transport)).unwrap();
            assert_eq!(created.name(), name);
            // Created but not started
            assert_eq!(created.state(), SessionState::Uninitialized);
            assert_eq!(created.worker_pid(), None);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TransportConfig {
            transport: TransportType::SharedMemory,
            shared_memory: SharedMemoryConfig::default().with_segment_size(2),
            ..Default::default()
        };
        match create_transport(&config) {
            Err(TransportError::InvalidState(msg)) => assert!(msg.contains("segment_size")),
            Ok(_) => panic!("Expected error for undersized segment"),
            Err(other) => panic!("Expected InvalidState error, got: {other}"),
        }
    }
}
