pub mod connection_monitor;
pub mod connection_status;

pub use connection_monitor::{ConnectionMonitor, MonitorSettings};
pub use connection_status::{ConnectionStatus, MAX_ERROR_COUNT};
