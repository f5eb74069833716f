//! HiveSync core
//!
//! Versioned, protection-controlled storage on a DHT overlay, plus the
//! transactional process engine that composes data operations into
//! all-or-nothing workflows.
//!
//! - [`core_dht`]: overlay contract and the in-process overlay
//! - [`core_data`]: versioned entries, protection keys and the data manager
//! - [`core_process`]: steps, composites, processes and their context

pub mod config;
pub mod core_data;
pub mod core_dht;
pub mod core_process;
pub mod logging;
pub mod metrics;
pub mod test_utils;

pub use config::Config;
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = Config::default();
        let _ = core_process::ProcessStatus::Ready;
    }
}
