//! Hosting pieces around the sync core: the HTTP backend client, the
//! connectivity monitor that drives the coordinator's mode, and the section
//! file that stands in for editor content.

pub mod http_backend;
pub mod monitor;
pub mod section_file;

pub use http_backend::{check_server, BackendSetupError, HttpBackend};
pub use monitor::ConnectivityMonitor;
pub use section_file::SectionFile;
