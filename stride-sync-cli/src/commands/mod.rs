mod buffer;
mod config_cmd;
mod flush;
mod run;
mod status;

pub use buffer::BufferCommand;
pub use config_cmd::ConfigCommand;
pub use flush::FlushCommand;
pub use run::RunCommand;
pub use status::StatusCommand;
