//! 命令定义和实现

pub mod config;
pub mod pick;
pub mod run;
pub mod scan;
pub mod status;

pub use config::ConfigCommand;
pub use pick::PickCommand;
pub use run::RunCommand;
pub use scan::ScanCommand;
