mod build;
mod info;
mod plan;
mod targets;

pub use build::cmd_build;
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use targets::cmd_targets;
