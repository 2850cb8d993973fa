mod build;
mod clean;
mod publish;
mod session;
mod update;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use publish::{PublishOptions, cmd_publish};
pub use session::SessionOptions;
pub use test::cmd_test;
pub use update::cmd_update;
