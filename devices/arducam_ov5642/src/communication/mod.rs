pub mod command;
pub mod link;

pub use command::{Command, CommandReader};
pub use link::{Link, LinkMode};
