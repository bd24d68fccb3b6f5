mod command;
mod group_channel;
mod marshaller;

pub use command::{Command, CommandHandler};
pub use group_channel::GroupChannel;
pub use marshaller::Marshaller;
