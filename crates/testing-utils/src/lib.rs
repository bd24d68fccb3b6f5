//! 各crate测试套件共享的mock、fixture命令和处理器

mod channel;
mod commands;

pub use channel::RecordingChannel;
pub use commands::{
    members, DelayedHandler, EchoCommand, EchoHandler, EchoResponse, FailingHandler, PingCommand,
    PingHandler, PoisonCommand, SilentHandler,
};
