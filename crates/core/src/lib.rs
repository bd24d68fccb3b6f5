pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{AppConfig, ContextSpec, DispatchConfig, GroupConfig, MarshallingConfig, ObservabilityConfig};
pub use errors::{DispatchError, DispatchResult};
pub use models::{
    ContextId, EnvelopeKind, ForkId, GroupView, InboundMessage, Member, PayloadBody, WireEnvelope,
};
pub use traits::{Command, CommandHandler, GroupChannel, Marshaller};
