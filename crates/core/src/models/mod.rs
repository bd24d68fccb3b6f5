mod envelope;
mod ids;
mod member;
mod view;

pub use envelope::{EnvelopeKind, InboundMessage, PayloadBody, WireEnvelope};
pub use ids::{ContextId, ForkId};
pub use member::Member;
pub use view::GroupView;
