pub mod context;
pub mod factory;
pub mod legacy;
pub mod version;

pub use context::{
    ContextError, ContextMarshaller, SerializationContext, SerializationContextRegistry,
};
pub use factory::MarshallerFactory;
pub use legacy::LegacyMarshaller;
pub use version::MarshallingVersion;
