mod context;
pub mod dispatcher;
pub mod factory;
pub mod fork;

pub use dispatcher::CommandDispatcher;
pub use factory::CommandDispatcherFactory;
pub use fork::ForkRegistry;
