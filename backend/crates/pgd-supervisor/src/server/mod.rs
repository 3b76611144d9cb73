mod definition;
mod event;
mod managed_server;
mod registry;
mod server_state;
mod server_status;

pub use definition::ServerDefinition;
pub use event::SupervisorEvent;
pub use registry::ServerRegistry;
pub use server_state::ServerState;
pub use server_status::ServerStatus;

pub(crate) use managed_server::ManagedServer;
