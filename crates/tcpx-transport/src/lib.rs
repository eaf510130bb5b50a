pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod reactor;
pub mod server;

pub use dispatcher::{DispatchStats, Dispatcher};
pub use error::{ReactorError, ServerError};
pub use listener::{Listener, TcpAcceptor};
pub use reactor::{EventLoopPool, Reactor};
pub use server::Server;
