//! Socket listeners for public endpoints and the control socket.
//!
//! Every listener runs a non-blocking accept loop on its own thread and hands
//! each accepted connection to a [`RequestHandler`] on a dedicated thread.

mod errors;
mod listener;
mod stream;
mod tls;

pub use self::errors::ListenerError;
pub(crate) use self::listener::{ListenerHandle, ServeOptions, SocketListener};
pub use self::stream::{ConnectionStream, RequestHandler};
pub(crate) use self::tls::load_server_config;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
