//! Push channel: wire messages, event dispatch, transport and the supervised
//! reconnecting connection.

pub mod channel;
pub mod handler;
pub mod message;
pub mod reconnect;
pub mod transport;

pub use channel::PushChannel;
pub use handler::{Dispatch, Notification, NotificationKind, PushEventHandler};
pub use message::{ClientMessage, ProgressUpdate, ServerMessage};
pub use reconnect::{
    ABNORMAL_CLOSURE, ChannelState, DEFAULT_CONNECT_TIMEOUT, Directive, NORMAL_CLOSURE,
    ReconnectPolicy, ReconnectionManager,
};
pub use transport::{Frame, PushConnection, PushTransport, WsConnection, WsTransport};
