//! Tasksync engine: push and pull channel IO and the session driver.
mod api;
mod decode;
mod poll;
mod registry;
mod session;
mod settings;
mod subscriber;
mod transport;
mod types;
mod ws;

pub use api::{ApiClient, SearchResults, StatusSource, TedCandidate};
pub use decode::{decode_frame, decode_snapshot};
pub use poll::{PollObservation, Poller, SnapshotSink};
pub use registry::SessionRegistry;
pub use session::{SessionHandle, TaskSession};
pub use settings::SyncSettings;
pub use subscriber::{ChannelSubscriber, Subscriber};
pub use transport::{
    ConnectionHandle, ConnectionPhase, ConnectionState, Inbound, PushConnector, PushSocket,
    TransportConnection, TransportEvent, ABNORMAL_CLOSE, HEARTBEAT_FRAME,
};
pub use types::{ApiError, ApiFailureKind, DecodeError, PollError, TransportError};
pub use ws::WsConnector;
