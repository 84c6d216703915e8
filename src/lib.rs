pub mod config;
pub mod error;
pub mod list;
pub mod models;
pub mod reconciler;
pub mod session;
pub mod transport;

pub use error::{Operation, ReconcileError, TransportError};
pub use models::{Message, MessageId, MessageStatus, NewMessage, ServerMessage};
pub use reconciler::{FailedSendPolicy, Reconciler, Snapshot};
pub use session::{resolve_author, Profile, Session};
pub use transport::{HttpTransport, MessageTransport};
