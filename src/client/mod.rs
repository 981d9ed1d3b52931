pub mod editor;
pub mod locks;
pub mod store;
pub mod transport;

pub use editor::{EditorHandle, EditorSession, SaveState, SessionNotice};
pub use locks::LockTracker;
pub use store::{CardStore, HttpCardStore};
pub use transport::{SocketClient, TransportConfig};
