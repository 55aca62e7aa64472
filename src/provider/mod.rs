//! Update provider interface.
//!
//! The provider is the external mechanism that knows about update
//! availability and actually downloads/installs updates. The agent only
//! reaches it through the narrow `UpdateProvider` contract.

mod fake;

pub use self::fake::{FakeFetch, FakeProvider};

use crate::policy::UpdateSnapshot;
use failure::Fallible;
use futures::future::BoxFuture;
use std::fmt;

/// Provider-native install status codes.
pub mod install_status {
    pub const UNKNOWN: i32 = 0;
    pub const PENDING: i32 = 1;
    pub const DOWNLOADING: i32 = 2;
    pub const INSTALLING: i32 = 3;
    pub const INSTALLED: i32 = 4;
    pub const FAILED: i32 = 5;
    pub const CANCELED: i32 = 6;
    pub const DOWNLOADED: i32 = 11;
}

/// Kind of update flow to start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Immediate,
    Flexible,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FlowKind::Immediate => write!(f, "immediate"),
            FlowKind::Flexible => write!(f, "flexible"),
        }
    }
}

/// Opaque host handle, used by the provider to present its own flow UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowHandle(String);

impl FlowHandle {
    pub fn new<S: Into<String>>(name: S) -> Self {
        FlowHandle(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Callback receiving raw install status codes.
pub type InstallListener = Box<dyn Fn(i32) + Send + Sync>;

/// Registration handle for an install listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// External update provider.
pub trait UpdateProvider: Send + Sync {
    /// Fetch a fresh update-availability snapshot.
    fn fetch_snapshot(&self) -> BoxFuture<'static, Fallible<UpdateSnapshot>>;

    /// Start an update flow. Returns whether the flow was started.
    fn start_flow(&self, kind: FlowKind, handle: FlowHandle) -> BoxFuture<'static, Fallible<bool>>;

    /// Complete the installation of a downloaded update.
    fn complete_install(&self) -> BoxFuture<'static, Fallible<()>>;

    /// Register a listener for install status pushes.
    fn subscribe(&self, listener: InstallListener) -> Fallible<ListenerId>;

    /// Unregister a listener.
    fn unsubscribe(&self, id: ListenerId) -> Fallible<()>;
}
