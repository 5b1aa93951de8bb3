pub mod notify;
pub mod storage;

pub use notify::{ChannelNotifier, LogNotifier, Notification, Notifier};
pub use storage::{ArtifactStore, FsArtifactStore};
