//! Folder-branch status keeping and change notification.

mod keeper;

pub use keeper::{DirtyNode, FolderStatus, IdentityProvider, StatusKeeper, WaitHandle};
