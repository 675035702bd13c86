//! Inbox access.

pub mod email;
pub mod inbox;

pub use email::{EmailConfig, ImapInbox};
pub use inbox::{AlertEmail, InboxQuery, InboxSource};
