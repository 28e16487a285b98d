//! # notifier-types
//!
//! Shared domain types for the user notifier.
//!
//! This crate defines the data structures used throughout the system:
//! - Users: transient copies of directory entries fetched per run
//! - CompletionFlag: process-wide "last batch fully delivered" signal
//! - Settings: layered configuration for the daemon
//!
//! ## Usage
//!
//! ```rust
//! use notifier_types::{CompletionFlag, User};
//!
//! let flag = CompletionFlag::new();
//! assert!(!flag.is_complete());
//!
//! let user = User::new(1, "a@x.com", false);
//! assert!(user.is_candidate());
//! ```

pub mod completion;
pub mod config;
pub mod error;
pub mod user;

pub use completion::CompletionFlag;
pub use config::{
    CompletionSettings, DirectorySettings, MailSettings, ScheduleSettings, Settings,
    SmtpSettings, SmtpTls,
};
pub use error::NotifierError;
pub use user::{User, UserId};
