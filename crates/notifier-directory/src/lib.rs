//! Client for the remote user directory.
//!
//! The directory is reached over two operations: list every user, and
//! acknowledge that one user has been emailed. Both fail with
//! [`DirectoryError`] when the directory cannot be reached or answers
//! with a non-success status.
//!
//! - [`HttpUserDirectory`]: REST client (`GET /api/User`,
//!   `PUT /api/User/{id}/mark-email-sent`)
//! - [`MockUserDirectory`]: in-memory directory with scripted failures
//!
//! # Example
//!
//! ```rust,no_run
//! use notifier_directory::{HttpDirectoryConfig, HttpUserDirectory, UserDirectory};
//!
//! # async fn run() -> Result<(), notifier_directory::DirectoryError> {
//! let directory = HttpUserDirectory::new(HttpDirectoryConfig::new("https://localhost:7013"))?;
//! for user in directory.list_users().await? {
//!     println!("{} <{}>", user.id, user.email);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod http;
mod mock;

pub use error::DirectoryError;
pub use http::{HttpDirectoryConfig, HttpUserDirectory};
pub use mock::MockUserDirectory;

use async_trait::async_trait;

use notifier_types::{User, UserId};

/// Remote source of users and sink for delivery acknowledgments.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch every user, in the directory's order.
    async fn list_users(&self) -> Result<Vec<User>, DirectoryError>;

    /// Record that `id` has received the notification email.
    async fn mark_emailed(&self, id: &UserId) -> Result<(), DirectoryError>;
}
