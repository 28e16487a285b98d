//! In-memory directory for tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use notifier_types::{User, UserId};

use crate::{DirectoryError, UserDirectory};

#[derive(Default)]
struct MockState {
    users: Vec<User>,
    fail_list: bool,
    fail_mark: HashSet<UserId>,
    list_calls: usize,
    mark_calls: Vec<UserId>,
}

/// Mock directory that serves a fixed user list.
///
/// Successful acknowledgments flip the stored user's flag, like the real
/// directory would, so a second run sees the updated state. Failures can
/// be scripted for the list call or for individual users.
#[derive(Default)]
pub struct MockUserDirectory {
    state: Mutex<MockState>,
    list_delay: Option<Duration>,
}

impl MockUserDirectory {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            state: Mutex::new(MockState {
                users,
                ..Default::default()
            }),
            list_delay: None,
        }
    }

    /// Make every `list_users` call fail with `Unavailable`.
    pub fn failing_list(self) -> Self {
        self.lock().fail_list = true;
        self
    }

    /// Make `mark_emailed` fail for `id`.
    pub fn failing_mark_for(self, id: impl Into<UserId>) -> Self {
        self.lock().fail_mark.insert(id.into());
        self
    }

    /// Delay `list_users` to simulate a slow directory.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Toggle list failures after construction.
    pub fn set_list_failing(&self, failing: bool) {
        self.lock().fail_list = failing;
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Ids passed to `mark_emailed`, in call order, including failed calls.
    pub fn mark_calls(&self) -> Vec<UserId> {
        self.lock().mark_calls.clone()
    }

    /// Current stored users.
    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn list_users(&self) -> Result<Vec<User>, DirectoryError> {
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        state.list_calls += 1;
        if state.fail_list {
            return Err(DirectoryError::Unavailable(
                "mock directory unavailable".to_string(),
            ));
        }
        Ok(state.users.clone())
    }

    async fn mark_emailed(&self, id: &UserId) -> Result<(), DirectoryError> {
        let mut state = self.lock();
        state.mark_calls.push(id.clone());

        if state.fail_mark.contains(id) {
            return Err(DirectoryError::Status {
                status: 500,
                body: format!("mock failure for user {}", id),
            });
        }

        match state.users.iter_mut().find(|u| &u.id == id) {
            Some(user) => {
                user.mark_notified();
                Ok(())
            }
            None => Err(DirectoryError::Status {
                status: 404,
                body: format!("user {} not found", id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_lists_users_in_order() {
        let directory = MockUserDirectory::new(vec![
            User::new(2, "b@x.com", false),
            User::new(1, "a@x.com", true),
        ]);

        let users = directory.list_users().await.unwrap();
        assert_eq!(users[0].id, UserId::from(2));
        assert_eq!(users[1].id, UserId::from(1));
        assert_eq!(directory.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_mark_flips_stored_flag() {
        let directory = MockUserDirectory::new(vec![User::new(1, "a@x.com", false)]);

        directory.mark_emailed(&UserId::from(1)).await.unwrap();

        assert!(directory.users()[0].notified);
        assert_eq!(directory.mark_calls(), vec![UserId::from(1)]);
    }

    #[tokio::test]
    async fn test_mock_scripted_failures() {
        let directory = MockUserDirectory::new(vec![User::new(1, "a@x.com", false)])
            .failing_list()
            .failing_mark_for(1);

        assert!(directory.list_users().await.is_err());
        assert!(directory.mark_emailed(&UserId::from(1)).await.is_err());
        assert!(!directory.users()[0].notified);

        directory.set_list_failing(false);
        assert!(directory.list_users().await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_unknown_user() {
        let directory = MockUserDirectory::new(vec![]);
        let result = directory.mark_emailed(&UserId::from(99)).await;
        assert!(matches!(result, Err(DirectoryError::Status { status: 404, .. })));
    }
}
