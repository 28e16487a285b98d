//! End-to-end test infrastructure for the user notifier.
//!
//! Provides a shared TestHarness wiring a wiremock-backed directory, a
//! recording mailer and the scheduler, for tests covering the full
//! fetch -> send -> acknowledge pipeline.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use notifier_directory::{HttpDirectoryConfig, HttpUserDirectory};
use notifier_mail::MockMailer;
use notifier_scheduler::jobs::email::{register_email_job, EmailJob};
use notifier_scheduler::{JobSchedule, RecordingListener, SchedulerConfig, SchedulerService};
use notifier_types::CompletionFlag;

/// Path the directory serves its user list on.
pub const USERS_PATH: &str = "/api/User";

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Fake directory
    pub server: MockServer,
    /// Real HTTP client pointed at `server`
    pub directory: Arc<HttpUserDirectory>,
    pub mailer: Arc<MockMailer>,
    pub completion: CompletionFlag,
}

impl TestHarness {
    /// Start a fake directory and a mailer that delivers everything.
    pub async fn new() -> Self {
        Self::with_mailer(MockMailer::new()).await
    }

    pub async fn with_mailer(mailer: MockMailer) -> Self {
        let server = MockServer::start().await;
        let config = HttpDirectoryConfig {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            initial_backoff: Duration::from_millis(10),
            ..HttpDirectoryConfig::new(server.uri())
        };
        let directory =
            Arc::new(HttpUserDirectory::new(config).expect("Failed to build directory client"));

        Self {
            server,
            directory,
            mailer: Arc::new(mailer),
            completion: CompletionFlag::new(),
        }
    }

    /// Serve `users` from the list endpoint.
    pub async fn serve_users(&self, users: Value) {
        Mock::given(method("GET"))
            .and(path(USERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(users))
            .mount(&self.server)
            .await;
    }

    /// Make the list endpoint fail with `status`.
    pub async fn fail_users(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(USERS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Accept every acknowledgement.
    pub async fn accept_acks(&self) {
        Mock::given(method("PUT"))
            .and(path_regex(r"^/api/User/[^/]+/mark-email-sent$"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Reject acknowledgements for one user id.
    ///
    /// Mount before [`TestHarness::accept_acks`] so it takes priority.
    pub async fn reject_ack_for(&self, id: &str) {
        Mock::given(method("PUT"))
            .and(path(format!("{USERS_PATH}/{id}/mark-email-sent")))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
    }

    /// Email job over the harness collaborators.
    pub fn job(&self) -> EmailJob {
        EmailJob::new(
            self.directory.clone(),
            self.mailer.clone(),
            self.completion.clone(),
        )
    }

    /// Scheduler with the email job registered and a recording listener.
    pub async fn scheduler(
        &self,
        schedule: JobSchedule,
    ) -> (SchedulerService, Arc<RecordingListener>) {
        let scheduler = SchedulerService::new(SchedulerConfig {
            shutdown_timeout_secs: 5,
            ..Default::default()
        })
        .await
        .expect("Failed to create scheduler");

        let listener = Arc::new(RecordingListener::new());
        scheduler.add_listener(listener.clone());

        register_email_job(&scheduler, self.job(), schedule)
            .await
            .expect("Failed to register email job");

        (scheduler, listener)
    }

    /// Ids acknowledged so far, in request order.
    pub async fn acknowledged_ids(&self) -> Vec<String> {
        self.received()
            .await
            .iter()
            .filter(|r| r.method.as_str() == "PUT")
            .filter_map(ack_id)
            .collect()
    }

    /// Number of list requests the directory has seen.
    pub async fn list_requests(&self) -> usize {
        self.received()
            .await
            .iter()
            .filter(|r| r.method.as_str() == "GET" && r.url.path() == USERS_PATH)
            .count()
    }

    async fn received(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

/// Directory user record as served over the wire.
pub fn user_json(id: i64, email: &str, emailed: bool) -> Value {
    json!({ "id": id, "email": email, "hasReceivedEmail": emailed })
}

fn ack_id(request: &Request) -> Option<String> {
    let mut segments = request.url.path_segments()?;
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some("api"), Some("User"), Some(id), Some("mark-email-sent")) => Some(id.to_string()),
        _ => None,
    }
}
