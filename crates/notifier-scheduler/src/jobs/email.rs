//! Email notification job.
//!
//! One run fetches every user from the directory, mails each user that has
//! not been notified yet and acknowledges every successful send back to the
//! directory. The shared [`CompletionFlag`] is raised only when a run had at
//! least one pending user and every one of them was both mailed and
//! acknowledged.
//!
//! Delivery is at-least-once: sending and acknowledging are not atomic, so a
//! crash or a failed acknowledgement between the two steps means the user is
//! mailed again on a later run.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notifier_directory::UserDirectory;
use notifier_mail::{Mailer, OutgoingMail};
use notifier_types::{CompletionFlag, MailSettings, User};

use crate::{
    JobExecutionError, JobOutput, JobSchedule, OverlapPolicy, SchedulerError, SchedulerService,
};

/// Subject and body sent to every user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailContent {
    pub subject: String,
    pub body: String,
}

impl MailContent {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    pub fn from_settings(settings: &MailSettings) -> Self {
        Self::new(settings.subject.clone(), settings.body.clone())
    }
}

impl Default for MailContent {
    fn default() -> Self {
        Self::from_settings(&MailSettings::default())
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Users returned by the directory
    pub fetched: usize,
    /// Users that had not been notified
    pub candidates: usize,
    /// Successful sends
    pub sent: usize,
    /// Successful acknowledgements
    pub acknowledged: usize,
    pub send_failures: usize,
    pub ack_failures: usize,
    /// The directory could not be listed; nothing else happened
    pub fetch_failed: bool,
    /// This run raised the completion flag
    pub completed: bool,
}

impl BatchReport {
    /// Every candidate was sent and acknowledged, and there was at least one.
    pub fn all_delivered(&self) -> bool {
        !self.fetch_failed && self.candidates > 0 && self.acknowledged == self.candidates
    }

    pub fn to_output(&self) -> JobOutput {
        JobOutput::new()
            .with_count("fetched", self.fetched)
            .with_count("candidates", self.candidates)
            .with_count("sent", self.sent)
            .with_count("acknowledged", self.acknowledged)
            .with_count("send_failures", self.send_failures)
            .with_count("ack_failures", self.ack_failures)
            .with_metadata("fetch_failed", self.fetch_failed.to_string())
            .with_metadata("completed", self.completed.to_string())
    }
}

/// The fetch, filter, send and acknowledge pass over the directory.
pub struct EmailJob {
    directory: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    completion: CompletionFlag,
    content: MailContent,
    reset_on_pending: bool,
}

impl EmailJob {
    /// Name the job is registered under.
    pub const NAME: &'static str = "email_notifications";

    pub fn new(
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        completion: CompletionFlag,
    ) -> Self {
        Self {
            directory,
            mailer,
            completion,
            content: MailContent::default(),
            reset_on_pending: false,
        }
    }

    pub fn with_content(mut self, content: MailContent) -> Self {
        self.content = content;
        self
    }

    /// Clear the completion flag when a run finds pending users.
    pub fn with_reset_on_pending(mut self, reset: bool) -> Self {
        self.reset_on_pending = reset;
        self
    }

    pub fn completion(&self) -> &CompletionFlag {
        &self.completion
    }

    /// Run one batch.
    ///
    /// Failures are handled per step and reported in the returned
    /// [`BatchReport`]; none of them aborts the batch.
    pub async fn run(&self) -> BatchReport {
        let mut report = BatchReport::default();

        let users = match self.directory.list_users().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "Failed to fetch users, completion flag left unchanged");
                report.fetch_failed = true;
                return report;
            }
        };
        report.fetched = users.len();

        let mut candidates: Vec<User> = users.into_iter().filter(User::is_candidate).collect();
        report.candidates = candidates.len();

        if candidates.is_empty() {
            info!(fetched = report.fetched, "No users waiting for an email");
            return report;
        }

        if self.reset_on_pending && self.completion.is_complete() {
            self.completion.clear();
            debug!("Cleared completion flag for new batch");
        }

        info!(
            fetched = report.fetched,
            candidates = report.candidates,
            "Sending emails"
        );

        for user in candidates.iter_mut() {
            self.notify(user, &mut report).await;
        }

        if report.all_delivered() {
            self.completion.mark_complete();
            report.completed = true;
            info!(sent = report.sent, "All pending users were emailed");
        } else {
            warn!(
                candidates = report.candidates,
                acknowledged = report.acknowledged,
                send_failures = report.send_failures,
                ack_failures = report.ack_failures,
                "Batch finished with failures, completion flag left unchanged"
            );
        }

        report
    }

    async fn notify(&self, user: &mut User, report: &mut BatchReport) {
        let mail = OutgoingMail::new(&user.email, &self.content.subject, &self.content.body);

        if let Err(e) = self.mailer.send(&mail).await {
            report.send_failures += 1;
            error!(user_id = %user.id, email = %user.email, error = %e, "Failed to send email");
            return;
        }
        report.sent += 1;
        debug!(user_id = %user.id, email = %user.email, "Email sent");

        match self.directory.mark_emailed(&user.id).await {
            Ok(()) => {
                user.mark_notified();
                report.acknowledged += 1;
                info!(user_id = %user.id, email = %user.email, "User notified");
            }
            Err(e) => {
                report.ack_failures += 1;
                warn!(
                    user_id = %user.id,
                    email = %user.email,
                    error = %e,
                    "Email sent but not acknowledged, user will be mailed again on a later run"
                );
            }
        }
    }
}

/// Register `job` on `scheduler` with overlapping ticks skipped.
pub async fn register_email_job(
    scheduler: &SchedulerService,
    job: EmailJob,
    schedule: JobSchedule,
) -> Result<Uuid, SchedulerError> {
    let job = Arc::new(job);
    scheduler
        .register_job(EmailJob::NAME, schedule, OverlapPolicy::Skip, move || {
            let job = job.clone();
            async move { Ok::<_, JobExecutionError>(job.run().await.to_output()) }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FireOutcome, SchedulerConfig};
    use notifier_directory::MockUserDirectory;
    use notifier_mail::MockMailer;
    use notifier_types::UserId;
    use std::time::Duration;

    struct Fixture {
        directory: Arc<MockUserDirectory>,
        mailer: Arc<MockMailer>,
        flag: CompletionFlag,
    }

    impl Fixture {
        fn new(directory: MockUserDirectory, mailer: MockMailer) -> Self {
            Self {
                directory: Arc::new(directory),
                mailer: Arc::new(mailer),
                flag: CompletionFlag::new(),
            }
        }

        fn job(&self) -> EmailJob {
            EmailJob::new(
                self.directory.clone(),
                self.mailer.clone(),
                self.flag.clone(),
            )
        }
    }

    fn users(list: &[(i64, &str, bool)]) -> Vec<User> {
        list.iter()
            .map(|(id, email, notified)| User::new(*id, *email, *notified))
            .collect()
    }

    #[tokio::test]
    async fn test_only_unnotified_users_are_mailed() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false), (2, "b@x.com", true)])),
            MockMailer::new(),
        );

        let report = fx.job().run().await;

        assert_eq!(fx.mailer.attempted_recipients(), vec!["a@x.com"]);
        assert_eq!(fx.directory.mark_calls(), vec![UserId::from(1)]);
        assert!(fx.flag.is_complete());
        assert_eq!(report.fetched, 2);
        assert_eq!(report.candidates, 1);
        assert!(report.completed);
    }

    #[tokio::test]
    async fn test_send_failure_is_isolated() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false), (2, "b@x.com", false)])),
            MockMailer::new().failing_for("b@x.com"),
        );

        let report = fx.job().run().await;

        assert_eq!(
            fx.mailer.attempted_recipients(),
            vec!["a@x.com", "b@x.com"]
        );
        assert_eq!(fx.directory.mark_calls(), vec![UserId::from(1)]);
        assert!(!fx.flag.is_complete());
        assert_eq!(report.send_failures, 1);
        assert!(!report.completed);
    }

    #[tokio::test]
    async fn test_failure_on_first_user_still_reaches_the_rest() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[
                (1, "a@x.com", false),
                (2, "b@x.com", false),
                (3, "c@x.com", false),
            ])),
            MockMailer::new().failing_for("a@x.com"),
        );

        fx.job().run().await;

        assert_eq!(
            fx.directory.mark_calls(),
            vec![UserId::from(2), UserId::from(3)]
        );
        assert!(!fx.flag.is_complete());
    }

    #[tokio::test]
    async fn test_ack_failure_leaves_flag_and_user_pending() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false), (2, "b@x.com", false)]))
                .failing_mark_for(2),
            MockMailer::new(),
        );

        let report = fx.job().run().await;

        assert_eq!(report.sent, 2);
        assert_eq!(report.acknowledged, 1);
        assert_eq!(report.ack_failures, 1);
        assert!(!fx.flag.is_complete());

        let stored = fx.directory.users();
        assert!(stored[0].notified);
        assert!(!stored[1].notified);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_flag_unchanged() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false)])).failing_list(),
            MockMailer::new(),
        );
        fx.flag.mark_complete();

        let report = fx.job().run().await;

        assert!(report.fetch_failed);
        assert!(fx.mailer.attempted_recipients().is_empty());
        assert!(fx.directory.mark_calls().is_empty());
        assert!(fx.flag.is_complete());
    }

    #[tokio::test]
    async fn test_fetch_failure_does_not_raise_flag() {
        let fx = Fixture::new(
            MockUserDirectory::new(Vec::new()).failing_list(),
            MockMailer::new(),
        );

        fx.job().run().await;

        assert!(!fx.flag.is_complete());
    }

    #[tokio::test]
    async fn test_empty_candidates_leave_flag_unchanged() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", true)])),
            MockMailer::new(),
        );

        let report = fx.job().run().await;
        assert!(!fx.flag.is_complete());
        assert_eq!(report.candidates, 0);
        assert!(!report.all_delivered());

        fx.flag.mark_complete();
        fx.job().run().await;
        assert!(fx.flag.is_complete());
        assert!(fx.mailer.attempted_recipients().is_empty());
    }

    #[tokio::test]
    async fn test_users_processed_in_fetch_order() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[
                (9, "z@x.com", false),
                (1, "a@x.com", false),
                (5, "m@x.com", false),
            ])),
            MockMailer::new(),
        );

        fx.job().run().await;

        assert_eq!(
            fx.mailer.attempted_recipients(),
            vec!["z@x.com", "a@x.com", "m@x.com"]
        );
    }

    #[tokio::test]
    async fn test_second_run_skips_acknowledged_users() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false), (2, "b@x.com", false)]))
                .failing_mark_for(2),
            MockMailer::new(),
        );
        let job = fx.job();

        job.run().await;
        let second = job.run().await;

        // User 2 was never acknowledged, so it is mailed again.
        assert_eq!(second.candidates, 1);
        assert_eq!(
            fx.mailer.attempted_recipients(),
            vec!["a@x.com", "b@x.com", "b@x.com"]
        );
    }

    #[tokio::test]
    async fn test_reset_on_pending_clears_stale_flag() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false)])),
            MockMailer::new().failing_for("a@x.com"),
        );
        fx.flag.mark_complete();

        fx.job().with_reset_on_pending(true).run().await;

        assert!(!fx.flag.is_complete());
    }

    #[tokio::test]
    async fn test_without_reset_flag_stays_stale() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false)])),
            MockMailer::new().failing_for("a@x.com"),
        );
        fx.flag.mark_complete();

        fx.job().run().await;

        assert!(fx.flag.is_complete());
    }

    #[tokio::test]
    async fn test_custom_content_is_sent() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false)])),
            MockMailer::new(),
        );

        fx.job()
            .with_content(MailContent::new("Welcome", "Hello there"))
            .run()
            .await;

        let sent = fx.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Welcome");
        assert_eq!(sent[0].body, "Hello there");
    }

    #[test]
    fn test_report_output_metadata() {
        let report = BatchReport {
            fetched: 3,
            candidates: 2,
            sent: 2,
            acknowledged: 2,
            completed: true,
            ..Default::default()
        };

        let output = report.to_output();
        assert_eq!(output.metadata.get("fetched"), Some(&"3".to_string()));
        assert_eq!(output.metadata.get("acknowledged"), Some(&"2".to_string()));
        assert_eq!(output.metadata.get("completed"), Some(&"true".to_string()));
        assert!(report.all_delivered());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_overlapping_ticks_never_run_concurrently() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false), (2, "b@x.com", false)]))
                .with_list_delay(Duration::from_millis(300)),
            MockMailer::new(),
        );
        let scheduler = SchedulerService::new(SchedulerConfig::default())
            .await
            .unwrap();
        register_email_job(
            &scheduler,
            fx.job(),
            JobSchedule::every(Duration::from_secs(3600)),
        )
        .await
        .unwrap();

        let (first, second, third) = tokio::join!(
            scheduler.trigger_job(EmailJob::NAME),
            scheduler.trigger_job(EmailJob::NAME),
            scheduler.trigger_job(EmailJob::NAME),
        );
        let outcomes = [first.unwrap(), second.unwrap(), third.unwrap()];

        let completed = outcomes.iter().filter(|o| o.record().is_some()).count();
        let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
        assert_eq!(completed, 1);
        assert_eq!(skipped, 2);

        assert_eq!(fx.directory.list_calls(), 1);
        assert_eq!(
            fx.mailer.attempted_recipients(),
            vec!["a@x.com", "b@x.com"]
        );
        assert!(fx.flag.is_complete());

        let status = scheduler.registry().get_status(EmailJob::NAME).unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.skip_count, 2);
        assert_eq!(
            status.last_run_metadata.get("sent"),
            Some(&"2".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_paused_email_job_is_vetoed() {
        let fx = Fixture::new(
            MockUserDirectory::new(users(&[(1, "a@x.com", false)])),
            MockMailer::new(),
        );
        let scheduler = SchedulerService::new(SchedulerConfig::default())
            .await
            .unwrap();
        register_email_job(
            &scheduler,
            fx.job(),
            JobSchedule::every(Duration::from_secs(3600)),
        )
        .await
        .unwrap();

        scheduler.pause_job(EmailJob::NAME).unwrap();
        let outcome = scheduler.trigger_job(EmailJob::NAME).await.unwrap();

        assert!(matches!(outcome, FireOutcome::Vetoed(_)));
        assert_eq!(fx.directory.list_calls(), 0);
        assert!(!fx.flag.is_complete());
    }
}
