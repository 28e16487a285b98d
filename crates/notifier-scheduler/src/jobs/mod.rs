//! Jobs run by the notifier scheduler.

pub mod email;
