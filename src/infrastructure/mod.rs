pub mod log_notifier;
pub mod paper_exchange;
