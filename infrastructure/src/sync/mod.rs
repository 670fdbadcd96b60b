pub mod retry_timer;

#[rustfmt::skip]
pub use self::retry_timer::RetryTimer;
