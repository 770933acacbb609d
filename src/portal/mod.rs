//! Captive portal abstraction layer
//!
//! The controller drives a portal only through the `CaptivePortal` trait, so
//! the network side can be swapped for a scripted one in tests.

pub mod kmitl;

pub use kmitl::{Endpoints, KmitlPortal};

use crate::models::LoginOutcome;
use async_trait::async_trait;

/// Network operations the reconnection controller relies on.
///
/// None of these return errors: every failure is logged by the
/// implementation and collapsed into `false` or `None`. None of them retry.
#[async_trait]
pub trait CaptivePortal: Send + Sync {
    /// Human-readable name for log lines
    fn name(&self) -> &str;

    /// True only when the network is open to the internet
    async fn check_connection(&self) -> bool;

    /// Discover portal parameters and submit credentials
    async fn login(&self) -> Option<LoginOutcome>;

    /// Keep the current portal session alive
    async fn heartbeat(&self) -> bool;
}
