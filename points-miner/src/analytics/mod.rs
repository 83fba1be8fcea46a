//! Analytics sink.
//!
//! The dispatcher and supervisor emit point samples and annotations here;
//! the store is the boundary to whatever reads them later (the dashboard
//! is an external collaborator). `NoopSink` stands in when analytics are
//! disabled.

pub mod repository;

pub use repository::SqliteAnalytics;

use async_trait::async_trait;

/// Receiver for analytics events.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Record the broadcaster's balance after an earn/spend event.
    async fn record_points(&self, login: &str, points: u64, reason: &str);

    /// Record a point-in-time annotation (streak reward, prediction
    /// result, status change).
    async fn record_annotation(&self, login: &str, kind: &str, text: &str);
}

/// Sink used when analytics are disabled.
pub struct NoopSink;

#[async_trait]
impl AnalyticsSink for NoopSink {
    async fn record_points(&self, _login: &str, _points: u64, _reason: &str) {}
    async fn record_annotation(&self, _login: &str, _kind: &str, _text: &str) {}
}
