//! Runtime counters, exported through the metriken global registry.

use metriken::{metric, Counter};

#[metric(
    name = "courier/requests/dispatched",
    description = "requests handed to the transport"
)]
pub static REQUESTS_DISPATCHED: Counter = Counter::new();

#[metric(
    name = "courier/responses/received",
    description = "raw responses delivered by the transport"
)]
pub static RESPONSES_RECEIVED: Counter = Counter::new();

#[metric(
    name = "courier/requests/failed",
    description = "requests that settled with an error"
)]
pub static REQUESTS_FAILED: Counter = Counter::new();

#[metric(
    name = "courier/polling/cycles",
    description = "polling cycles scheduled beyond the first dispatch"
)]
pub static POLL_CYCLES: Counter = Counter::new();

#[metric(
    name = "courier/auth/attempts",
    description = "side-channel requests dispatched by auth strategies"
)]
pub static AUTH_ATTEMPTS: Counter = Counter::new();
