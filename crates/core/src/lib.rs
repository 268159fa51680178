//! `fitcheck-core`: domain building blocks for the image-generation queue.
//!
//! This crate contains **pure domain** types (no infrastructure concerns): job
//! payloads as they travel through the queue, and the fixed-window rate-limit
//! arithmetic shared by every processor instance.

pub mod error;
pub mod id;
pub mod payload;
pub mod rate_limit;

pub use error::{DomainError, DomainResult};
pub use id::ItemId;
pub use payload::ImageJobPayload;
pub use rate_limit::{Capacity, RateLimitPolicy, RateLimitWindow, ReservationOutcome};
