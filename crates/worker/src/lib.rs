//! Image-generation worker: settings, status HTTP surface and service wiring.

pub mod app;
pub mod services;
pub mod settings;
