// Common library for the content scheduling optimizer, shared by the scheduler host

pub mod allocator;
pub mod config;
pub mod errors;
pub mod models;
pub mod optimizer;
pub mod profiler;
pub mod providers;
pub mod quality;
pub mod schedule;
pub mod telemetry;
pub mod validator;
