//! End-to-end tests at the HTTP request/response level.
//!
//! Each test file covers one scenario against a full orchestrator with a
//! manual clock and a temporary data directory.

#![cfg(test)]

mod helpers;

mod test_clean;
mod test_determinism;
mod test_health;
mod test_logs;
mod test_pause_resume;
mod test_reinit;
