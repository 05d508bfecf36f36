//! Session kernel: samples, the bounded window, classification and the
//! single-writer controller.
//!
//! Everything here except `controller` is synchronous and free of I/O.
//! Network work lives in `services` and reports back through `event::Event`.

pub mod buffer;
pub mod classifier;
pub mod connection;
pub mod controller;
pub mod event;
pub mod sample;
pub mod state;
