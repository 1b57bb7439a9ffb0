//! Dispatcher loops for [`Runtime`](super::Runtime).
//!
//! - `orchestration`: fetches instance batches and runs replay turns
//! - `worker`: executes activities

mod orchestration;
mod worker;
