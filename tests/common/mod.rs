//! Integration test common infrastructure.
//!
//! Provides utilities for spawning bouncer processes, creating test clients
//! and standing up fake upstream IRC servers.

pub mod client;
pub mod server;
pub mod upstream;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
#[allow(unused_imports)]
pub use upstream::FakeUpstream;
