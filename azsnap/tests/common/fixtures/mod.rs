//! This module provides reusable test utilities:
//! - A scripted in-memory Azure backend
//! - Inventory file builders and resource ids
//! - Command contexts wired to temp directories

// Allow unused code in test fixtures - not every test binary uses every helper
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_azure;
pub mod test_data;

// Re-export commonly used items
pub use fake_azure::FakeAzure;
pub use test_data::*;
