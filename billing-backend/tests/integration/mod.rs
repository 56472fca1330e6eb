// tests/integration/mod.rs

pub mod api_tests;
