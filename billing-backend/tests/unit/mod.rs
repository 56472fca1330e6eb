// tests/unit/mod.rs

pub mod repository_tests;
