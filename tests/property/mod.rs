// tests/property/mod.rs

//! Property-based tests for clusterlink
