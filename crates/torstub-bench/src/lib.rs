//! Benchmarks for the torstub decision paths. See `benches/`.
