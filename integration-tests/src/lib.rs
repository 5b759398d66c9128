//! End-to-end tests for the Groundwork plugin host live in `tests/`.
