//! # Architecture Abstraction Layer
//!
//! Exception handlers and core-peripheral setup. Only the Cortex-M4 port
//! exists; it is compiled for bare-metal ARM targets only.

pub mod cortex_m4;
