//! strideOS reference backend: section content storage and a live
//! collaboration relay.

pub mod server;
