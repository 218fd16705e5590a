//! gRPC + REST API for companies, served from one listener.

pub mod app;
pub mod gateway;
pub mod middleware;
pub mod router;
pub mod rpc;
pub mod server;

/// Generated protobuf types and service stubs for `companyhub.v1`.
pub mod pb {
    tonic::include_proto!("companyhub.v1");
}
