//! API server and routes
//!
//! - `grpc` - OTLP gRPC `TraceService`
//! - `routes` - OTLP/HTTP ingestion, JSON query API, health
//! - `server` - HTTP router and listener

pub mod extractors;
pub mod grpc;
mod middleware;
pub mod openapi;
pub mod routes;
mod server;
pub mod types;

pub use grpc::OtlpGrpcServer;
pub use server::ApiServer;
