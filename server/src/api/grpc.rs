//! OTLP gRPC trace service
//!
//! Serves `opentelemetry.proto.collector.trace.v1.TraceService/Export`. The
//! codec passes the request message through as bytes so the ingest pipeline
//! decodes it with the collector's own wire decoder; the empty response
//! message encodes to nothing.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::task::{Context, Poll};

use prost::bytes::{Buf, Bytes};
use tokio::sync::watch;
use tonic::body::BoxBody;
use tonic::codec::{Codec, CompressionEncoding, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::{Body, BoxFuture, Service, StdError, empty_body, http};
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::transport::Server as TonicServer;
use tonic::{Code, Status};

use super::routes::request_token;
use crate::core::constants::OTLP_BODY_LIMIT;
use crate::data::duckdb::WriteError;
use crate::domain::{ExportEncoding, IngestError, TracePipeline};
use crate::utils::traceparent::TraceContext;

const SERVICE_NAME: &str = "opentelemetry.proto.collector.trace.v1.TraceService";
const EXPORT_PATH: &str = "/opentelemetry.proto.collector.trace.v1.TraceService/Export";

pub struct OtlpGrpcServer {
    addr: SocketAddr,
    pipeline: TracePipeline,
}

impl OtlpGrpcServer {
    pub fn new(host: &str, port: u16, pipeline: TracePipeline) -> anyhow::Result<Self> {
        let addr = SocketAddr::new(host.parse()?, port);
        Ok(Self { addr, pipeline })
    }

    pub async fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        let addr = self.addr;
        tracing::debug!(%addr, "Starting OTLP gRPC server");

        TonicServer::builder()
            .add_service(TraceExportService::new(self.pipeline))
            .serve_with_shutdown(addr, async move {
                let _ = shutdown_rx.wait_for(|&v| v).await;
                tracing::debug!("OTLP gRPC server shutting down");
            })
            .await?;

        Ok(())
    }
}

/// Map an ingest failure to the status the exporter sees
fn ingest_status(e: IngestError) -> Status {
    match e {
        IngestError::Decode(e) => Status::invalid_argument(e.to_string()),
        IngestError::Write(WriteError::Cancelled) => Status::cancelled("Export cancelled"),
        IngestError::Write(WriteError::ShutDown) => Status::unavailable("Service is shutting down"),
        IngestError::Write(WriteError::Store(e)) => {
            tracing::error!(error = %e, "Span write failed");
            Status::internal("Failed to store spans")
        }
    }
}

/// Pass-through codec: requests stay encoded, responses are empty
#[derive(Debug, Clone, Copy, Default)]
struct RawCodec;

impl Codec for RawCodec {
    type Encode = ();
    type Decode = Bytes;
    type Encoder = RawCodec;
    type Decoder = RawCodec;

    fn encoder(&mut self) -> Self::Encoder {
        RawCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawCodec
    }
}

impl Encoder for RawCodec {
    type Item = ();
    type Error = Status;

    fn encode(&mut self, _item: (), _dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        Ok(())
    }
}

impl Decoder for RawCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Bytes>, Status> {
        Ok(Some(src.copy_to_bytes(src.remaining())))
    }
}

/// Unary `Export` handler
struct ExportMethod {
    pipeline: TracePipeline,
}

impl UnaryService<Bytes> for ExportMethod {
    type Response = ();
    type Future = BoxFuture<tonic::Response<()>, Status>;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        let pipeline = self.pipeline.clone();
        Box::pin(async move {
            if let Some(ctx) = request
                .metadata()
                .get("traceparent")
                .and_then(|v| v.to_str().ok())
                .and_then(TraceContext::parse)
            {
                tracing::debug!(
                    trace_id = %ctx.trace_id_hex(),
                    parent_id = %ctx.parent_id_hex(),
                    "Export request carries trace context"
                );
            }

            // Dropped with this future when the client goes away
            let (cancel, _guard) = request_token();
            pipeline
                .ingest(request.get_ref(), ExportEncoding::Protobuf, &cancel)
                .await
                .map_err(ingest_status)?;
            Ok(tonic::Response::new(()))
        })
    }
}

/// `TraceService` routed by path, one method
#[derive(Clone)]
pub struct TraceExportService {
    pipeline: TracePipeline,
}

impl TraceExportService {
    pub fn new(pipeline: TracePipeline) -> Self {
        Self { pipeline }
    }
}

impl NamedService for TraceExportService {
    const NAME: &'static str = SERVICE_NAME;
}

impl<B> Service<http::Request<B>> for TraceExportService
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        if req.uri().path() != EXPORT_PATH {
            return Box::pin(async move { Ok(unimplemented_response()) });
        }

        let method = ExportMethod {
            pipeline: self.pipeline.clone(),
        };
        Box::pin(async move {
            let mut grpc = Grpc::new(RawCodec)
                .accept_compressed(CompressionEncoding::Gzip)
                .apply_max_message_size_config(Some(OTLP_BODY_LIMIT), None);
            Ok(grpc.unary(method, req).await)
        })
    }
}

fn unimplemented_response() -> http::Response<BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert(Status::GRPC_STATUS, (Code::Unimplemented as i32).into());
    headers.insert(
        http::header::CONTENT_TYPE,
        tonic::metadata::GRPC_CONTENT_TYPE,
    );
    response
}
