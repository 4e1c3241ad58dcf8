//! HTTP Exposition Server
//!
//! Serves the telemetry path, a health check endpoint and a small landing page.
//! Every request on the telemetry path runs one collection cycle into a
//! fresh [`ScrapeBuffer`]; nothing from a failed cycle is published.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::metrics::{Exposition, Rendered, ScrapeBuffer, VsphereCollector};

pub const HEALTH_PATH: &str = "/healthz";

// =============================================================================
// Exporter
// =============================================================================

/// Request-independent state shared by every connection.
#[derive(Debug)]
pub struct Exporter {
    collector: Arc<VsphereCollector>,
    exposition: Arc<Exposition>,
    telemetry_path: String,
}

impl Exporter {
    pub fn new(
        collector: Arc<VsphereCollector>,
        exposition: Arc<Exposition>,
        telemetry_path: impl Into<String>,
    ) -> Self {
        Self {
            collector,
            exposition,
            telemetry_path: telemetry_path.into(),
        }
    }

    pub fn telemetry_path(&self) -> &str {
        &self.telemetry_path
    }

    /// Run one collection cycle and render it with the self-metrics.
    pub async fn scrape(&self) -> Result<Rendered> {
        let started = Instant::now();
        let mut buffer = ScrapeBuffer::new();

        let outcome = async {
            self.collector.describe(&mut buffer).await?;
            self.collector.collect(&mut buffer).await
        }
        .await;

        match outcome {
            Ok(report) => {
                self.exposition.record_success(&report, started.elapsed());
                debug!(
                    samples = report.samples,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scrape complete"
                );
                self.exposition.render(&buffer)
            }
            Err(e) => {
                self.exposition.record_failure(started.elapsed());
                Err(e)
            }
        }
    }

    /// Route one request.
    pub async fn handle(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        if method != Method::GET && method != Method::HEAD {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        if path == self.telemetry_path {
            return match self.scrape().await {
                Ok(rendered) => {
                    let mut response = Response::new(Full::new(Bytes::from(rendered.body)));
                    if let Ok(value) = HeaderValue::from_str(&rendered.content_type) {
                        response.headers_mut().insert(CONTENT_TYPE, value);
                    }
                    response
                }
                Err(e) => {
                    if e.is_remote() {
                        warn!("Scrape failed, vCenter unavailable: {}", e);
                    } else {
                        error!("Scrape failed: {}", e);
                    }
                    text_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("An error has occurred while collecting metrics:\n\n{}\n", e),
                    )
                }
            };
        }

        match path {
            HEALTH_PATH => text_response(StatusCode::OK, "ok"),
            "/" => {
                let mut response = text_response(StatusCode::OK, self.landing_page());
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
                response
            }
            _ => text_response(StatusCode::NOT_FOUND, "not found"),
        }
    }

    fn landing_page(&self) -> String {
        format!(
            "<html>\n<head><title>vSphere Exporter</title></head>\n<body>\n\
             <h1>vSphere Exporter</h1>\n<p><a href=\"{}\">Metrics</a></p>\n\
             </body>\n</html>\n",
            self.telemetry_path
        )
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

// =============================================================================
// Listener
// =============================================================================

/// Bind `addr` and serve until the task is dropped.
pub async fn run(addr: SocketAddr, exporter: Arc<Exporter>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(
        "Listening on {} (metrics at {})",
        addr,
        exporter.telemetry_path()
    );
    serve(listener, exporter).await
}

/// Accept connections from an already bound listener.
pub async fn serve(listener: TcpListener, exporter: Arc<Exporter>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let exporter = exporter.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let exporter = exporter.clone();
                async move {
                    let response = exporter.handle(req.method(), req.uri().path()).await;
                    Ok::<_, Infallible>(response)
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!(%peer, "Error serving connection: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemorySession;
    use crate::domain::{CounterInfo, EntityMetric, HostRef, ManagedObjectRef, MetricSeries};
    use crate::metrics::CollectorConfig;
    use http_body_util::BodyExt;

    fn exporter(session: Arc<InMemorySession>) -> Exporter {
        let collector = Arc::new(VsphereCollector::new(session, CollectorConfig::default()));
        let exposition = Arc::new(Exposition::new().unwrap());
        Exporter::new(collector, exposition, "/metrics")
    }

    fn session() -> Arc<InMemorySession> {
        Arc::new(
            InMemorySession::new()
                .with_counters(vec![CounterInfo::new(1, "cpu", "usage.average", "CPU usage")])
                .with_datacenter("dc1", "datacenter-2")
                .with_host(
                    HostRef::new("esx01", "host-10"),
                    vec![EntityMetric {
                        entity: ManagedObjectRef::host("host-10"),
                        series: vec![MetricSeries::new(1, "", vec![10, 20])],
                    }],
                ),
        )
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // =========================================================================
    // Routing
    // =========================================================================

    #[tokio::test]
    async fn test_metrics_route() {
        let exporter = exporter(session());

        let response = exporter.handle(&Method::GET, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains(
            "vsphere_cpu_usage_average{entity=\"HostSystem\",host=\"esx01\",instance=\"\"} 20"
        ));
        assert!(text.contains("vsphere_exporter_scrapes_total 1"));
    }

    #[tokio::test]
    async fn test_health_and_landing() {
        let exporter = exporter(session());

        let health = exporter.handle(&Method::GET, "/healthz").await;
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(body_text(health).await, "ok");

        let landing = exporter.handle(&Method::GET, "/").await;
        assert_eq!(landing.status(), StatusCode::OK);
        assert!(body_text(landing).await.contains("href=\"/metrics\""));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let exporter = exporter(session());
        let response = exporter.handle(&Method::GET, "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejects_post() {
        let exporter = exporter(session());
        let response = exporter.handle(&Method::POST, "/metrics").await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    // =========================================================================
    // Scrape Failures
    // =========================================================================

    #[tokio::test]
    async fn test_failed_scrape_returns_500_and_counts_error() {
        let session = session();
        let exporter = exporter(session.clone());

        session.set_fail_query_for("esx01", true);
        let response = exporter.handle(&Method::GET, "/metrics").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("QueryPerf failed for esx01"));

        session.set_fail_query_for("esx01", false);
        let text = body_text(exporter.handle(&Method::GET, "/metrics").await).await;
        assert!(text.contains("vsphere_exporter_scrape_errors_total 1"));
        assert!(text.contains("vsphere_exporter_scrapes_total 2"));
    }

    #[tokio::test]
    async fn test_vcenter_failure_is_reported_as_remote() {
        let session = session();
        let exporter = exporter(session.clone());

        session.set_fail_query_for("esx01", true);
        let err = exporter.scrape().await.unwrap_err();

        assert!(err.is_remote());
    }
}
