//! Metrics http endpoint.
//!
//! The server runs on its own thread and calls [`Collect::collect`] exactly
//! once for every request to the metrics endpoint. A failed collection is
//! answered with status 500 and without any collected gauge.

use std::{
    net::{
        SocketAddr,
        TcpListener,
    },
    thread::{
        self,
        JoinHandle,
    },
};
#[cfg(feature = "internal_metrics")]
use std::time::Instant;

use ascii::AsciiString;
use either::Either;
use log::{
    debug,
    error,
    info,
};
#[cfg(feature = "internal_metrics")]
use prometheus::{
    Histogram,
    HistogramOpts,
    IntCounter,
};
use prometheus::{
    core::Collector,
    proto::MetricFamily,
    Encoder,
    Gauge,
    Opts,
    Registry,
    TextEncoder,
};
use tiny_http::{
    Header,
    Method,
    Request,
    Response,
    Server as HTTPServer,
    StatusCode,
};

use crate::{
    collector::GaugeObservation,
    upstream::CollectError,
    Error,
};

const DEFAULT_ENDPOINT: &str = "/metrics";
const DEFAULT_STATUS_NAME: &str = "up";

/// Produces the gauges of one scrape.
///
/// Called from the server thread once per request to the metrics endpoint.
pub trait Collect: Send + Sync + 'static {
    /// Collect all gauges or fail without any.
    fn collect(&self) -> Result<Vec<GaugeObservation>, CollectError>;
}

/// Builder to create a new http exporter.
pub struct Builder {
    binding: Either<SocketAddr, TcpListener>,
    endpoint: String,
    registry: Registry,
    status_name: String,
    collector: Box<dyn Collect>,
}

/// Handle of a running exporter.
#[derive(Debug)]
pub struct Exporter {
    handle: JoinHandle<()>,
}

struct Server {
    endpoint: String,
    registry: Registry,
    status: Gauge,
    collector: Box<dyn Collect>,
    encoder: TextEncoder,
    content_type: Header,
    location: Header,
    #[cfg(feature = "internal_metrics")]
    internal: InternalMetrics,
}

#[cfg(feature = "internal_metrics")]
struct InternalMetrics {
    requests: IntCounter,
    collect_failures: IntCounter,
    collect_duration: Histogram,
}

impl Builder {
    /// Create a new builder binding to `binding` and serving the gauges of
    /// `collector`.
    pub fn new(binding: SocketAddr, collector: impl Collect) -> Self {
        Self::with_binding(Either::Left(binding), collector)
    }

    /// Create a new builder serving on an already bound listener.
    pub fn new_listener(listener: TcpListener, collector: impl Collect) -> Self {
        Self::with_binding(Either::Right(listener), collector)
    }

    fn with_binding(binding: Either<SocketAddr, TcpListener>, collector: impl Collect) -> Self {
        Self {
            binding,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            registry: Registry::new(),
            status_name: DEFAULT_STATUS_NAME.to_string(),
            collector: Box::new(collector),
        }
    }

    /// Sets the endpoint that the metrics will be served on. A missing
    /// leading slash is added.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, Error> {
        let endpoint = AsciiString::from_ascii(endpoint)
            .map_err(|_| Error::EndpointNotAscii(endpoint.to_string()))?;

        self.endpoint = format!("/{}", endpoint.as_str().trim_start_matches('/'));

        Ok(self)
    }

    /// Registry whose metrics are exposed after the collected gauges. The
    /// status gauge and internal metrics are registered in it.
    pub fn with_registry(mut self, registry: &Registry) -> Self {
        self.registry = registry.clone();
        self
    }

    /// Name of the gauge that is 1 when the last collection succeeded and 0
    /// otherwise.
    pub fn with_status_name(mut self, status_name: impl Into<String>) -> Self {
        self.status_name = status_name.into();
        self
    }

    /// Create the http server and start serving on a new thread.
    pub fn start(self) -> Result<Exporter, Error> {
        let (http, addr) = match self.binding {
            Either::Left(addr) => (HTTPServer::http(addr).map_err(Error::ServerStart)?, addr),
            Either::Right(listener) => {
                let addr = listener
                    .local_addr()
                    .map_err(|err| Error::ServerStart(Box::new(err)))?;

                (
                    HTTPServer::from_listener(listener, None).map_err(Error::ServerStart)?,
                    addr,
                )
            }
        };

        let status = Gauge::new(
            self.status_name,
            "shows if the last collection of griddy prices succeeded",
        )
        .map_err(Error::CreateStatusMetric)?;

        self.registry
            .register(Box::new(status.clone()))
            .map_err(Error::CreateStatusMetric)?;

        let encoder = TextEncoder::new();

        let content_type = Header::from_bytes(&b"Content-Type"[..], encoder.format_type().as_bytes())
            .map_err(|()| Error::InvalidHeader("Content-Type"))?;

        let location = Header::from_bytes(&b"Location"[..], self.endpoint.as_bytes())
            .map_err(|()| Error::InvalidHeader("Location"))?;

        let server = Server {
            #[cfg(feature = "internal_metrics")]
            internal: InternalMetrics::register(&self.registry)
                .map_err(Error::CreateInternalMetrics)?,
            endpoint: self.endpoint,
            registry: self.registry,
            status,
            collector: self.collector,
            encoder,
            content_type,
            location,
        };

        info!("Listening on http://{}{}", addr, server.endpoint);

        let handle = thread::Builder::new()
            .name("griddy_exporter".to_string())
            .spawn(move || server.run(http))
            .map_err(Error::SpawnThread)?;

        Ok(Exporter { handle })
    }
}

impl Exporter {
    /// Return a builder that binds to `binding`.
    pub fn builder(binding: SocketAddr, collector: impl Collect) -> Builder {
        Builder::new(binding, collector)
    }

    /// Return a builder that serves on `listener`.
    pub fn builder_listener(listener: TcpListener, collector: impl Collect) -> Builder {
        Builder::new_listener(listener, collector)
    }

    /// Whether the server thread is still serving.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Server {
    fn run(self, http: HTTPServer) {
        for request in http.incoming_requests() {
            if let Err(err) = self.handle_request(request) {
                error!("problem while serving metrics: {err}");
            }
        }
    }

    fn handle_request(&self, request: Request) -> Result<(), Error> {
        #[cfg(feature = "internal_metrics")]
        self.internal.requests.inc();

        debug!("{:?} {}", request.method(), request.url());

        let path = request.url().split('?').next().unwrap_or_default();
        let is_metrics = request.method() == &Method::Get && path == self.endpoint;

        if is_metrics {
            self.handler_metrics(request)
        } else {
            self.handler_redirect(request)
        }
    }

    fn handler_metrics(&self, request: Request) -> Result<(), Error> {
        #[cfg(feature = "internal_metrics")]
        let started = Instant::now();

        let collected = self.collector.collect();

        #[cfg(feature = "internal_metrics")]
        self.internal
            .collect_duration
            .observe(started.elapsed().as_secs_f64());

        match collected {
            Ok(observations) => {
                let mut families = gauge_families(&observations).map_err(Error::EncodeMetrics)?;

                self.status.set(1.0);
                families.extend(self.registry.gather());

                let body = self.encode(&families)?;
                let response = Response::from_data(body).with_header(self.content_type.clone());

                request.respond(response).map_err(Error::SendResponse)
            }

            Err(err) => {
                error!("collection failed: {err}");

                self.status.set(0.0);
                #[cfg(feature = "internal_metrics")]
                self.internal.collect_failures.inc();

                let mut body = format!("# collection failed: {err}\n").into_bytes();
                body.extend(self.encode(&self.registry.gather())?);

                let response = Response::from_data(body)
                    .with_status_code(StatusCode(500))
                    .with_header(self.content_type.clone());

                request.respond(response).map_err(Error::SendResponse)
            }
        }
    }

    fn handler_redirect(&self, request: Request) -> Result<(), Error> {
        let response = Response::from_string(format!("try {} for metrics\n", self.endpoint))
            .with_status_code(StatusCode(301))
            .with_header(self.location.clone());

        request.respond(response).map_err(Error::SendResponse)
    }

    fn encode(&self, families: &[MetricFamily]) -> Result<Vec<u8>, Error> {
        let mut buffer = Vec::new();
        self.encoder
            .encode(families, &mut buffer)
            .map_err(Error::EncodeMetrics)?;

        Ok(buffer)
    }
}

#[cfg(feature = "internal_metrics")]
impl InternalMetrics {
    fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounter::new(
            "griddy_exporter_requests_total",
            "number of http requests received",
        )?;

        let collect_failures = IntCounter::new(
            "griddy_exporter_collect_failures_total",
            "number of collections that failed",
        )?;

        let collect_duration = Histogram::with_opts(HistogramOpts::new(
            "griddy_exporter_collect_duration_seconds",
            "duration of collections including the upstream request",
        ))?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(collect_failures.clone()))?;
        registry.register(Box::new(collect_duration.clone()))?;

        Ok(Self {
            requests,
            collect_failures,
            collect_duration,
        })
    }
}

/// One gauge family per observation, in observation order.
fn gauge_families(
    observations: &[GaugeObservation],
) -> Result<Vec<MetricFamily>, prometheus::Error> {
    let mut families = Vec::with_capacity(observations.len());

    for observation in observations {
        let gauge = Gauge::with_opts(Opts::new(observation.name(), observation.help()))?;
        gauge.set(observation.as_f64());

        families.extend(gauge.collect());
    }

    Ok(families)
}
