//! Listener topology planning
//!
//! [`plan`] decides how many physical listeners the configured addresses need and which
//! traffic classes each one carries. Listener addresses are known at plan time, but a
//! port of 0 is only resolved once the socket is bound, so each [`ListenerSpec`] owns an
//! [`EndpointSlot`] that is filled exactly once by the server after binding.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use aperture_auth::{ConnectionClassification, TrafficClass};
use aperture_config::{BindAddress, Options, OtlpAuth};

use crate::ApiError;

/// Whether the two surfaces share a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyMode {
    /// One listener carries both traffic classes
    Shared,
    /// Every surface address gets its own listener
    Independent,
}

/// HTTP protocols negotiated on a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocols {
    /// Browsers and OTLP/HTTP exporters
    Http1AndHttp2,
    /// OTLP/gRPC exporters
    Http2,
}

impl Protocols {
    /// ALPN identifiers offered during the TLS handshake, preferred first
    pub fn alpn(self) -> Vec<Vec<u8>> {
        match self {
            Protocols::Http1AndHttp2 => vec![b"h2".to_vec(), b"http/1.1".to_vec()],
            Protocols::Http2 => vec![b"h2".to_vec()],
        }
    }
}

/// Which configured address a listener serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// Interactive address at this index of the configured list
    Frontend(usize),
    /// Binary telemetry transport
    OtlpGrpc,
    /// Text telemetry transport
    OtlpHttp,
}

/// Address as actually bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Configured address
    pub address: BindAddress,
    /// Socket address reported by the operating system
    pub local_addr: SocketAddr,
    /// Whether the listener terminates TLS
    pub tls: bool,
}

impl ResolvedEndpoint {
    /// `scheme://host:port` with the bound port
    ///
    /// With `replace_wildcard`, a wildcard host is shown as `localhost`.
    pub fn url(&self, replace_wildcard: bool) -> String {
        let host = if replace_wildcard {
            self.address.display_host()
        } else {
            self.address.host()
        };
        format!(
            "{}://{}:{}",
            self.address.scheme().as_str(),
            host,
            self.local_addr.port()
        )
    }
}

/// Write-once holder for a [`ResolvedEndpoint`]
#[derive(Debug, Default)]
pub struct EndpointSlot {
    resolved: OnceLock<ResolvedEndpoint>,
}

impl EndpointSlot {
    /// Record the bound endpoint
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::EndpointAlreadyResolved`] on a second call.
    pub fn resolve(&self, endpoint: ResolvedEndpoint) -> Result<(), ApiError> {
        let address = endpoint.address.to_string();
        self.resolved
            .set(endpoint)
            .map_err(|_| ApiError::EndpointAlreadyResolved(address))
    }

    /// The bound endpoint, or `None` before binding completes
    pub fn get(&self) -> Option<&ResolvedEndpoint> {
        self.resolved.get()
    }

    /// The bound endpoint, treating absence as an error
    pub fn require(&self, address: &BindAddress) -> Result<&ResolvedEndpoint, ApiError> {
        self.resolved
            .get()
            .ok_or_else(|| ApiError::EndpointNotResolved(address.to_string()))
    }
}

/// One physical listener
#[derive(Debug, Clone)]
pub struct ListenerSpec {
    /// Where to bind
    pub address: BindAddress,
    /// Protocols offered
    pub protocols: Protocols,
    /// Traffic classes stamped on every accepted connection
    pub classes: ConnectionClassification,
    /// Whether the TLS handshake demands a client certificate
    pub require_client_certificate: bool,
    /// Configured addresses this listener serves
    pub roles: Vec<EndpointRole>,
    /// Filled once the listener is bound
    pub slot: Arc<EndpointSlot>,
}

impl ListenerSpec {
    fn new(
        address: BindAddress,
        protocols: Protocols,
        classes: ConnectionClassification,
        require_client_certificate: bool,
        roles: Vec<EndpointRole>,
    ) -> Self {
        Self {
            address,
            protocols,
            classes,
            require_client_certificate,
            roles,
            slot: Arc::new(EndpointSlot::default()),
        }
    }

    /// Short label for logs
    pub fn label(&self) -> String {
        let roles: Vec<String> = self
            .roles
            .iter()
            .map(|role| match role {
                EndpointRole::Frontend(index) => format!("frontend[{index}]"),
                EndpointRole::OtlpGrpc => "otlp-grpc".to_string(),
                EndpointRole::OtlpHttp => "otlp-http".to_string(),
            })
            .collect();
        roles.join("+")
    }
}

/// Planned listeners plus the HTTPS redirect decision
#[derive(Debug, Clone)]
pub struct ListenerTopology {
    mode: TopologyMode,
    listeners: Vec<ListenerSpec>,
    https_redirect: Option<usize>,
}

impl ListenerTopology {
    /// Shared or independent
    pub fn mode(&self) -> TopologyMode {
        self.mode
    }

    /// Listeners in bind order, interactive first
    pub fn listeners(&self) -> &[ListenerSpec] {
        &self.listeners
    }

    /// Port browsers are redirected to when they arrive without TLS
    ///
    /// `None` unless every configured address uses TLS. A dynamic port is only known
    /// once the designated listener is bound.
    pub fn https_redirect_port(&self) -> Option<u16> {
        let listener = &self.listeners[self.https_redirect?];
        match listener.address.port() {
            0 => listener.slot.get().map(|resolved| resolved.local_addr.port()),
            port => Some(port),
        }
    }

    fn listener_for(&self, role: EndpointRole) -> Option<&ListenerSpec> {
        self.listeners
            .iter()
            .find(|listener| listener.roles.contains(&role))
    }

    /// Bound endpoint for the interactive address at `index`
    ///
    /// # Errors
    ///
    /// [`ApiError::EndpointNotResolved`] when the listener has not been bound.
    pub fn frontend_endpoint(&self, index: usize) -> Result<Option<&ResolvedEndpoint>, ApiError> {
        self.resolved(EndpointRole::Frontend(index))
    }

    /// Bound endpoint for the binary telemetry transport, if configured
    ///
    /// # Errors
    ///
    /// [`ApiError::EndpointNotResolved`] when the listener has not been bound.
    pub fn otlp_grpc_endpoint(&self) -> Result<Option<&ResolvedEndpoint>, ApiError> {
        self.resolved(EndpointRole::OtlpGrpc)
    }

    /// Bound endpoint for the text telemetry transport, if configured
    ///
    /// # Errors
    ///
    /// [`ApiError::EndpointNotResolved`] when the listener has not been bound.
    pub fn otlp_http_endpoint(&self) -> Result<Option<&ResolvedEndpoint>, ApiError> {
        self.resolved(EndpointRole::OtlpHttp)
    }

    fn resolved(&self, role: EndpointRole) -> Result<Option<&ResolvedEndpoint>, ApiError> {
        match self.listener_for(role) {
            Some(listener) => listener.slot.require(&listener.address).map(Some),
            None => Ok(None),
        }
    }
}

/// Decide the listener topology for validated options
///
/// A single listener serves both surfaces when there is exactly one interactive address,
/// each configured telemetry address equals it, and its port is not dynamic. Otherwise
/// every address gets its own listener tagged with a single traffic class; the two
/// telemetry transports share one listener when their addresses are identical.
pub fn plan(options: &Options) -> ListenerTopology {
    let frontend = &options.frontend.endpoints;
    let grpc = options.otlp.grpc_endpoint.as_ref();
    let http = options.otlp.http_endpoint.as_ref();
    let client_certificate = matches!(options.otlp.auth, OtlpAuth::ClientCertificate { .. });

    let shared = match frontend.as_slice() {
        [only] => {
            only.port() != 0
                && grpc.map_or(true, |address| address == only)
                && http.map_or(true, |address| address == only)
        }
        _ => false,
    };

    let (mode, listeners) = if shared {
        let address = frontend[0].clone();
        let mut roles = vec![EndpointRole::Frontend(0)];
        if grpc.is_some() {
            roles.push(EndpointRole::OtlpGrpc);
        }
        if http.is_some() {
            roles.push(EndpointRole::OtlpHttp);
        }
        let listener = ListenerSpec::new(
            address,
            Protocols::Http1AndHttp2,
            ConnectionClassification::both(),
            client_certificate,
            roles,
        );
        (TopologyMode::Shared, vec![listener])
    } else {
        (
            TopologyMode::Independent,
            independent_listeners(frontend, grpc, http, client_certificate),
        )
    };

    let all_tls = options.all_endpoints().all(BindAddress::is_tls);
    let https_redirect = if all_tls {
        listeners.iter().position(|listener| {
            listener.classes.contains(TrafficClass::Interactive) && listener.address.is_tls()
        })
    } else {
        None
    };

    let topology = ListenerTopology {
        mode,
        listeners,
        https_redirect,
    };

    tracing::debug!(
        mode = ?topology.mode,
        listeners = topology.listeners.len(),
        https_redirect = ?topology.https_redirect,
        "Planned listener topology"
    );

    topology
}

fn independent_listeners(
    frontend: &[BindAddress],
    grpc: Option<&BindAddress>,
    http: Option<&BindAddress>,
    client_certificate: bool,
) -> Vec<ListenerSpec> {
    let interactive = ConnectionClassification::only(TrafficClass::Interactive);
    let telemetry = ConnectionClassification::only(TrafficClass::Telemetry);

    let mut listeners: Vec<ListenerSpec> = frontend
        .iter()
        .enumerate()
        .map(|(index, address)| {
            ListenerSpec::new(
                address.clone(),
                Protocols::Http1AndHttp2,
                interactive,
                false,
                vec![EndpointRole::Frontend(index)],
            )
        })
        .collect();

    match (grpc, http) {
        (Some(grpc), Some(http)) if grpc == http && grpc.port() != 0 => {
            listeners.push(ListenerSpec::new(
                grpc.clone(),
                Protocols::Http1AndHttp2,
                telemetry,
                client_certificate,
                vec![EndpointRole::OtlpGrpc, EndpointRole::OtlpHttp],
            ));
        }
        _ => {
            if let Some(grpc) = grpc {
                listeners.push(ListenerSpec::new(
                    grpc.clone(),
                    Protocols::Http2,
                    telemetry,
                    client_certificate,
                    vec![EndpointRole::OtlpGrpc],
                ));
            }
            if let Some(http) = http {
                listeners.push(ListenerSpec::new(
                    http.clone(),
                    Protocols::Http1AndHttp2,
                    telemetry,
                    client_certificate,
                    vec![EndpointRole::OtlpHttp],
                ));
            }
        }
    }

    listeners
}
