//! Versioned gateway snapshots
//!
//! A [`Gateway`] bundles one validated [`Options`] value with the authenticators and
//! policies built from it. [`GatewayHandle`] publishes snapshots with an atomic pointer
//! swap. A request loads the current snapshot once and uses it until it completes, so a
//! reload never changes the rules under an in-flight request.

use std::sync::{Arc, Mutex, PoisonError};

use aperture_config::Options;
use arc_swap::ArcSwap;

use crate::composite::{AuthFailure, InteractiveAuthenticator, RequestContext, TelemetryAuthenticator};
use crate::connection::TrafficClass;
use crate::identity::Identity;
use crate::policy::SurfacePolicy;
use crate::session::SessionCodec;

/// Immutable snapshot of options and everything derived from them
#[derive(Debug)]
pub struct Gateway {
    version: u64,
    options: Arc<Options>,
    interactive: InteractiveAuthenticator,
    telemetry: TelemetryAuthenticator,
    interactive_policy: SurfacePolicy,
    telemetry_policy: SurfacePolicy,
}

impl Gateway {
    /// Build a snapshot
    pub fn new(version: u64, options: Options, sessions: Arc<SessionCodec>) -> Self {
        let interactive = InteractiveAuthenticator::from_options(&options.frontend.auth, sessions);
        let telemetry = TelemetryAuthenticator::from_options(&options.otlp.auth);
        let interactive_policy = SurfacePolicy::interactive(&options.frontend.auth);

        Self {
            version,
            options: Arc::new(options),
            interactive,
            telemetry,
            interactive_policy,
            telemetry_policy: SurfacePolicy::telemetry(),
        }
    }

    /// Publication number, starting at 1
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Options this snapshot was built from
    pub fn options(&self) -> &Arc<Options> {
        &self.options
    }

    /// Interactive chain
    pub fn interactive(&self) -> &InteractiveAuthenticator {
        &self.interactive
    }

    /// Telemetry chain
    pub fn telemetry(&self) -> &TelemetryAuthenticator {
        &self.telemetry
    }

    /// Policy for a surface
    pub fn policy(&self, surface: TrafficClass) -> &SurfacePolicy {
        match surface {
            TrafficClass::Interactive => &self.interactive_policy,
            TrafficClass::Telemetry => &self.telemetry_policy,
        }
    }

    /// Authenticate then authorize a request for `surface`
    ///
    /// # Errors
    ///
    /// An authentication failure from the chain, or an authorization failure
    /// ([`crate::AuthError::Forbidden`]) which never carries a challenge.
    pub async fn authenticate(
        &self,
        surface: TrafficClass,
        request: &RequestContext<'_>,
    ) -> Result<Identity, AuthFailure> {
        let identity = match surface {
            TrafficClass::Interactive => self.interactive.authenticate(request).await?,
            TrafficClass::Telemetry => self.telemetry.authenticate(request).await?,
        };

        self.policy(surface)
            .authorize(&identity)
            .map_err(AuthFailure::rejected)?;

        Ok(identity)
    }

    /// Name of the active mode on a surface
    pub fn mode_name(&self, surface: TrafficClass) -> &'static str {
        match surface {
            TrafficClass::Interactive => self.interactive.mode().name(),
            TrafficClass::Telemetry => self.telemetry.mode().as_str(),
        }
    }
}

/// Publishes gateway snapshots
///
/// The session codec lives here rather than in a snapshot so sessions survive reloads.
/// Publishers are serialized so the stored snapshot always carries the highest version.
#[derive(Debug)]
pub struct GatewayHandle {
    current: ArcSwap<Gateway>,
    sessions: Arc<SessionCodec>,
    last_version: Mutex<u64>,
}

impl GatewayHandle {
    /// Handle with a fresh session signing key, publishing `options` as version 1
    pub fn new(options: Options) -> Self {
        Self::with_sessions(options, Arc::new(SessionCodec::new()))
    }

    /// Handle with an explicit session codec
    pub fn with_sessions(options: Options, sessions: Arc<SessionCodec>) -> Self {
        let initial = Gateway::new(1, options, Arc::clone(&sessions));
        Self {
            current: ArcSwap::new(Arc::new(initial)),
            sessions,
            last_version: Mutex::new(1),
        }
    }

    /// The current snapshot
    pub fn current(&self) -> Arc<Gateway> {
        self.current.load_full()
    }

    /// Session codec shared by every snapshot
    pub fn sessions(&self) -> &Arc<SessionCodec> {
        &self.sessions
    }

    /// Replace the current snapshot, returning the new version
    pub fn publish(&self, options: Options) -> u64 {
        // Held until the store so a slower publisher cannot overwrite a newer snapshot
        let mut last_version = self.last_version.lock().unwrap_or_else(PoisonError::into_inner);
        let version = *last_version + 1;
        let gateway = Gateway::new(version, options, Arc::clone(&self.sessions));

        tracing::info!(
            version = version,
            interactive_mode = gateway.mode_name(TrafficClass::Interactive),
            telemetry_mode = gateway.mode_name(TrafficClass::Telemetry),
            "Published gateway configuration"
        );

        self.current.store(Arc::new(gateway));
        *last_version = version;
        version
    }
}
