//! Options loading and live reload
//!
//! The loader remembers where options came from so a reload reads the same file and
//! environment and applies the same command-line overrides. Every build goes through one
//! [`OptionsSource`], so a generated browser token survives reloads.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aperture_auth::GatewayHandle;
use aperture_config::{ConfigErrors, Options, OptionsSource, RawOptions};

/// Command-line values that win over file and environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub frontend_urls: Option<String>,
    pub otlp_grpc_url: Option<String>,
    pub otlp_http_url: Option<String>,
    pub unsecured_allow_anonymous: bool,
}

impl Overrides {
    /// Write the overrides into raw options
    pub fn apply(&self, raw: &mut RawOptions) {
        if let Some(urls) = &self.frontend_urls {
            raw.frontend.endpoint_urls = Some(urls.clone());
        }
        if let Some(url) = &self.otlp_grpc_url {
            raw.otlp.grpc_endpoint_url = Some(url.clone());
        }
        if let Some(url) = &self.otlp_http_url {
            raw.otlp.http_endpoint_url = Some(url.clone());
        }
        if self.unsecured_allow_anonymous {
            raw.unsecured_allow_anonymous = Some("true".to_string());
        }
    }
}

/// Outcome of a successful reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reloaded {
    /// Version of the published snapshot
    pub version: u64,
    /// Bind addresses differ from the running ones and need a restart
    pub endpoints_changed: bool,
}

/// Reads options from file, environment and overrides
#[derive(Debug)]
pub struct OptionsLoader {
    path: PathBuf,
    overrides: Overrides,
    source: OptionsSource,
}

impl OptionsLoader {
    /// Read the initial raw options
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be parsed.
    pub fn new(path: impl Into<PathBuf>, overrides: Overrides) -> Result<Self> {
        let path = path.into();
        let raw = read_raw(&path, &overrides)?;
        Ok(Self {
            path,
            overrides,
            source: OptionsSource::new(raw),
        })
    }

    /// Configuration file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate the current raw options
    pub fn build(&self) -> std::result::Result<Options, ConfigErrors> {
        self.source.build()
    }

    /// The generated browser token, if one was needed
    pub fn generated_browser_token(&self) -> Option<&str> {
        self.source.generated_browser_token()
    }

    /// Re-read options and publish them on `handle`
    ///
    /// Nothing is published when reading or validation fails; the running snapshot stays.
    /// Listener addresses are fixed for the process lifetime, so changed endpoints are
    /// only reported.
    pub fn reload(&mut self, handle: &GatewayHandle) -> Result<Reloaded> {
        let raw = read_raw(&self.path, &self.overrides)?;
        let source = self.source.with_raw(raw);
        let options = source
            .build()
            .with_context(|| format!("Invalid configuration in {}", self.path.display()))?;

        let endpoints_changed = endpoint_list(handle.current().options()) != endpoint_list(&options);
        self.source = source;
        let version = handle.publish(options);

        Ok(Reloaded {
            version,
            endpoints_changed,
        })
    }
}

fn read_raw(path: &Path, overrides: &Overrides) -> Result<RawOptions> {
    let mut raw = aperture_config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    overrides.apply(&mut raw);
    Ok(raw)
}

fn endpoint_list(options: &Options) -> Vec<String> {
    options.all_endpoints().map(ToString::to_string).collect()
}
