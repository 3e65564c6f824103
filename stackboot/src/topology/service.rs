//! Service topology model

use std::collections::{BTreeMap, BTreeSet};

/// Where a service's container image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSource {
    /// Pull a published image
    Image(String),

    /// Build from a context directory relative to the install dir
    Build {
        context: String,
        dockerfile: Option<String>,
    },
}

/// Container-level readiness, used by the runtime to gate dependents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Ready as soon as the process has started
    ProcessStarted,

    /// Ready once the probe command passes
    Probe(HealthProbe),
}

/// Container health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthProbe {
    /// Probe command in runtime syntax (`["CMD", ...]` or `["CMD-SHELL", "..."]`)
    pub test: Vec<String>,
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub retries: u32,
}

impl HealthProbe {
    pub fn new<I, S>(test: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            test: test.into_iter().map(Into::into).collect(),
            interval_secs: 5,
            timeout_secs: 5,
            retries: 10,
        }
    }
}

/// One service of the stack
///
/// String fields may reference configuration keys as `${KEY}`; see
/// [`crate::topology::render`] for how references are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub source: ServiceSource,
    pub depends_on: BTreeSet<String>,
    pub readiness: Readiness,
    /// `host:container` or `ip:host:container` bindings
    pub ports: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub command: Option<Vec<String>>,
}

impl ServiceSpec {
    pub fn image(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self::with_source(name, ServiceSource::Image(image.into()))
    }

    pub fn build(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::with_source(
            name,
            ServiceSource::Build {
                context: context.into(),
                dockerfile: None,
            },
        )
    }

    fn with_source(name: impl Into<String>, source: ServiceSource) -> Self {
        Self {
            name: name.into(),
            source,
            depends_on: BTreeSet::new(),
            readiness: Readiness::ProcessStarted,
            ports: Vec::new(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            command: None,
        }
    }

    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        self.depends_on.insert(service.into());
        self
    }

    pub fn probe(mut self, probe: HealthProbe) -> Self {
        self.readiness = Readiness::Probe(probe);
        self
    }

    pub fn port(mut self, binding: impl Into<String>) -> Self {
        self.ports.push(binding.into());
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    pub fn volume(mut self, mount: impl Into<String>) -> Self {
        self.volumes.push(mount.into());
        self
    }

    pub fn command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(args.into_iter().map(Into::into).collect());
        self
    }
}

/// Public entry point routed to one upstream service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontDoor {
    /// Reverse proxy service terminating TLS
    pub service: String,

    /// Service receiving the routed paths
    pub upstream: String,

    /// Path matchers forwarded to the upstream, e.g. `/v1/*`
    pub routes: Vec<String>,
}
