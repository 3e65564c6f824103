//! Rendering of the deployment descriptor and the front door config
//!
//! Every string in a [`ServiceSpec`] may reference configuration keys with
//! `${KEY}`. Secret keys stay as references and are interpolated by the
//! container runtime from the environment file next to the descriptor, so
//! no secret is ever copied into a rendered file. Non-secret keys are
//! substituted with their resolved value. `${KEY:-default}` forms are
//! passed through for the runtime to resolve and do not require the key.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::config::env::{EnvKey, EnvironmentConfig};
use crate::errors::{BootstrapError, ConfigurationError};
use crate::storage::layout::InstallLayout;
use crate::topology::service::{FrontDoor, Readiness, ServiceSource, ServiceSpec};
use crate::topology::Topology;
use crate::utils::sha256_hash;

/// Build context of the proxy image, relative to the install dir
const PROXY_BUILD_CONTEXT: &str = "./proxy";

/// Caddy module providing the Cloudflare DNS challenge
const CLOUDFLARE_DNS_MODULE: &str = "github.com/caddy-dns/cloudflare";

/// Rendered files, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTopology {
    pub compose: String,
    pub proxy: Option<String>,
    /// Dockerfile for a proxy image carrying the DNS provider module
    pub proxy_build: Option<String>,
    /// Services in start order
    pub start_order: Vec<String>,
}

impl RenderedTopology {
    pub fn compose_digest(&self) -> String {
        sha256_hash(self.compose.as_bytes())
    }

    pub fn proxy_digest(&self) -> Option<String> {
        self.proxy.as_ref().map(|p| sha256_hash(p.as_bytes()))
    }

    /// Write the descriptor (and proxy config if any) into the install layout
    pub async fn write(&self, layout: &InstallLayout) -> Result<(), BootstrapError> {
        let compose_file = layout.compose_file();
        compose_file.write_string(&self.compose).await?;
        info!(
            "Wrote {} (sha256 {})",
            compose_file.path().display(),
            self.compose_digest()
        );

        if let Some(proxy) = &self.proxy {
            let proxy_file = layout.proxy_file();
            proxy_file.write_string(proxy).await?;
            info!(
                "Wrote {} (sha256 {})",
                proxy_file.path().display(),
                sha256_hash(proxy.as_bytes())
            );
        }

        if let Some(dockerfile) = &self.proxy_build {
            let build_file = layout.proxy_build_dir().file("Dockerfile");
            build_file.write_string(dockerfile).await?;
            info!(
                "Wrote {} (sha256 {})",
                build_file.path().display(),
                sha256_hash(dockerfile.as_bytes())
            );
        }
        Ok(())
    }
}

/// Validate the topology against the configuration and render it
///
/// Fails with a configuration error on any cycle, unknown dependency or
/// missing key. Identical inputs always produce byte-identical output.
pub fn render(
    topology: &Topology,
    config: &EnvironmentConfig,
) -> Result<RenderedTopology, ConfigurationError> {
    let start_order = topology.validate()?;

    // The DNS challenge needs a proxy build with the provider module compiled in
    let dns_proxy = match topology.front_door() {
        Some(front_door) if config.get(EnvKey::CloudflareApiToken).is_some() => {
            topology.service(&front_door.service)
        }
        _ => None,
    };

    let mut services = BTreeMap::new();
    for spec in topology.services() {
        let mut service = compose_service(spec, topology, config)?;
        if dns_proxy.is_some_and(|proxy| proxy.name == spec.name) {
            service.image = None;
            service.build = Some(ComposeBuild {
                context: PROXY_BUILD_CONTEXT.to_string(),
                dockerfile: None,
            });
        }
        services.insert(spec.name.clone(), service);
    }

    let proxy_build = match dns_proxy.map(|proxy| &proxy.source) {
        Some(ServiceSource::Image(image)) => {
            Some(dns_proxy_dockerfile(&interpolate(image, config)?))
        }
        Some(ServiceSource::Build { .. }) => {
            return Err(ConfigurationError::InvalidSettings(
                "the front door proxy must be declared from an image".to_string(),
            ))
        }
        None => None,
    };

    let compose = serde_yaml::to_string(&ComposeFile { services })
        .map_err(|e| ConfigurationError::InvalidSettings(format!("compose rendering: {}", e)))?;

    let proxy = match topology.front_door() {
        Some(front_door) => Some(render_proxy(front_door, config)?),
        None => None,
    };

    Ok(RenderedTopology {
        compose,
        proxy,
        proxy_build,
        start_order,
    })
}

/// Two-stage build adding the Cloudflare DNS module to a Caddy image
fn dns_proxy_dockerfile(image: &str) -> String {
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    let builder = if image[name_start..].contains(':') {
        format!("{}-builder", image)
    } else {
        format!("{}:builder", image)
    };
    format!(
        "FROM {builder} AS builder\n\
         RUN xcaddy build --with {module}\n\
         \n\
         FROM {image}\n\
         COPY --from=builder /usr/bin/caddy /usr/bin/caddy\n",
        builder = builder,
        module = CLOUDFLARE_DNS_MODULE,
        image = image,
    )
}

#[derive(Serialize)]
struct ComposeFile {
    services: BTreeMap<String, ComposeService>,
}

#[derive(Serialize)]
struct ComposeService {
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<ComposeBuild>,
    restart: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    depends_on: BTreeMap<String, DependsOn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<ComposeHealthcheck>,
}

#[derive(Serialize)]
struct ComposeBuild {
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dockerfile: Option<String>,
}

#[derive(Serialize)]
struct DependsOn {
    condition: &'static str,
}

#[derive(Serialize)]
struct ComposeHealthcheck {
    test: Vec<String>,
    interval: String,
    timeout: String,
    retries: u32,
}

fn compose_service(
    spec: &ServiceSpec,
    topology: &Topology,
    config: &EnvironmentConfig,
) -> Result<ComposeService, ConfigurationError> {
    let (image, build) = match &spec.source {
        ServiceSource::Image(image) => (Some(interpolate(image, config)?), None),
        ServiceSource::Build {
            context,
            dockerfile,
        } => (
            None,
            Some(ComposeBuild {
                context: context.clone(),
                dockerfile: dockerfile.clone(),
            }),
        ),
    };

    let mut depends_on = BTreeMap::new();
    for dep in &spec.depends_on {
        // Existence was checked by validate()
        let condition = match topology.service(dep).map(|s| &s.readiness) {
            Some(Readiness::Probe(_)) => "service_healthy",
            _ => "service_started",
        };
        depends_on.insert(dep.clone(), DependsOn { condition });
    }

    let healthcheck = match &spec.readiness {
        Readiness::ProcessStarted => None,
        Readiness::Probe(probe) => Some(ComposeHealthcheck {
            test: interpolate_all(&probe.test, config)?,
            interval: format!("{}s", probe.interval_secs),
            timeout: format!("{}s", probe.timeout_secs),
            retries: probe.retries,
        }),
    };

    let mut environment = BTreeMap::new();
    for (name, value) in &spec.environment {
        environment.insert(name.clone(), interpolate(value, config)?);
    }

    let command = match &spec.command {
        Some(args) => Some(interpolate_all(args, config)?),
        None => None,
    };

    Ok(ComposeService {
        image,
        build,
        restart: "unless-stopped",
        command,
        environment,
        ports: interpolate_all(&spec.ports, config)?,
        volumes: interpolate_all(&spec.volumes, config)?,
        depends_on,
        healthcheck,
    })
}

fn render_proxy(
    front_door: &FrontDoor,
    config: &EnvironmentConfig,
) -> Result<String, ConfigurationError> {
    let host = config.public_host()?;
    let port = config.port()?;
    let upstream = format!("{}:{}", front_door.upstream, port);

    let mut out = String::new();
    out.push_str(host);
    out.push_str(" {\n");

    if config.get(EnvKey::CloudflareApiToken).is_some() {
        out.push_str("\ttls {\n");
        out.push_str("\t\tdns cloudflare {env.CLOUDFLARE_API_TOKEN}\n");
        out.push_str("\t}\n\n");
    }

    for route in &front_door.routes {
        out.push_str(&format!(
            "\thandle {} {{\n\t\treverse_proxy {}\n\t}}\n\n",
            route, upstream
        ));
    }

    out.push_str("\thandle {\n\t\trespond \"Not Found\" 404\n\t}\n}\n");
    Ok(out)
}

fn interpolate_all(
    values: &[String],
    config: &EnvironmentConfig,
) -> Result<Vec<String>, ConfigurationError> {
    values.iter().map(|v| interpolate(v, config)).collect()
}

/// Resolve `${KEY}` references in one string
pub fn interpolate(input: &str, config: &EnvironmentConfig) -> Result<String, ConfigurationError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("$$") {
            out.push_str("$$");
            rest = &tail[2..];
            continue;
        }

        let Some(body) = tail.strip_prefix("${") else {
            out.push('$');
            rest = &tail[1..];
            continue;
        };

        let Some(end) = body.find('}') else {
            return Err(ConfigurationError::InvalidSettings(format!(
                "unterminated reference in '{}'",
                input
            )));
        };
        let inner = &body[..end];
        rest = &body[end + 1..];

        let name_len = inner
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(inner.len());
        let (name, modifier) = inner.split_at(name_len);

        let key = EnvKey::from_name(name)
            .ok_or_else(|| ConfigurationError::UnknownKey(name.to_string()))?;

        if !modifier.is_empty() {
            out.push_str("${");
            out.push_str(inner);
            out.push('}');
        } else if key.is_secret() {
            config.require(key)?;
            out.push_str("${");
            out.push_str(name);
            out.push('}');
        } else {
            out.push_str(config.require(key)?);
        }
    }

    out.push_str(rest);
    Ok(out)
}
