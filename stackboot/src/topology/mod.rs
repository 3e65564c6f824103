//! Service topology: declaration, validation and rendering

pub mod defaults;
pub mod graph;
pub mod render;
pub mod service;

use crate::errors::ConfigurationError;
use service::{FrontDoor, ServiceSpec};

/// Declared set of services plus an optional public front door
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    services: Vec<ServiceSpec>,
    front_door: Option<FrontDoor>,
}

impl Topology {
    pub fn new(services: Vec<ServiceSpec>) -> Self {
        Self {
            services,
            front_door: None,
        }
    }

    pub fn with_front_door(mut self, front_door: FrontDoor) -> Self {
        self.front_door = Some(front_door);
        self
    }

    pub fn services(&self) -> &[ServiceSpec] {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn front_door(&self) -> Option<&FrontDoor> {
        self.front_door.as_ref()
    }

    /// Check the dependency graph and front door, returning the start order
    pub fn validate(&self) -> Result<Vec<String>, ConfigurationError> {
        let order = graph::start_order(&self.services)?;

        if let Some(front_door) = &self.front_door {
            for name in [&front_door.service, &front_door.upstream] {
                if self.service(name).is_none() {
                    return Err(ConfigurationError::UnknownDependency {
                        service: "front door".to_string(),
                        dependency: name.clone(),
                    });
                }
            }
        }

        Ok(order)
    }
}
