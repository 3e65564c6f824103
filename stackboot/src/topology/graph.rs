//! Dependency graph validation

use std::collections::{BTreeMap, HashMap};

use crate::errors::ConfigurationError;
use crate::topology::service::ServiceSpec;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Validate the dependency graph and return a start order (dependencies first).
///
/// Services are visited in name order so the result is stable.
pub fn start_order(services: &[ServiceSpec]) -> Result<Vec<String>, ConfigurationError> {
    let mut graph: BTreeMap<&str, &ServiceSpec> = BTreeMap::new();
    for service in services {
        if graph.insert(service.name.as_str(), service).is_some() {
            return Err(ConfigurationError::DuplicateService(service.name.clone()));
        }
    }

    for service in services {
        if let Some(missing) = service
            .depends_on
            .iter()
            .find(|dep| !graph.contains_key(dep.as_str()))
        {
            return Err(ConfigurationError::UnknownDependency {
                service: service.name.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut order = Vec::with_capacity(services.len());

    for name in graph.keys() {
        visit(name, &graph, &mut marks, &mut stack, &mut order)?;
    }

    Ok(order)
}

fn visit<'a>(
    name: &'a str,
    graph: &BTreeMap<&'a str, &'a ServiceSpec>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), ConfigurationError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(name.to_string());
            return Err(ConfigurationError::DependencyCycle { cycle });
        }
        None => {}
    }

    marks.insert(name, Mark::Visiting);
    stack.push(name);

    if let Some(service) = graph.get(name) {
        for dep in &service.depends_on {
            visit(dep.as_str(), graph, marks, stack, order)?;
        }
    }

    stack.pop();
    marks.insert(name, Mark::Done);
    order.push(name.to_string());
    Ok(())
}
