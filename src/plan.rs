//! Rollout plan construction
//!
//! Turns an environment's service instances into the list of services to
//! deploy: ignored names are removed, and when the caller supplied an
//! explicit deployment order the remainder is re-sorted (case-insensitively)
//! to match it. An order naming a service the environment does not have is a
//! configuration error, not a transient one.

use tracing::debug;

use crate::error::{ProvisionError, Result};

/// One service scheduled for deployment
#[derive(Debug, Clone)]
pub struct PlannedService {
    /// Logical service id (the deploy call's key)
    pub service_id: String,

    /// Human-readable service name
    pub name: String,

    /// Published network addresses of the service's instance
    pub domains: Vec<String>,
}

/// The services one rollout will deploy, in deployment order
#[derive(Debug, Clone)]
pub struct RolloutPlan {
    services: Vec<PlannedService>,
    ordered: bool,
}

impl RolloutPlan {
    /// Build a plan from resolved services.
    ///
    /// `ignore` names are dropped. When `order` is present the plan contains
    /// exactly those services, in that order; a name with no match in the
    /// environment fails construction.
    pub fn build(
        services: Vec<PlannedService>,
        ignore: &[String],
        order: Option<&[String]>,
    ) -> Result<Self> {
        let candidates: Vec<PlannedService> = services
            .into_iter()
            .filter(|service| {
                let ignored = ignore.contains(&service.name);
                if ignored {
                    debug!(service = %service.name, "excluded from deployment");
                }
                !ignored
            })
            .collect();

        match order {
            Some(order) if !order.is_empty() => {
                let mut sorted = Vec::with_capacity(order.len());
                for name in order {
                    let service = candidates
                        .iter()
                        .find(|s| s.name.eq_ignore_ascii_case(name))
                        .ok_or_else(|| {
                            ProvisionError::config(format!(
                                "service '{name}' from the deployment order not found in the environment"
                            ))
                        })?;
                    sorted.push(service.clone());
                }
                Ok(Self {
                    services: sorted,
                    ordered: true,
                })
            }
            _ => Ok(Self {
                services: candidates,
                ordered: false,
            }),
        }
    }

    /// Services in deployment order
    pub fn services(&self) -> &[PlannedService] {
        &self.services
    }

    /// Whether deployments are gated one at a time
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// The externally-facing service: an explicitly configured name wins,
    /// otherwise the first planned service matching one of the fallback
    /// names.
    pub fn api_service(
        &self,
        explicit: Option<&str>,
        fallbacks: &[String],
    ) -> Option<&PlannedService> {
        self.services.iter().find(|service| match explicit {
            Some(name) => service.name == name,
            None => fallbacks.contains(&service.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(name: &str) -> PlannedService {
        PlannedService {
            service_id: format!("svc-{name}"),
            name: name.to_string(),
            domains: vec![],
        }
    }

    fn planned_with_domain(name: &str, domain: &str) -> PlannedService {
        PlannedService {
            service_id: format!("svc-{name}"),
            name: name.to_string(),
            domains: vec![domain.to_string()],
        }
    }

    fn names(plan: &RolloutPlan) -> Vec<&str> {
        plan.services().iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_ignore_set_excludes_services() {
        let plan = RolloutPlan::build(
            vec![planned("web"), planned("worker"), planned("migrate")],
            &["migrate".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(names(&plan), vec!["web", "worker"]);
        assert!(!plan.is_ordered());
    }

    #[test]
    fn test_explicit_order_matches_exactly() {
        let plan = RolloutPlan::build(
            vec![planned("worker"), planned("web"), planned("cache")],
            &[],
            Some(&["web".to_string(), "worker".to_string(), "cache".to_string()]),
        )
        .unwrap();
        assert_eq!(names(&plan), vec!["web", "worker", "cache"]);
        assert!(plan.is_ordered());
    }

    #[test]
    fn test_order_matching_is_case_insensitive() {
        let plan = RolloutPlan::build(
            vec![planned("Web"), planned("Worker")],
            &[],
            Some(&["web".to_string(), "WORKER".to_string()]),
        )
        .unwrap();
        assert_eq!(names(&plan), vec!["Web", "Worker"]);
    }

    #[test]
    fn test_order_with_unknown_service_fails() {
        let err = RolloutPlan::build(
            vec![planned("web")],
            &[],
            Some(&["web".to_string(), "ghost".to_string()]),
        )
        .unwrap_err();
        assert!(matches!(err, ProvisionError::Config(ref m) if m.contains("ghost")));
    }

    #[test]
    fn test_order_narrows_the_plan() {
        // An order that names a subset deploys exactly that subset
        let plan = RolloutPlan::build(
            vec![planned("web"), planned("worker"), planned("cache")],
            &[],
            Some(&["cache".to_string()]),
        )
        .unwrap();
        assert_eq!(names(&plan), vec!["cache"]);
    }

    #[test]
    fn test_empty_order_is_unordered() {
        let plan = RolloutPlan::build(vec![planned("web")], &[], Some(&[])).unwrap();
        assert!(!plan.is_ordered());
    }

    #[test]
    fn test_api_service_explicit_name_wins() {
        let plan = RolloutPlan::build(
            vec![
                planned_with_domain("app", "app.example"),
                planned_with_domain("gateway", "gw.example"),
            ],
            &[],
            None,
        )
        .unwrap();

        let fallbacks = vec!["app".to_string(), "backend".to_string(), "web".to_string()];
        let service = plan.api_service(Some("gateway"), &fallbacks).unwrap();
        assert_eq!(service.name, "gateway");
    }

    #[test]
    fn test_api_service_falls_back_to_known_names() {
        let plan = RolloutPlan::build(
            vec![planned("worker"), planned_with_domain("backend", "api.example")],
            &[],
            None,
        )
        .unwrap();

        let fallbacks = vec!["app".to_string(), "backend".to_string(), "web".to_string()];
        let service = plan.api_service(None, &fallbacks).unwrap();
        assert_eq!(service.name, "backend");
        assert_eq!(service.domains[0], "api.example");
    }

    #[test]
    fn test_api_service_none_when_nothing_matches() {
        let plan = RolloutPlan::build(vec![planned("worker")], &[], None).unwrap();
        let fallbacks = vec!["app".to_string(), "backend".to_string(), "web".to_string()];
        assert!(plan.api_service(None, &fallbacks).is_none());
    }
}
