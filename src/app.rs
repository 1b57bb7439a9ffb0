//! Function dispatch table.
//!
//! A [`FunctionApp`] lists every function by name together with how it is
//! triggered. Orchestrations and activities go into the runtime registries;
//! HTTP triggers are routes served by [`crate::http`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::runtime::registry::{ActivityRegistry, ActivityRegistryBuilder, OrchestrationRegistryBuilder};
use crate::{ActivityContext, OrchestrationContext, OrchestrationRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Starts orchestrations from an HTTP request.
    Http,
    Orchestration,
    Activity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub kind: TriggerKind,
    /// Route template for HTTP triggers, e.g. `orchestrators/{functionName}`.
    pub route: Option<String>,
}

pub struct FunctionApp {
    functions: BTreeMap<String, FunctionEntry>,
    orchestrations: OrchestrationRegistry,
    activities: Arc<ActivityRegistry>,
}

impl FunctionApp {
    pub fn builder() -> FunctionAppBuilder {
        FunctionAppBuilder {
            functions: BTreeMap::new(),
            orchestrations: OrchestrationRegistry::builder(),
            activities: ActivityRegistry::builder(),
            errors: Vec::new(),
        }
    }

    pub fn kind_of(&self, name: &str) -> Option<TriggerKind> {
        self.functions.get(name).map(|f| f.kind)
    }

    /// True when `name` can be started through an HTTP trigger.
    pub fn is_orchestration(&self, name: &str) -> bool {
        self.kind_of(name) == Some(TriggerKind::Orchestration)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.functions.values()
    }

    pub fn orchestrations(&self) -> OrchestrationRegistry {
        self.orchestrations.clone()
    }

    pub fn activities(&self) -> Arc<ActivityRegistry> {
        Arc::clone(&self.activities)
    }
}

pub struct FunctionAppBuilder {
    functions: BTreeMap<String, FunctionEntry>,
    orchestrations: OrchestrationRegistryBuilder,
    activities: ActivityRegistryBuilder,
    errors: Vec<String>,
}

impl FunctionAppBuilder {
    fn add(&mut self, name: &str, kind: TriggerKind, route: Option<String>) -> bool {
        if let Some(existing) = self.functions.get(name) {
            self.errors
                .push(format!("function {name} already registered as {:?}", existing.kind));
            return false;
        }
        self.functions.insert(
            name.to_string(),
            FunctionEntry {
                name: name.to_string(),
                kind,
                route,
            },
        );
        true
    }

    pub fn http_trigger(mut self, name: &str, route: &str) -> Self {
        self.add(name, TriggerKind::Http, Some(route.to_string()));
        self
    }

    pub fn orchestration<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        if self.add(name, TriggerKind::Orchestration, None) {
            self.orchestrations = self.orchestrations.register(name, f);
        }
        self
    }

    pub fn activity<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(ActivityContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        if self.add(name, TriggerKind::Activity, None) {
            self.activities = self.activities.register(name, f);
        }
        self
    }

    pub fn build(self) -> Result<FunctionApp, String> {
        let mut errors = self.errors;
        let orchestrations = self.orchestrations.build_result().map_err(|e| errors.push(e)).ok();
        let activities = self.activities.build_result().map_err(|e| errors.push(e)).ok();
        match (orchestrations, activities) {
            (Some(orchestrations), Some(activities)) if errors.is_empty() => Ok(FunctionApp {
                functions: self.functions,
                orchestrations,
                activities: Arc::new(activities),
            }),
            _ => Err(errors.join("; ")),
        }
    }
}
