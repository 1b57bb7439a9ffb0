//! Versioned handler registries.
//!
//! Orchestrations and activities share one `Registry<H>` shape: a name maps to
//! a set of semver versions, each with its handler. Activities always live at
//! `1.0.0`. Orchestrations may carry several versions so that in-flight
//! instances keep replaying on the version recorded in their history while new
//! instances pick up the latest one.

use super::{ActivityHandler, FnActivity, FnOrchestration, OrchestrationHandler};
use crate::_typed_codec::Codec;
use crate::OrchestrationContext;
use semver::Version;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

const DEFAULT_VERSION: Version = Version::new(1, 0, 0);

/// Which version new instances of a name resolve to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VersionPolicy {
    Latest,
    Exact(Version),
}

pub struct Registry<H: ?Sized> {
    pub(crate) inner: Arc<HashMap<String, BTreeMap<Version, Arc<H>>>>,
    pub(crate) policy: Arc<Mutex<HashMap<String, VersionPolicy>>>,
}

impl<H: ?Sized> Clone for Registry<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<H: ?Sized> Default for Registry<H> {
    fn default() -> Self {
        Self {
            inner: Arc::new(HashMap::new()),
            policy: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

pub struct RegistryBuilder<H: ?Sized> {
    map: HashMap<String, BTreeMap<Version, Arc<H>>>,
    policy: HashMap<String, VersionPolicy>,
    errors: Vec<String>,
}

pub type OrchestrationRegistry = Registry<dyn OrchestrationHandler>;
pub type ActivityRegistry = Registry<dyn ActivityHandler>;
pub type OrchestrationRegistryBuilder = RegistryBuilder<dyn OrchestrationHandler>;
pub type ActivityRegistryBuilder = RegistryBuilder<dyn ActivityHandler>;

impl<H: ?Sized> Registry<H> {
    pub fn builder() -> RegistryBuilder<H> {
        RegistryBuilder {
            map: HashMap::new(),
            policy: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn builder_from(reg: &Registry<H>) -> RegistryBuilder<H> {
        RegistryBuilder {
            map: reg.inner.as_ref().clone(),
            policy: reg.policies().clone(),
            errors: Vec::new(),
        }
    }

    // Policies are plain data; a poisoned lock still holds a usable map.
    fn policies(&self) -> MutexGuard<'_, HashMap<String, VersionPolicy>> {
        self.policy.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resolve the handler new instances of `name` should run.
    pub fn resolve_handler(&self, name: &str) -> Option<(Version, Arc<H>)> {
        let pol = self.policies().get(name).cloned().unwrap_or(VersionPolicy::Latest);

        let result = match &pol {
            VersionPolicy::Latest => self
                .inner
                .get(name)
                .and_then(|m| m.iter().next_back())
                .map(|(v, h)| (v.clone(), Arc::clone(h))),
            VersionPolicy::Exact(v) => self
                .inner
                .get(name)
                .and_then(|versions| versions.get(v))
                .map(|h| (v.clone(), Arc::clone(h))),
        };

        if result.is_none() {
            self.log_registry_miss(name, None, Some(&pol));
        }

        result
    }

    pub fn resolve_version(&self, name: &str) -> Option<Version> {
        self.resolve_handler(name).map(|(v, _h)| v)
    }

    /// Resolve the handler for one exact version, as recorded in history.
    pub fn resolve_handler_exact(&self, name: &str, v: &Version) -> Option<Arc<H>> {
        let result = self.inner.get(name).and_then(|versions| versions.get(v).cloned());

        if result.is_none() {
            self.log_registry_miss(name, Some(v), None);
        }

        result
    }

    pub fn set_version_policy(&self, name: &str, policy: VersionPolicy) {
        self.policies().insert(name.to_string(), policy);
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_versions(&self, name: &str) -> Vec<Version> {
        self.inner
            .get(name)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    fn log_registry_miss(
        &self,
        name: &str,
        requested_version: Option<&Version>,
        requested_policy: Option<&VersionPolicy>,
    ) {
        let available_versions = self.list_versions(name);
        tracing::debug!(
            target: "durafan::runtime::registry",
            requested_name = %name,
            requested_version = ?requested_version,
            requested_policy = ?requested_policy,
            available_versions_for_name = ?available_versions,
            registered_names = ?self.list_names(),
            "Registry lookup miss"
        );
    }
}

impl<H: ?Sized> RegistryBuilder<H> {
    pub fn build(self) -> Registry<H> {
        Registry {
            inner: Arc::new(self.map),
            policy: Arc::new(Mutex::new(self.policy)),
        }
    }

    /// Build the registry, or return every registration error joined with `; `.
    pub fn build_result(self) -> Result<Registry<H>, String> {
        if self.errors.is_empty() {
            Ok(self.build())
        } else {
            Err(self.errors.join("; "))
        }
    }

    fn merge_registry(mut self, other: Registry<H>, error_prefix: &str) -> Self {
        for (name, versions) in other.inner.iter() {
            let entry = self.map.entry(name.clone()).or_default();
            for (version, handler) in versions.iter() {
                if entry.contains_key(version) {
                    self.errors
                        .push(format!("duplicate {error_prefix} in merge: {name}@{version}"));
                } else {
                    entry.insert(version.clone(), Arc::clone(handler));
                }
            }
        }
        self
    }

    fn check_duplicate(&mut self, name: &str, version: &Version, error_prefix: &str) -> bool {
        let entry = self.map.entry(name.to_string()).or_default();
        if entry.contains_key(version) {
            self.errors
                .push(format!("duplicate {error_prefix} registration: {name}@{version}"));
            true
        } else {
            false
        }
    }

    /// Versions of one name must be registered in increasing order.
    fn check_version(&mut self, name: &str, version: &str) -> Option<Version> {
        let v = match Version::parse(version) {
            Ok(v) => v,
            Err(e) => {
                self.errors
                    .push(format!("invalid version for orchestration {name}: {version}: {e}"));
                return None;
            }
        };
        if self.check_duplicate(name, &v, "orchestration") {
            return None;
        }
        if let Some((latest, _)) = self.map.get(name).and_then(|m| m.iter().next_back())
            && &v <= latest
        {
            self.errors.push(format!(
                "non-monotonic orchestration version for {name}: {v} is not later than existing latest {latest}"
            ));
            return None;
        }
        Some(v)
    }
}

impl OrchestrationRegistryBuilder {
    pub fn register<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        self.register_versioned(name, DEFAULT_VERSION.to_string(), f)
    }

    /// Register an orchestration whose input and output are JSON documents.
    pub fn register_typed<In, Out, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        In: serde::de::DeserializeOwned + Send + 'static,
        Out: serde::Serialize + Send + 'static,
        F: Fn(OrchestrationContext, In) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = Result<Out, String>> + Send + 'static,
    {
        let wrapper = move |ctx: OrchestrationContext, input_s: String| {
            let f_inner = f.clone();
            async move {
                let input: In = crate::_typed_codec::Json::decode(&input_s)?;
                let out: Out = f_inner(ctx, input).await?;
                crate::_typed_codec::Json::encode(&out)
            }
        };
        self.register(name, wrapper)
    }

    pub fn register_versioned<F, Fut>(mut self, name: impl Into<String>, version: impl AsRef<str>, f: F) -> Self
    where
        F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = name.into();
        let Some(v) = self.check_version(&name, version.as_ref()) else {
            return self;
        };
        self.map
            .entry(name)
            .or_default()
            .insert(v, Arc::new(FnOrchestration(f)));
        self
    }

    pub fn merge(self, other: OrchestrationRegistry) -> Self {
        self.merge_registry(other, "orchestration")
    }

    pub fn set_policy(mut self, name: impl Into<String>, policy: VersionPolicy) -> Self {
        self.policy.insert(name.into(), policy);
        self
    }
}

impl ActivityRegistryBuilder {
    pub fn register<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(crate::ActivityContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = name.into();
        if self.check_duplicate(&name, &DEFAULT_VERSION, "activity") {
            return self;
        }
        self.map
            .entry(name.clone())
            .or_default()
            .insert(DEFAULT_VERSION, Arc::new(FnActivity(f)));
        self.policy.insert(name, VersionPolicy::Latest);
        self
    }

    pub fn register_typed<In, Out, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        In: serde::de::DeserializeOwned + Send + 'static,
        Out: serde::Serialize + Send + 'static,
        F: Fn(crate::ActivityContext, In) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Out, String>> + Send + 'static,
    {
        let f = Arc::new(f);
        let wrapper = move |ctx: crate::ActivityContext, input_s: String| {
            let f_inner = Arc::clone(&f);
            async move {
                let input: In = crate::_typed_codec::Json::decode(&input_s)?;
                let out: Out = (f_inner)(ctx, input).await?;
                crate::_typed_codec::Json::encode(&out)
            }
        };
        self.register(name, wrapper)
    }

    pub fn merge(self, other: ActivityRegistry) -> Self {
        self.merge_registry(other, "activity")
    }
}
