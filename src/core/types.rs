//! SP-001: Configuration model, resource handles, plans, and run records.
//!
//! Defines the YAML schema for `stack.yaml`, the opaque handle type threaded
//! between units, and the serialisable records written after a run. All
//! configuration fields carry a deterministic default so that nothing the
//! orchestrator inspects for control flow is ever undefined.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Top-level stack.yaml
// ============================================================================

/// Root configuration: which resource categories exist and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack name, used as a prefix for every produced handle
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Deployment environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Target region
    #[serde(default = "default_region")]
    pub region: String,

    /// Tags applied to every unit
    #[serde(default)]
    pub tags: IndexMap<String, String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub compute: ComputeConfig,

    #[serde(default)]
    pub serverless: ServerlessConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Execution policy
    #[serde(default)]
    pub policy: Policy,
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_true() -> bool {
    true
}

impl StackConfig {
    /// A minimal valid configuration with every category at its default.
    pub fn named(name: &str) -> Self {
        Self {
            version: "1.0".to_string(),
            name: name.to_string(),
            description: None,
            environment: default_environment(),
            region: default_region(),
            tags: IndexMap::new(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            compute: ComputeConfig::default(),
            serverless: ServerlessConfig::default(),
            monitoring: MonitoringConfig::default(),
            policy: Policy::default(),
        }
    }

    /// Whether a category's enablement flag is set.
    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Network => self.network.enabled,
            Category::Storage => self.storage.enabled,
            Category::Database => self.database.enabled,
            Category::Auth => self.auth.enabled,
            Category::Compute => self.compute.enabled,
            Category::Serverless => self.serverless.enabled,
            Category::Monitoring => self.monitoring.enabled,
        }
    }

    /// Set a category's enablement flag.
    pub fn set_enabled(&mut self, category: Category, enabled: bool) {
        match category {
            Category::Network => self.network.enabled = enabled,
            Category::Storage => self.storage.enabled = enabled,
            Category::Database => self.database.enabled = enabled,
            Category::Auth => self.auth.enabled = enabled,
            Category::Compute => self.compute.enabled = enabled,
            Category::Serverless => self.serverless.enabled = enabled,
            Category::Monitoring => self.monitoring.enabled = enabled,
        }
    }

    /// Borrow the configuration subtree for a category.
    pub fn category(&self, category: Category) -> CategoryConfig<'_> {
        match category {
            Category::Network => CategoryConfig::Network(&self.network),
            Category::Storage => CategoryConfig::Storage(&self.storage),
            Category::Database => CategoryConfig::Database(&self.database),
            Category::Auth => CategoryConfig::Auth(&self.auth),
            Category::Compute => CategoryConfig::Compute(&self.compute),
            Category::Serverless => CategoryConfig::Serverless(&self.serverless),
            Category::Monitoring => CategoryConfig::Monitoring(&self.monitoring),
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

/// Resource category: one configuration subtree each.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Network,
    Storage,
    Database,
    Auth,
    Compute,
    Serverless,
    Monitoring,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Network,
        Category::Storage,
        Category::Database,
        Category::Auth,
        Category::Compute,
        Category::Serverless,
        Category::Monitoring,
    ];

    /// Parse a lowercase category name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.to_string() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Storage => write!(f, "storage"),
            Self::Database => write!(f, "database"),
            Self::Auth => write!(f, "auth"),
            Self::Compute => write!(f, "compute"),
            Self::Serverless => write!(f, "serverless"),
            Self::Monitoring => write!(f, "monitoring"),
        }
    }
}

/// Borrowed view of one category's configuration, handed to unit builders.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(untagged)]
pub enum CategoryConfig<'a> {
    Network(&'a NetworkConfig),
    Storage(&'a StorageConfig),
    Database(&'a DatabaseConfig),
    Auth(&'a AuthConfig),
    Compute(&'a ComputeConfig),
    Serverless(&'a ServerlessConfig),
    Monitoring(&'a MonitoringConfig),
}

impl CategoryConfig<'_> {
    pub fn category(&self) -> Category {
        match self {
            Self::Network(_) => Category::Network,
            Self::Storage(_) => Category::Storage,
            Self::Database(_) => Category::Database,
            Self::Auth(_) => Category::Auth,
            Self::Compute(_) => Category::Compute,
            Self::Serverless(_) => Category::Serverless,
            Self::Monitoring(_) => Category::Monitoring,
        }
    }
}

// ============================================================================
// Category subtrees
// ============================================================================

/// Network boundary (VPC, subnets, security group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub enabled: bool,

    /// Address range of the network boundary
    pub cidr: String,

    /// Availability zones to span
    pub max_azs: u32,

    /// NAT gateways for private egress
    pub nat_gateways: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            nat_gateways: 1,
        }
    }
}

/// Object storage bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub enabled: bool,

    /// Bucket name prefix (stack name is prepended)
    pub bucket_prefix: String,

    /// Keep object versions
    pub versioned: bool,

    /// Expire objects after N days (0 = never)
    pub expiration_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket_prefix: "assets".to_string(),
            versioned: true,
            expiration_days: 0,
        }
    }
}

/// Relational database engine.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseEngine {
    #[default]
    Postgres,
    Mysql,
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Mysql => write!(f, "mysql"),
        }
    }
}

/// Relational database inside the network boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub engine: DatabaseEngine,
    pub instance_class: String,
    pub allocated_storage_gb: u32,
    pub multi_az: bool,
    pub database_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            engine: DatabaseEngine::default(),
            instance_class: "t3.micro".to_string(),
            allocated_storage_gb: 20,
            multi_az: false,
            database_name: "app".to_string(),
        }
    }
}

/// Multi-factor authentication mode.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MfaMode {
    Off,
    #[default]
    Optional,
    Required,
}

/// User directory and application client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub enabled: bool,
    pub self_sign_up: bool,
    pub mfa: MfaMode,
    pub password_min_length: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            self_sign_up: false,
            mfa: MfaMode::default(),
            password_min_length: 12,
        }
    }
}

/// Container service inside the network boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeConfig {
    pub enabled: bool,
    pub image: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub desired_count: u32,
    pub port: u16,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image: "nginx:latest".to_string(),
            cpu: 256,
            memory_mib: 512,
            desired_count: 1,
            port: 80,
        }
    }
}

/// Event-driven function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ServerlessConfig {
    pub enabled: bool,
    pub runtime: String,
    pub handler: String,
    pub memory_mb: u32,
    pub timeout_secs: u32,
}

impl Default for ServerlessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            runtime: "nodejs20.x".to_string(),
            handler: "index.handler".to_string(),
            memory_mb: 128,
            timeout_secs: 30,
        }
    }
}

/// Telemetry: log groups, alarms, dashboard. Enabled unless switched off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    pub enabled: bool,

    /// Alarm notification address
    pub alarm_email: Option<String>,

    pub log_retention_days: u32,
    pub dashboard: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alarm_email: None,
            log_retention_days: 30,
            dashboard: true,
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Execution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Build independent units of the same wave concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Append provenance events for every run
    #[serde(default = "default_true")]
    pub event_log: bool,

    /// Persist the run lock after apply
    #[serde(default = "default_true")]
    pub lock_file: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            parallel: false,
            event_log: true,
            lock_file: true,
        }
    }
}

// ============================================================================
// Resource handles
// ============================================================================

/// Payload of a resource handle. Only unit builders look inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleValue {
    /// What the handle refers to (vpc, security_group, bucket, ...)
    pub kind: String,

    /// Backend identifier
    pub id: String,

    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

/// Opaque, shared reference to something a unit created.
///
/// Cloning shares the same allocation, so a dependent receives the very
/// handle its dependency produced; [`ResourceHandle::same_as`] observes that.
#[derive(Debug, Clone)]
pub struct ResourceHandle(Arc<HandleValue>);

impl ResourceHandle {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::from_value(HandleValue {
            kind: kind.into(),
            id: id.into(),
            attributes: IndexMap::new(),
        })
    }

    pub fn from_value(value: HandleValue) -> Self {
        Self(Arc::new(value))
    }

    /// Attach an attribute. Only valid before the handle is shared.
    pub fn with_attribute(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.0);
        inner.attributes.insert(key.into(), value.into());
        Self(Arc::new(inner))
    }

    pub fn kind(&self) -> &str {
        &self.0.kind
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn value(&self) -> &HandleValue {
        &self.0
    }

    /// Identity comparison: true only for clones of the same handle.
    pub fn same_as(&self, other: &ResourceHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ResourceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ResourceHandle {}

impl Serialize for ResourceHandle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceHandle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        HandleValue::deserialize(deserializer).map(Self::from_value)
    }
}

/// Handles published by one unit, keyed by handle name.
pub type HandleMap = IndexMap<String, ResourceHandle>;

/// Address of a handle: `(producing unit, handle name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleRef {
    pub unit: String,
    pub handle: String,
}

impl HandleRef {
    pub fn new(unit: &str, handle: &str) -> Self {
        Self {
            unit: unit.to_string(),
            handle: handle.to_string(),
        }
    }
}

impl fmt::Display for HandleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.unit, self.handle)
    }
}

// ============================================================================
// Execution plan
// ============================================================================

/// Explicit ordering edge: `before` must exist before `after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingEdge {
    pub before: String,
    pub after: String,
}

/// Dependency-respecting order in which enabled units are instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Unit names, dependencies first
    pub order: Vec<String>,

    /// Edges among enabled units, in plan order of the dependent
    pub edges: Vec<OrderingEdge>,

    /// Groups of mutually independent units; each depends only on earlier waves
    pub waves: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.order.iter().any(|u| u == unit)
    }

    /// Position of a unit in the plan.
    pub fn position(&self, unit: &str) -> Option<usize> {
        self.order.iter().position(|u| u == unit)
    }

    /// Order in which destruction should be attempted.
    pub fn teardown_order(&self) -> Vec<String> {
        self.order.iter().rev().cloned().collect()
    }
}

// ============================================================================
// Run lock
// ============================================================================

/// Persisted record of the last successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLock {
    /// Schema version
    pub schema: String,

    /// Stack name
    pub stack: String,

    /// Run identifier
    pub run_id: String,

    /// When the lock was generated
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// BLAKE3 fingerprint of the configuration
    pub config_hash: String,

    /// Execution order of the run
    pub order: Vec<String>,

    /// Ordering edges for teardown tooling
    #[serde(default)]
    pub edges: Vec<OrderingEdge>,

    /// Per-unit state, in plan order
    pub units: IndexMap<String, UnitLock>,
}

/// Per-unit lock entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitLock {
    pub category: Category,

    /// BLAKE3 hash of the unit's category configuration
    pub hash: String,

    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// Handles the unit published
    #[serde(default)]
    pub handles: HandleMap,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    RunStarted {
        stack: String,
        run_id: String,
        version: String,
        config_hash: String,
        plan: Vec<String>,
    },
    UnitStarted {
        run_id: String,
        unit: String,
    },
    UnitCompleted {
        run_id: String,
        unit: String,
        handles: Vec<String>,
        duration_seconds: f64,
    },
    UnitFailed {
        run_id: String,
        unit: String,
        error: String,
    },
    RunCompleted {
        run_id: String,
        units: u32,
        total_seconds: f64,
    },
    RunFailed {
        run_id: String,
        stage: String,
        unit: Option<String>,
        completed: Vec<String>,
        error: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

// ============================================================================
// Tests
// ============================================================================
