use envconfig::Envconfig;
use kchan_admin::AdminConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct ControllerConfig {
    #[envconfig(from = "KCHAN_PROFILE", default = "dev")]
    pub profile: String,

    /// Namespace where dispatcher workloads live
    #[envconfig(from = "KCHAN_SYSTEM_NAMESPACE", default = "knative-eventing")]
    pub system_namespace: String,

    /// memory | strimzi (profile default: memory in dev, strimzi in full)
    /// Env: KCHAN_ADMIN_BACKEND
    #[envconfig(from = "KCHAN_ADMIN_BACKEND")]
    pub admin_backend: Option<String>,

    /// ConfigMap in the system namespace carrying admin overrides
    #[envconfig(from = "KCHAN_CONFIG_MAP", default = "config-kafka")]
    pub config_map: String,

    /// Delay before a failed attempt is retried.
    #[envconfig(from = "KCHAN_REQUEUE_SECS", default = "30")]
    pub requeue_secs: u64,

    #[envconfig(nested)]
    pub dispatcher: DispatcherConfig,

    #[envconfig(nested)]
    pub topic: TopicDefaultsConfig,

    #[envconfig(nested)]
    pub admin: AdminConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct DispatcherConfig {
    #[envconfig(
        from = "KCHAN_DISPATCHER_IMAGE",
        default = "ghcr.io/knative-extensions/eventing-kafka/dispatcher:latest"
    )]
    pub image: String,
    #[envconfig(from = "KCHAN_DISPATCHER_REPLICAS", default = "1")]
    pub replicas: i32,
}

#[derive(Envconfig, Clone, Debug)]
pub struct TopicDefaultsConfig {
    #[envconfig(from = "KCHAN_DEFAULT_NUM_PARTITIONS", default = "4")]
    pub num_partitions: i32,
    #[envconfig(from = "KCHAN_DEFAULT_REPLICATION_FACTOR", default = "1")]
    pub replication_factor: i16,
    /// 7 days
    #[envconfig(from = "KCHAN_DEFAULT_RETENTION_MILLIS", default = "604800000")]
    pub retention_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminBackend {
    Memory,
    Strimzi,
}

impl std::str::FromStr for AdminBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(AdminBackend::Memory),
            "strimzi" | "kubernetes" | "k8s" => Ok(AdminBackend::Strimzi),
            other => Err(format!("unknown admin backend {:?}", other)),
        }
    }
}

impl std::fmt::Display for AdminBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminBackend::Memory => write!(f, "memory"),
            AdminBackend::Strimzi => write!(f, "strimzi"),
        }
    }
}

impl ControllerConfig {
    /// Apply profile → defaults mapping, while respecting explicit env overrides.
    ///
    /// - dev: admin_backend=memory
    /// - full: admin_backend=strimzi
    pub fn apply_profile_defaults(mut self) -> Self {
        let def_backend = match self.profile.as_str() {
            "full" | "prod" | "production" => AdminBackend::Strimzi,
            _ /* dev */ => AdminBackend::Memory,
        };
        if self.admin_backend.is_none() {
            self.admin_backend = Some(def_backend.to_string());
        }
        self
    }

    pub fn backend(&self) -> AdminBackend {
        self.admin_backend
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(AdminBackend::Memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(profile: &str) -> ControllerConfig {
        ControllerConfig {
            profile: profile.to_string(),
            system_namespace: "knative-eventing".into(),
            admin_backend: None,
            config_map: "config-kafka".into(),
            requeue_secs: 30,
            dispatcher: DispatcherConfig {
                image: "dispatcher:test".into(),
                replicas: 1,
            },
            topic: TopicDefaultsConfig {
                num_partitions: 4,
                replication_factor: 1,
                retention_ms: 604_800_000,
            },
            admin: AdminConfig::default(),
        }
    }

    #[test]
    fn profile_defaults_dev() {
        let cfg = base("dev").apply_profile_defaults();
        assert_eq!(cfg.backend(), AdminBackend::Memory);
    }

    #[test]
    fn profile_defaults_full() {
        for p in ["full", "prod", "production"] {
            let cfg = base(p).apply_profile_defaults();
            assert_eq!(cfg.backend(), AdminBackend::Strimzi);
        }
    }

    #[test]
    fn profile_defaults_respect_env_overrides() {
        let mut cfg = base("full");
        cfg.admin_backend = Some("memory".into());
        let cfg = cfg.apply_profile_defaults();
        assert_eq!(cfg.backend(), AdminBackend::Memory);
    }

    #[test]
    fn backend_parses_aliases_and_falls_back_to_memory() {
        assert_eq!("Strimzi".parse::<AdminBackend>(), Ok(AdminBackend::Strimzi));
        assert_eq!(" k8s ".parse::<AdminBackend>(), Ok(AdminBackend::Strimzi));
        assert_eq!("memory".parse::<AdminBackend>(), Ok(AdminBackend::Memory));
        assert!("kafka".parse::<AdminBackend>().is_err());

        let mut cfg = base("dev");
        cfg.admin_backend = Some("kafka".into());
        assert_eq!(cfg.backend(), AdminBackend::Memory);
    }
}
