use std::collections::BTreeMap;

use envconfig::Envconfig;

use crate::error::AdminError;

pub const KEY_BROKERS: &str = "kafka.brokers";
pub const KEY_NAMESPACE: &str = "kafka.namespace";
pub const KEY_CLUSTER: &str = "kafka.cluster";
pub const KEY_SECRET_NAMESPACE: &str = "kafka.secretNamespace";

/// Broker/administrative settings used to open an admin connection.
#[derive(Envconfig, Clone, Debug, PartialEq, Eq)]
pub struct AdminConfig {
    /// Comma-separated bootstrap servers.
    #[envconfig(
        from = "KCHAN_KAFKA_BROKERS",
        default = "my-cluster-kafka-bootstrap.kafka:9092"
    )]
    pub brokers: String,

    /// Namespace holding the Kafka cluster and its topic objects
    #[envconfig(from = "KCHAN_KAFKA_NAMESPACE", default = "kafka")]
    pub kafka_namespace: String,

    #[envconfig(from = "KCHAN_KAFKA_CLUSTER", default = "my-cluster")]
    pub cluster_name: String,

    /// Namespace searched for labelled credential secrets
    #[envconfig(
        from = "KCHAN_KAFKA_SECRET_NAMESPACE",
        default = "knative-eventing"
    )]
    pub secret_namespace: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            brokers: "my-cluster-kafka-bootstrap.kafka:9092".into(),
            kafka_namespace: "kafka".into(),
            cluster_name: "my-cluster".into(),
            secret_namespace: "knative-eventing".into(),
        }
    }
}

impl AdminConfig {
    /// Overlay the keys found in a config map's data onto this snapshot.
    /// Keys that are absent keep their current value; unknown keys are ignored.
    pub fn with_overrides(
        &self,
        data: &BTreeMap<String, String>,
    ) -> Result<AdminConfig, AdminError> {
        let mut next = self.clone();
        if let Some(v) = data.get(KEY_BROKERS) {
            next.brokers = v.trim().to_string();
        }
        if let Some(v) = data.get(KEY_NAMESPACE) {
            next.kafka_namespace = v.trim().to_string();
        }
        if let Some(v) = data.get(KEY_CLUSTER) {
            next.cluster_name = v.trim().to_string();
        }
        if let Some(v) = data.get(KEY_SECRET_NAMESPACE) {
            next.secret_namespace = v.trim().to_string();
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        if self.brokers.is_empty() {
            return Err(AdminError::Config("brokers must not be empty".into()));
        }
        if self.kafka_namespace.is_empty() {
            return Err(AdminError::Config(
                "kafka namespace must not be empty".into(),
            ));
        }
        if self.secret_namespace.is_empty() {
            return Err(AdminError::Config(
                "secret namespace must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn broker_list(&self) -> Vec<&str> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn overrides_only_present_keys() {
        let base = AdminConfig::default();
        let next = base
            .with_overrides(&data(&[
                (KEY_BROKERS, "a:9092, b:9092"),
                ("unrelated", "x"),
            ]))
            .unwrap();
        assert_eq!(next.broker_list(), vec!["a:9092", "b:9092"]);
        assert_eq!(next.kafka_namespace, base.kafka_namespace);
        assert_eq!(next.secret_namespace, base.secret_namespace);
    }

    #[test]
    fn empty_brokers_rejected() {
        let err = AdminConfig::default()
            .with_overrides(&data(&[(KEY_BROKERS, "  ")]))
            .unwrap_err();
        assert!(matches!(err, AdminError::Config(_)));
    }
}
