//! Kafka, topic and consumer-group configuration.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::EventError;
use crate::operation::Operation;

/// Default client identifier for producers and consumers.
pub const DEFAULT_CLIENT_ID: &str = "vex-provisioner";

/// Default consumer group shared by all dispatcher replicas.
pub const DEFAULT_CONSUMER_GROUP: &str = "vex-provisioner";

/// Default capacity of a partition claim's message channel.
pub const DEFAULT_CLAIM_BUFFER: usize = 256;

/// Default bound on the first group join at startup.
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 60;

fn required(var: &str) -> Result<String, EventError> {
    env::var(var).map_err(|_| EventError::ConfigMissing {
        var: var.to_string(),
    })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, EventError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(EventError::ConfigInvalid {
            var: var.to_string(),
            reason: format!("not a boolean: {other}"),
        }),
    }
}

/// Security protocol for the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl FromStr for SecurityProtocol {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PLAINTEXT" => Ok(Self::Plaintext),
            "SSL" => Ok(Self::Ssl),
            "SASL_PLAINTEXT" => Ok(Self::SaslPlaintext),
            "SASL_SSL" => Ok(Self::SaslSsl),
            _ => Err(EventError::ConfigInvalid {
                var: "KAFKA_SECURITY_PROTOCOL".to_string(),
                reason: format!("Unknown protocol: {s}"),
            }),
        }
    }
}

impl SecurityProtocol {
    /// librdkafka `security.protocol` value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }

    #[must_use]
    pub fn uses_sasl(&self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

/// SASL mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl FromStr for SaslMechanism {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM_SHA_256" => Ok(Self::ScramSha256),
            "SCRAM_SHA_512" => Ok(Self::ScramSha512),
            _ => Err(EventError::ConfigInvalid {
                var: "KAFKA_SASL_MECHANISM".to_string(),
                reason: format!("Unknown mechanism: {s}"),
            }),
        }
    }
}

impl SaslMechanism {
    /// librdkafka `sasl.mechanism` value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

/// SASL credentials.
#[derive(Clone)]
pub struct SaslCredentials {
    pub mechanism: SaslMechanism,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Broker connection settings shared by the producer and the consumer group.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated broker list.
    pub bootstrap_servers: String,
    pub security_protocol: SecurityProtocol,
    /// Present whenever the protocol uses SASL.
    pub sasl: Option<SaslCredentials>,
    pub client_id: String,
}

impl KafkaConfig {
    /// Load from the environment.
    ///
    /// Required:
    /// - `KAFKA_BOOTSTRAP_SERVERS`
    ///
    /// Optional:
    /// - `KAFKA_SECURITY_PROTOCOL`: PLAINTEXT (default), SSL, `SASL_PLAINTEXT`, `SASL_SSL`
    /// - `KAFKA_CLIENT_ID`: default `vex-provisioner`
    /// - `KAFKA_SASL_MECHANISM`, `KAFKA_SASL_USERNAME`, `KAFKA_SASL_PASSWORD`: required with SASL
    pub fn from_env() -> Result<Self, EventError> {
        let bootstrap_servers = required("KAFKA_BOOTSTRAP_SERVERS")?;

        let security_protocol = match env::var("KAFKA_SECURITY_PROTOCOL") {
            Ok(v) => v.parse()?,
            Err(_) => SecurityProtocol::Plaintext,
        };

        let client_id =
            env::var("KAFKA_CLIENT_ID").unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string());

        let sasl = if security_protocol.uses_sasl() {
            Some(SaslCredentials {
                mechanism: required("KAFKA_SASL_MECHANISM")?.parse()?,
                username: required("KAFKA_SASL_USERNAME")?,
                password: required("KAFKA_SASL_PASSWORD")?,
            })
        } else {
            None
        };

        Ok(Self {
            bootstrap_servers,
            security_protocol,
            sasl,
            client_id,
        })
    }

    #[must_use]
    pub fn builder() -> KafkaConfigBuilder {
        KafkaConfigBuilder::new()
    }

    /// Base rdkafka client settings: brokers, client id, security.
    #[cfg(feature = "kafka")]
    pub(crate) fn client_config(&self) -> rdkafka::config::ClientConfig {
        let mut client_config = rdkafka::config::ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id)
            .set("security.protocol", self.security_protocol.as_str());

        if let Some(sasl) = &self.sasl {
            client_config
                .set("sasl.mechanism", sasl.mechanism.as_str())
                .set("sasl.username", &sasl.username)
                .set("sasl.password", &sasl.password);
        }
        client_config
    }
}

/// Builder for [`KafkaConfig`].
#[derive(Debug, Default)]
pub struct KafkaConfigBuilder {
    bootstrap_servers: Option<String>,
    security_protocol: Option<SecurityProtocol>,
    sasl: Option<SaslCredentials>,
    client_id: Option<String>,
}

impl KafkaConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bootstrap_servers(mut self, servers: impl Into<String>) -> Self {
        self.bootstrap_servers = Some(servers.into());
        self
    }

    #[must_use]
    pub fn security_protocol(mut self, protocol: SecurityProtocol) -> Self {
        self.security_protocol = Some(protocol);
        self
    }

    #[must_use]
    pub fn sasl(
        mut self,
        mechanism: SaslMechanism,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.sasl = Some(SaslCredentials {
            mechanism,
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn build(self) -> Result<KafkaConfig, EventError> {
        let bootstrap_servers = self.bootstrap_servers.ok_or(EventError::ConfigMissing {
            var: "bootstrap_servers".to_string(),
        })?;

        let security_protocol = self
            .security_protocol
            .unwrap_or(SecurityProtocol::Plaintext);

        if security_protocol.uses_sasl() && self.sasl.is_none() {
            return Err(EventError::ConfigMissing {
                var: "sasl_credentials".to_string(),
            });
        }

        Ok(KafkaConfig {
            bootstrap_servers,
            security_protocol,
            sasl: self.sasl,
            client_id: self
                .client_id
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
        })
    }
}

/// Physical topic names for the six provisioning operations.
///
/// Names are configuration only; routing keys off whatever name is bound to
/// an operation here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    pub provision_project: String,
    pub deprovision_project: String,
    pub provision_token: String,
    pub deprovision_token: String,
    pub provision_flag: String,
    pub deprovision_flag: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            provision_project: "vex-provision".to_string(),
            deprovision_project: "vex-deprovision".to_string(),
            provision_token: "vex-provision-token".to_string(),
            deprovision_token: "vex-deprovision-token".to_string(),
            provision_flag: "vex-provision-flag".to_string(),
            deprovision_flag: "vex-deprovision-flag".to_string(),
        }
    }
}

impl TopicConfig {
    /// Environment variable naming the topic of an operation.
    #[must_use]
    pub fn env_var(operation: Operation) -> &'static str {
        match operation {
            Operation::ProvisionProject => "TOPIC_PROVISION_PROJECT",
            Operation::DeprovisionProject => "TOPIC_DEPROVISION_PROJECT",
            Operation::ProvisionToken => "TOPIC_PROVISION_TOKEN",
            Operation::DeprovisionToken => "TOPIC_DEPROVISION_TOKEN",
            Operation::ProvisionFlag => "TOPIC_PROVISION_FLAG",
            Operation::DeprovisionFlag => "TOPIC_DEPROVISION_FLAG",
        }
    }

    /// Load topic names, falling back to the defaults per variable.
    pub fn from_env() -> Result<Self, EventError> {
        let mut topics = Self::default();
        for operation in Operation::ALL {
            let var = Self::env_var(operation);
            if let Ok(name) = env::var(var) {
                *topics.slot_mut(operation) = name;
            }
        }
        topics.validate()?;
        Ok(topics)
    }

    /// Topic bound to an operation.
    #[must_use]
    pub fn topic_for(&self, operation: Operation) -> &str {
        match operation {
            Operation::ProvisionProject => &self.provision_project,
            Operation::DeprovisionProject => &self.deprovision_project,
            Operation::ProvisionToken => &self.provision_token,
            Operation::DeprovisionToken => &self.deprovision_token,
            Operation::ProvisionFlag => &self.provision_flag,
            Operation::DeprovisionFlag => &self.deprovision_flag,
        }
    }

    fn slot_mut(&mut self, operation: Operation) -> &mut String {
        match operation {
            Operation::ProvisionProject => &mut self.provision_project,
            Operation::DeprovisionProject => &mut self.deprovision_project,
            Operation::ProvisionToken => &mut self.provision_token,
            Operation::DeprovisionToken => &mut self.deprovision_token,
            Operation::ProvisionFlag => &mut self.provision_flag,
            Operation::DeprovisionFlag => &mut self.deprovision_flag,
        }
    }

    /// All topic names, in [`Operation::ALL`] order.
    #[must_use]
    pub fn all(&self) -> Vec<&str> {
        Operation::ALL.iter().map(|op| self.topic_for(*op)).collect()
    }

    /// Names must be non-empty and pairwise distinct.
    pub fn validate(&self) -> Result<(), EventError> {
        let mut seen = std::collections::HashSet::new();
        for operation in Operation::ALL {
            let name = self.topic_for(operation);
            let var = Self::env_var(operation);
            if name.trim().is_empty() {
                return Err(EventError::ConfigInvalid {
                    var: var.to_string(),
                    reason: "topic name must not be empty".to_string(),
                });
            }
            if !seen.insert(name) {
                return Err(EventError::ConfigInvalid {
                    var: var.to_string(),
                    reason: format!("topic {name} is bound to more than one operation"),
                });
            }
        }
        Ok(())
    }
}

/// Consumer-group settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Stable group identity shared by every replica.
    pub group: String,
    /// Acknowledge messages without invoking handlers.
    pub dry_run: bool,
    /// Capacity of each partition claim's channel.
    pub claim_buffer: usize,
    /// How long startup waits for the first group join.
    pub join_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_CONSUMER_GROUP.to_string(),
            dry_run: false,
            claim_buffer: DEFAULT_CLAIM_BUFFER,
            join_timeout: Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS),
        }
    }
}

impl ConsumerConfig {
    /// Load from `KAFKA_CONSUMER_GROUP`, `SKIP_PROVISION`, `KAFKA_CLAIM_BUFFER`
    /// and `KAFKA_JOIN_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, EventError> {
        let mut config = Self::default();

        if let Ok(group) = env::var("KAFKA_CONSUMER_GROUP") {
            config.group = group;
        }
        if let Ok(raw) = env::var("SKIP_PROVISION") {
            config.dry_run = parse_bool("SKIP_PROVISION", &raw)?;
        }
        if let Ok(raw) = env::var("KAFKA_CLAIM_BUFFER") {
            config.claim_buffer = raw.parse().map_err(|_| EventError::ConfigInvalid {
                var: "KAFKA_CLAIM_BUFFER".to_string(),
                reason: format!("not a positive integer: {raw}"),
            })?;
        }
        if let Ok(raw) = env::var("KAFKA_JOIN_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| EventError::ConfigInvalid {
                var: "KAFKA_JOIN_TIMEOUT_SECS".to_string(),
                reason: format!("not a positive integer: {raw}"),
            })?;
            config.join_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EventError> {
        if self.group.trim().is_empty() {
            return Err(EventError::ConfigInvalid {
                var: "KAFKA_CONSUMER_GROUP".to_string(),
                reason: "group must not be empty".to_string(),
            });
        }
        if self.claim_buffer == 0 {
            return Err(EventError::ConfigInvalid {
                var: "KAFKA_CLAIM_BUFFER".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.join_timeout.is_zero() {
            return Err(EventError::ConfigInvalid {
                var: "KAFKA_JOIN_TIMEOUT_SECS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
