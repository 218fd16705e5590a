//! Kafka-backed message writer.
//!
//! - **One producer** per process, shared by every publish (librdkafka is
//!   thread-safe; no external locking)
//! - **Keyed messages** are placed by librdkafka's `murmur2_random` key hash
//! - **Keyless messages** are placed by [`LeastBytes`] over the topic's
//!   partitions (fetched once, lazily)
//! - **Best-effort**: one attempt, bounded by `message.timeout.ms`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::sync::OnceCell;
use tracing::instrument;

use companyhub_events::{
    Balancer, EventPublisher, KeyTemplate, LeastBytes, MessageWriter, SaslMechanism,
    ScramAlgorithm, SetupError, TransportError, WireMessage,
};

use crate::config::KafkaConfig;

const CLIENT_ID: &str = "companyhub";
const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the publisher from configuration.
///
/// No brokers means publishing is disabled. Authentication settings and the
/// key template are validated here so misconfiguration fails at start.
pub fn setup(config: &KafkaConfig) -> Result<EventPublisher, SetupError> {
    if config.brokers.is_empty() {
        tracing::info!("kafka: no brokers specified, publishing disabled");
        return Ok(EventPublisher::disabled());
    }

    let sasl = SaslMechanism::from_settings(
        &config.mechanism,
        &config.algorithm,
        &config.username,
        &config.password,
    )?;
    let key_template = KeyTemplate::parse(&config.event_key_template)?;
    let writer = KafkaWriter::new(config, sasl.as_ref())?;

    tracing::info!(
        brokers = ?config.brokers,
        topic = %config.topic,
        event_key = %config.event_key_template,
        tls = config.tls,
        sasl = sasl.is_some(),
        "kafka: setup finished"
    );

    Ok(EventPublisher::new(Arc::new(writer), key_template))
}

/// librdkafka settings for the producer.
pub fn client_config(config: &KafkaConfig, sasl: Option<&SaslMechanism>) -> ClientConfig {
    let mut cc = ClientConfig::new();
    cc.set("bootstrap.servers", config.brokers.join(","))
        .set("client.id", CLIENT_ID)
        .set("partitioner", "murmur2_random")
        .set(
            "message.timeout.ms",
            config.message_timeout().as_millis().to_string(),
        );

    let protocol = match (config.tls, sasl.is_some()) {
        (false, false) => "PLAINTEXT",
        (true, false) => "SSL",
        (false, true) => "SASL_PLAINTEXT",
        (true, true) => "SASL_SSL",
    };
    cc.set("security.protocol", protocol);

    if let Some(sasl) = sasl {
        let mechanism = match sasl {
            SaslMechanism::Plain { .. } => "PLAIN",
            SaslMechanism::Scram {
                algorithm: ScramAlgorithm::Sha256,
                ..
            } => "SCRAM-SHA-256",
            SaslMechanism::Scram {
                algorithm: ScramAlgorithm::Sha512,
                ..
            } => "SCRAM-SHA-512",
        };
        cc.set("sasl.mechanisms", mechanism)
            .set("sasl.username", sasl.username())
            .set("sasl.password", sasl.password());
    }

    cc
}

pub struct KafkaWriter {
    producer: FutureProducer,
    topic: String,
    balancer: LeastBytes,
    partitions: OnceCell<Vec<i32>>,
    message_timeout: Duration,
}

impl core::fmt::Debug for KafkaWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KafkaWriter")
            .field("topic", &self.topic)
            .field("partitions", &self.partitions.get())
            .finish_non_exhaustive()
    }
}

impl KafkaWriter {
    pub fn new(config: &KafkaConfig, sasl: Option<&SaslMechanism>) -> Result<Self, SetupError> {
        let producer: FutureProducer = client_config(config, sasl)
            .create()
            .map_err(|e| SetupError::Client(e.to_string()))?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            balancer: LeastBytes::new(),
            partitions: OnceCell::new(),
            message_timeout: config.message_timeout(),
        })
    }

    async fn partitions(&self) -> Result<&[i32], TransportError> {
        let partitions = self
            .partitions
            .get_or_try_init(|| async {
                let producer = self.producer.clone();
                let topic = self.topic.clone();
                tokio::task::spawn_blocking(move || fetch_partitions(&producer, &topic))
                    .await
                    .map_err(|e| TransportError::Broker(format!("metadata task: {e}")))?
            })
            .await?;
        Ok(partitions.as_slice())
    }
}

fn fetch_partitions(producer: &FutureProducer, topic: &str) -> Result<Vec<i32>, TransportError> {
    let metadata = producer
        .client()
        .fetch_metadata(Some(topic), Timeout::After(METADATA_TIMEOUT))
        .map_err(|e| TransportError::Broker(format!("fetch metadata: {e}")))?;

    let partitions: Vec<i32> = metadata
        .topics()
        .iter()
        .filter(|t| t.name() == topic)
        .flat_map(|t| t.partitions().iter().map(|p| p.id()))
        .collect();

    if partitions.is_empty() {
        return Err(TransportError::NoPartitions(topic.to_string()));
    }
    Ok(partitions)
}

fn map_kafka_error(err: KafkaError) -> TransportError {
    match err {
        KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut) => TransportError::Timeout,
        other => TransportError::Broker(other.to_string()),
    }
}

#[async_trait]
impl MessageWriter for KafkaWriter {
    #[instrument(skip(self, message), fields(topic = %self.topic, bytes = message.size()), err)]
    async fn write(&self, message: WireMessage) -> Result<(), TransportError> {
        let mut record: FutureRecord<'_, [u8], [u8]> =
            FutureRecord::to(&self.topic).payload(message.value.as_slice());

        match &message.key {
            Some(key) => record = record.key(key.as_slice()),
            None => {
                let partitions = self.partitions().await?;
                let partition = self
                    .balancer
                    .balance(&message, partitions)
                    .ok_or_else(|| TransportError::NoPartitions(self.topic.clone()))?;
                record = record.partition(partition);
            }
        }

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.message_timeout))
            .await
            .map_err(|(err, _message)| map_kafka_error(err))?;

        tracing::debug!(partition, offset, "message delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kafka(brokers: &[&str]) -> KafkaConfig {
        KafkaConfig {
            brokers: brokers.iter().map(|b| b.to_string()).collect(),
            ..KafkaConfig::default()
        }
    }

    #[test]
    fn empty_brokers_disable_publishing() {
        let publisher = setup(&kafka(&[])).unwrap();
        assert!(!publisher.is_enabled());
    }

    #[test]
    fn scram_with_unknown_algorithm_fails_setup() {
        let mut c = kafka(&["localhost:9092"]);
        c.username = "u".into();
        c.password = "p".into();
        c.mechanism = "SCRAM".into();
        c.algorithm = "MD5".into();
        assert_eq!(
            setup(&c).unwrap_err(),
            SetupError::UnknownAlgorithm("MD5".into())
        );
    }

    #[test]
    fn unknown_mechanism_fails_setup() {
        let mut c = kafka(&["localhost:9092"]);
        c.username = "u".into();
        c.mechanism = "OAUTHBEARER".into();
        assert!(matches!(setup(&c), Err(SetupError::UnknownMechanism(_))));
    }

    #[test]
    fn bad_key_template_fails_setup() {
        let mut c = kafka(&["localhost:9092"]);
        c.event_key_template = "company.{{.Tenant}}".into();
        assert!(matches!(setup(&c), Err(SetupError::KeyTemplate(_))));
    }

    #[test]
    fn plaintext_without_credentials() {
        let cc = client_config(&kafka(&["a:9092", "b:9092"]), None);
        assert_eq!(cc.get("bootstrap.servers"), Some("a:9092,b:9092"));
        assert_eq!(cc.get("security.protocol"), Some("PLAINTEXT"));
        assert_eq!(cc.get("sasl.mechanisms"), None);
        assert_eq!(cc.get("message.timeout.ms"), Some("30000"));
    }

    #[test]
    fn sasl_settings_map_to_librdkafka_names() {
        let mut c = kafka(&["a:9092"]);
        c.tls = true;
        let sasl = SaslMechanism::from_settings("SCRAM", "SHA256", "u", "p").unwrap();
        let cc = client_config(&c, sasl.as_ref());
        assert_eq!(cc.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(cc.get("sasl.mechanisms"), Some("SCRAM-SHA-256"));
        assert_eq!(cc.get("sasl.username"), Some("u"));

        c.tls = false;
        let plain = SaslMechanism::from_settings("PLAIN", "", "u", "p").unwrap();
        let cc = client_config(&c, plain.as_ref());
        assert_eq!(cc.get("security.protocol"), Some("SASL_PLAINTEXT"));
        assert_eq!(cc.get("sasl.mechanisms"), Some("PLAIN"));
    }
}
