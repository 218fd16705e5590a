//! `companyhub-events`: outbound notifications of committed mutations.
//!
//! Transport-agnostic: the Kafka writer lives in `companyhub-infra`, tests use
//! [`RecordingWriter`].

pub mod balancer;
pub mod error;
pub mod event;
pub mod in_memory_writer;
pub mod key_template;
pub mod message;
pub mod publisher;
pub mod queue;
pub mod sasl;
pub mod writer;

pub use balancer::{Balancer, LeastBytes};
pub use error::{PublishError, SetupError};
pub use event::{EventKind, OutboundEvent};
pub use in_memory_writer::RecordingWriter;
pub use key_template::{KeyTemplate, TemplateError};
pub use message::WireMessage;
pub use publisher::EventPublisher;
pub use queue::{Backpressure, EventNotifier, PublishQueue, QueueConfig};
pub use sasl::{SaslMechanism, ScramAlgorithm};
pub use writer::{MessageWriter, TransportError};
