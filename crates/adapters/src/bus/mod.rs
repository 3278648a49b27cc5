//! Message bus adapters.

mod in_memory;
mod service_bus;
mod sqs_sns;

pub use in_memory::InMemoryMessageAdapter;
pub use service_bus::ServiceBusAdapter;
pub use sqs_sns::SqsSnsAdapter;
