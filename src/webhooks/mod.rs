//! Inbound webhook authentication and classification.

pub mod events;
pub mod signing;

pub use events::{classify, MalformedPayload, PaymentEvent, PaymentRecord};
pub use signing::{SecretPolicy, SignatureVerifier};
