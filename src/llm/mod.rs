pub mod gemini;
pub mod key_gate;

pub use gemini::{GeminiImageClient, GeminiSettings};
pub use key_gate::{ApiKeyCell, CredentialHost, EnvCredentialHost, KeyGate, MissingHostPolicy};
