#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PosterError {
    #[error("API key is missing. Please select an API key.")]
    MissingCredential,
    #[error("Please upload images or provide team names.")]
    EmptyInput,
    #[error("Gemini request failed: {0}")]
    Transport(String),
    #[error("Gemini request failed with status {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("No image data found in response (model: {model})")]
    NoImageInResponse { model: String },
    #[error("Failed to read image: {0}")]
    FileRead(String),
    #[error("A poster request is already running")]
    RequestInFlight,
    #[error("There is no generated poster to edit yet")]
    NoArtifact,
    #[error("The session was reset before the poster arrived")]
    SessionReset,
}

impl PosterError {
    /// Endpoint-side failures that share one user-facing notice.
    pub fn is_transport_or_auth(&self) -> bool {
        matches!(
            self,
            PosterError::Transport(_) | PosterError::Api { .. } | PosterError::NoImageInResponse { .. }
        )
    }
}

impl From<std::io::Error> for PosterError {
    fn from(err: std::io::Error) -> Self {
        PosterError::FileRead(err.to_string())
    }
}

pub type PosterResult<T> = std::result::Result<T, PosterError>;
