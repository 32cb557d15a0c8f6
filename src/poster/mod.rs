pub mod encoder;
pub mod prompt;
pub mod session;
pub mod types;

pub use session::{GenerationRequest, PosterSession, SessionDefaults};
pub use types::{
    AspectRatio, CompositionVariant, GeneratedArtifact, ImageResolution, OutputSpec, Side,
    SourceImage, StyleVariant,
};
