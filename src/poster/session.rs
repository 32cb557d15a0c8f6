use crate::error::{PosterError, PosterResult};
use crate::poster::prompt::{build_prompt, PromptSelection};
use crate::poster::types::{
    AspectRatio, CompositionVariant, GeneratedArtifact, ImageResolution, OutputSpec, Side,
    SourceImage, StyleVariant,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionDefaults {
    pub composition: CompositionVariant,
    pub style: StyleVariant,
    pub output: OutputSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideInput {
    pub name: String,
    pub image: Option<SourceImage>,
}

impl SideInput {
    fn is_empty(&self) -> bool {
        self.name.trim().is_empty() && self.image.is_none()
    }
}

/// Everything the generation client needs, copied out of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image_a: Option<SourceImage>,
    pub image_b: Option<SourceImage>,
    pub output: OutputSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosterSession {
    side_a: SideInput,
    side_b: SideInput,
    pub composition: CompositionVariant,
    pub style: StyleVariant,
    pub output: OutputSpec,
    pub details: String,
    artifact: Option<GeneratedArtifact>,
    pub panel_message_id: Option<i32>,
    pub result_message_id: Option<i32>,
}

impl PosterSession {
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            side_a: SideInput::default(),
            side_b: SideInput::default(),
            composition: defaults.composition,
            style: defaults.style,
            output: defaults.output,
            details: String::new(),
            artifact: None,
            panel_message_id: None,
            result_message_id: None,
        }
    }

    pub fn side(&self, side: Side) -> &SideInput {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideInput {
        match side {
            Side::A => &mut self.side_a,
            Side::B => &mut self.side_b,
        }
    }

    pub fn set_name(&mut self, side: Side, name: &str) {
        self.side_mut(side).name = name.to_string();
    }

    pub fn set_image(&mut self, side: Side, image: SourceImage) {
        self.side_mut(side).image = Some(image);
    }

    /// First side whose upload slot is still empty, A before B.
    pub fn first_empty_slot(&self) -> Option<Side> {
        Side::ALL
            .into_iter()
            .find(|side| self.side(*side).image.is_none())
    }

    pub fn set_details(&mut self, details: &str) {
        self.details = details.to_string();
    }

    pub fn select_composition(&mut self, composition: CompositionVariant) {
        self.composition = composition;
    }

    pub fn select_style(&mut self, style: StyleVariant) {
        self.style = style;
    }

    pub fn select_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.output.aspect_ratio = aspect_ratio;
    }

    pub fn select_resolution(&mut self, resolution: ImageResolution) {
        self.output.resolution = resolution;
    }

    pub fn has_any_input(&self) -> bool {
        !self.side_a.is_empty() || !self.side_b.is_empty()
    }

    pub fn prompt(&self) -> String {
        build_prompt(&PromptSelection {
            subject_a: &self.side_a.name,
            subject_b: &self.side_b.name,
            composition: self.composition,
            style: self.style,
            free_text: &self.details,
        })
    }

    pub fn generation_request(&self) -> PosterResult<GenerationRequest> {
        if !self.has_any_input() {
            return Err(PosterError::EmptyInput);
        }
        Ok(GenerationRequest {
            prompt: self.prompt(),
            image_a: self.side_a.image.clone(),
            image_b: self.side_b.image.clone(),
            output: self.output,
        })
    }

    pub fn artifact(&self) -> Option<&GeneratedArtifact> {
        self.artifact.as_ref()
    }

    /// Replaces the current artifact wholesale; there is no history.
    pub fn apply_artifact(&mut self, artifact: GeneratedArtifact) {
        self.artifact = Some(artifact);
    }

    pub fn dismiss_artifact(&mut self) -> Option<GeneratedArtifact> {
        self.artifact.take()
    }
}

impl Default for PosterSession {
    fn default() -> Self {
        Self::new(SessionDefaults::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_image() -> SourceImage {
        SourceImage {
            data: "iVBORw0KGgoAAAANSUhEUg".to_string(),
            mime_type: "image/png",
        }
    }

    #[test]
    fn starts_with_defaults() {
        let session = PosterSession::default();
        assert_eq!(session.composition, CompositionVariant::DiagonalSplit);
        assert_eq!(session.style, StyleVariant::Broadcast3d);
        assert_eq!(session.output, OutputSpec::default());
        assert!(session.artifact().is_none());
        assert!(!session.has_any_input());
    }

    #[test]
    fn refuses_generation_without_input() {
        let mut session = PosterSession::default();
        session.set_details("rainy weather");
        session.set_name(Side::A, "   ");
        assert_eq!(session.generation_request(), Err(PosterError::EmptyInput));
    }

    #[test]
    fn names_alone_are_enough() {
        let mut session = PosterSession::default();
        session.set_name(Side::B, "Barcelona");
        let request = session.generation_request().unwrap();
        assert!(request.prompt.contains("between Home Team and Barcelona"));
        assert!(request.image_a.is_none());
        assert!(request.image_b.is_none());
    }

    #[test]
    fn images_alone_are_enough_and_are_copied() {
        let mut session = PosterSession::default();
        session.set_image(Side::B, png_image());
        session.select_aspect_ratio(AspectRatio::Landscape16x9);
        session.select_resolution(ImageResolution::Res4k);

        let request = session.generation_request().unwrap();
        assert_eq!(request.image_b, Some(png_image()));
        assert_eq!(request.output.aspect_ratio, AspectRatio::Landscape16x9);
        assert_eq!(request.output.resolution, ImageResolution::Res4k);

        session.set_image(
            Side::B,
            SourceImage {
                data: "/9j/4AAQ".into(),
                mime_type: "image/jpeg",
            },
        );
        assert_eq!(request.image_b, Some(png_image()));
    }

    #[test]
    fn selections_flow_into_prompt() {
        let mut session = PosterSession::default();
        session.set_name(Side::A, "Chelsea");
        session.set_name(Side::B, "Barcelona");
        session.select_composition(CompositionVariant::TopBottom);
        session.select_style(StyleVariant::MinimalistFlat);
        session.set_details("red smoke");

        let prompt = session.prompt();
        assert!(prompt.contains("Top half for Chelsea, bottom half for Barcelona."));
        assert!(prompt.contains("Clean minimalist vector art style."));
        assert!(prompt.ends_with("Additional details: red smoke"));
    }

    #[test]
    fn upload_slots_fill_in_order() {
        let mut session = PosterSession::default();
        assert_eq!(session.first_empty_slot(), Some(Side::A));
        session.set_image(Side::A, png_image());
        assert_eq!(session.first_empty_slot(), Some(Side::B));
        session.set_image(Side::B, png_image());
        assert_eq!(session.first_empty_slot(), None);
    }

    #[test]
    fn artifacts_are_replaced_not_stacked() {
        let mut session = PosterSession::default();
        session.apply_artifact(GeneratedArtifact::new("data:image/png;base64,AAA".into(), "first".into()));
        session.apply_artifact(GeneratedArtifact::new("data:image/png;base64,BBB".into(), "add rain".into()));
        assert_eq!(session.artifact().unwrap().image_uri, "data:image/png;base64,BBB");

        let dismissed = session.dismiss_artifact().unwrap();
        assert_eq!(dismissed.prompt, "add rain");
        assert!(session.artifact().is_none());
    }
}
