//! Turns a poster selection into the instruction text sent to the image model.
//!
//! Composition and style clauses live in tables indexed by variant
//! discriminant, so a new variant without a clause fails to compile.

use crate::poster::types::{CompositionVariant, Side, StyleVariant};

const SUBJECT_A_PLACEHOLDER: &str = "{a}";
const SUBJECT_B_PLACEHOLDER: &str = "{b}";

const COMPOSITION_CLAUSES: [&str; CompositionVariant::COUNT] = [
    // DiagonalSplit
    "Use a dynamic diagonal split composition. Place {a} on the top-left/left and {b} on the bottom-right/right with contrasting color schemes. ",
    // FaceOff
    "Close-up profile side-view of both subjects staring intensely at each other (face-off), very close range. ",
    // DoubleExposure
    "Use an artistic double exposure effect, blending the players with their team crests or stadium backgrounds. ",
    // ActionCollage
    "A dynamic collage featuring full-body action shots of the players in motion with explosive energy effects. ",
    // CenterBurst
    "Place both subjects symmetrically around a central glowing energy source. ",
    // VFormation
    "Arrange the two subjects in a V-shape formation at the top, looking down towards the center. High angle perspective with dramatic lighting. ",
    // TopBottom
    "Split the design horizontally. Top half for {a}, bottom half for {b}. Distinct color separation and clean layout. ",
    // CrestBackdrop
    "Place the subjects prominently in the foreground. In the background, place massive, semi-transparent team crests/logos looming behind them for a grand scale effect. ",
];

const STYLE_CLAUSES: [&str; StyleVariant::COUNT] = [
    // RealisticStadium
    "Background should be a photorealistic stadium at night with floodlights, crowd atmosphere, and lens flares. Professional photography style. ",
    // CyberpunkNeon
    "Cyberpunk aesthetic with heavy neon blue and magenta lighting, glitch effects, rain, and futuristic UI elements. ",
    // UrbanGrunge
    "Gritty urban grunge style with concrete textures, smoke, ink splatters, high contrast, and dramatic shadows. ",
    // Broadcast3d
    "Premium TV broadcast graphics style. Shiny 3D metallic elements, glass textures, clean studio lighting, very polished. ",
    // ComicIllustration
    "Dynamic comic book or digital illustration style. Bold outlines, vibrant colors, expressive shading. ",
    // GoldLuxury
    "Luxury aesthetic. Black and Gold color palette, marble textures, golden particles, elegant lighting. ",
    // RetroVintage
    "90s football poster aesthetic. Grainy texture, vibrant geometric shapes, halftone patterns, VHS glitch effect, retro typography. ",
    // InkSplash
    "Artistic watercolor and ink splash style. Fluid liquid effects blending with the players, paint drips, expressive brush strokes. ",
    // PaperCollage
    "Mixed media paper collage style. Ripped paper edges, tape textures, layered paper cutouts, grunge overlay. ",
    // MinimalistFlat
    "Clean minimalist vector art style. Flat colors, simple geometric shapes, negative space, sharp vector lines, modern typography. ",
];

const VS_BADGE_CLAUSE: &str = "Prominently display the text \"VS\" in the center using a stylized, 3D metallic badge design that matches the background style. ";

/// Snapshot of everything the builder reads.
#[derive(Debug, Clone, Copy)]
pub struct PromptSelection<'a> {
    pub subject_a: &'a str,
    pub subject_b: &'a str,
    pub composition: CompositionVariant,
    pub style: StyleVariant,
    pub free_text: &'a str,
}

fn effective_subject(raw: &str, side: Side) -> &str {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        side.default_label()
    } else {
        trimmed
    }
}

pub fn composition_clause(composition: CompositionVariant, subject_a: &str, subject_b: &str) -> String {
    COMPOSITION_CLAUSES[composition.index()]
        .replace(SUBJECT_A_PLACEHOLDER, subject_a)
        .replace(SUBJECT_B_PLACEHOLDER, subject_b)
}

pub fn style_clause(style: StyleVariant) -> &'static str {
    STYLE_CLAUSES[style.index()]
}

fn typography_clause(subject_a: &str, subject_b: &str) -> String {
    format!(
        "Render the text \"{subject_a}\" and \"{subject_b}\" using large, bold, custom typography. The font should be aggressive and sporty. Ensure the text is legible and integrated into the design. "
    )
}

pub fn build_prompt(selection: &PromptSelection<'_>) -> String {
    build(
        selection.subject_a,
        selection.subject_b,
        selection.composition,
        selection.style,
        selection.free_text,
    )
}

pub fn build(
    subject_a: &str,
    subject_b: &str,
    composition: CompositionVariant,
    style: StyleVariant,
    free_text: &str,
) -> String {
    let a = effective_subject(subject_a, Side::A);
    let b = effective_subject(subject_b, Side::B);

    let mut prompt = format!("Create a high-impact promotional poster for a match between {a} and {b}. ");
    prompt.push_str(&composition_clause(composition, a, b));
    prompt.push_str(style_clause(style));
    prompt.push_str(VS_BADGE_CLAUSE);

    if !subject_a.trim().is_empty() && !subject_b.trim().is_empty() {
        prompt.push_str(&typography_clause(a, b));
    }

    if !free_text.trim().is_empty() {
        prompt.push_str(" Additional details: ");
        prompt.push_str(free_text);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    const TYPOGRAPHY_MARKER: &str = "using large, bold, custom typography";

    #[test]
    fn every_pair_has_ordered_non_empty_clauses() {
        for composition in CompositionVariant::ALL {
            for style in StyleVariant::ALL {
                let prompt = build("Chelsea", "Barcelona", composition, style, "");
                let comp = composition_clause(composition, "Chelsea", "Barcelona");
                let style_text = style_clause(style);
                assert!(!comp.trim().is_empty(), "{composition:?}");
                assert!(!style_text.trim().is_empty(), "{style:?}");

                let comp_at = prompt.find(&comp).expect("composition clause present");
                let style_at = prompt.find(style_text).expect("style clause present");
                let badge_at = prompt.find(VS_BADGE_CLAUSE).expect("badge clause present");
                assert!(comp_at < style_at, "{composition:?} / {style:?}");
                assert!(style_at < badge_at);
            }
        }
    }

    #[test]
    fn clauses_are_distinct() {
        let mut comps: Vec<&str> = COMPOSITION_CLAUSES.to_vec();
        comps.sort_unstable();
        comps.dedup();
        assert_eq!(comps.len(), CompositionVariant::COUNT);

        let mut styles: Vec<&str> = STYLE_CLAUSES.to_vec();
        styles.sort_unstable();
        styles.dedup();
        assert_eq!(styles.len(), StyleVariant::COUNT);
    }

    #[test]
    fn empty_subjects_fall_back_to_defaults_without_typography() {
        let prompt = build(
            "",
            "   ",
            CompositionVariant::DiagonalSplit,
            StyleVariant::Broadcast3d,
            "",
        );
        assert!(prompt.starts_with(
            "Create a high-impact promotional poster for a match between Home Team and Away Team. "
        ));
        assert!(prompt.contains("Place Home Team on the top-left/left and Away Team on the bottom-right/right"));
        assert!(!prompt.contains(TYPOGRAPHY_MARKER));
    }

    #[test]
    fn both_names_request_typography() {
        let prompt = build(
            " Chelsea ",
            "Barcelona",
            CompositionVariant::FaceOff,
            StyleVariant::GoldLuxury,
            "",
        );
        assert!(prompt.contains("between Chelsea and Barcelona."));
        assert!(prompt.contains(
            "Render the text \"Chelsea\" and \"Barcelona\" using large, bold, custom typography."
        ));
    }

    #[test]
    fn one_name_skips_typography() {
        let prompt = build(
            "Chelsea",
            "",
            CompositionVariant::TopBottom,
            StyleVariant::InkSplash,
            "",
        );
        assert!(prompt.contains("Top half for Chelsea, bottom half for Away Team."));
        assert!(!prompt.contains(TYPOGRAPHY_MARKER));
    }

    #[test]
    fn free_text_is_trailing_and_verbatim() {
        let prompt = build(
            "Chelsea",
            "Barcelona",
            CompositionVariant::CenterBurst,
            StyleVariant::CyberpunkNeon,
            "rainy weather",
        );
        assert!(prompt.ends_with(" Additional details: rainy weather"));

        let blank = build(
            "Chelsea",
            "Barcelona",
            CompositionVariant::CenterBurst,
            StyleVariant::CyberpunkNeon,
            "  \n ",
        );
        assert!(!blank.contains("Additional details"));
        assert!(blank.ends_with(". "));
    }

    #[test]
    fn build_is_deterministic() {
        let selection = PromptSelection {
            subject_a: "Lakers",
            subject_b: "Celtics",
            composition: CompositionVariant::CrestBackdrop,
            style: StyleVariant::RetroVintage,
            free_text: "confetti",
        };
        assert_eq!(build_prompt(&selection), build_prompt(&selection));
        assert_eq!(
            build_prompt(&selection),
            build("Lakers", "Celtics", selection.composition, selection.style, "confetti")
        );
    }
}
