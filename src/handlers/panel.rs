use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::poster::{
    AspectRatio, CompositionVariant, GeneratedArtifact, ImageResolution, PosterSession, Side,
    StyleVariant,
};
use crate::utils::telegram::{escape_html, truncate_chars};

pub const CALLBACK_NAMESPACE: &str = "vs_";

const COMPOSITION_PREFIX: &str = "vs_comp:";
const STYLE_PREFIX: &str = "vs_style:";
const ASPECT_RATIO_PREFIX: &str = "vs_ar:";
const RESOLUTION_PREFIX: &str = "vs_res:";
const GENERATE_DATA: &str = "vs_gen";
const REGENERATE_DATA: &str = "vs_regen";
const DOWNLOAD_DATA: &str = "vs_dl";
const CLOSE_DATA: &str = "vs_close";

const SELECTED_MARK: &str = "● ";
const CAPTION_LIMIT: usize = 1000;
const CAPTION_PROMPT_PREVIEW: usize = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Composition(CompositionVariant),
    Style(StyleVariant),
    AspectRatio(AspectRatio),
    Resolution(ImageResolution),
    Generate,
    Regenerate,
    Download,
    Close,
}

impl PanelAction {
    pub fn callback_data(self) -> String {
        match self {
            PanelAction::Composition(variant) => format!("{COMPOSITION_PREFIX}{}", variant.code()),
            PanelAction::Style(variant) => format!("{STYLE_PREFIX}{}", variant.code()),
            PanelAction::AspectRatio(ratio) => format!("{ASPECT_RATIO_PREFIX}{ratio}"),
            PanelAction::Resolution(resolution) => format!("{RESOLUTION_PREFIX}{resolution}"),
            PanelAction::Generate => GENERATE_DATA.to_string(),
            PanelAction::Regenerate => REGENERATE_DATA.to_string(),
            PanelAction::Download => DOWNLOAD_DATA.to_string(),
            PanelAction::Close => CLOSE_DATA.to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        if let Some(code) = data.strip_prefix(COMPOSITION_PREFIX) {
            return CompositionVariant::from_code(code).map(PanelAction::Composition);
        }
        if let Some(code) = data.strip_prefix(STYLE_PREFIX) {
            return StyleVariant::from_code(code).map(PanelAction::Style);
        }
        if let Some(value) = data.strip_prefix(ASPECT_RATIO_PREFIX) {
            return value.parse().ok().map(PanelAction::AspectRatio);
        }
        if let Some(value) = data.strip_prefix(RESOLUTION_PREFIX) {
            return value.parse().ok().map(PanelAction::Resolution);
        }
        match data {
            GENERATE_DATA => Some(PanelAction::Generate),
            REGENERATE_DATA => Some(PanelAction::Regenerate),
            DOWNLOAD_DATA => Some(PanelAction::Download),
            CLOSE_DATA => Some(PanelAction::Close),
            _ => None,
        }
    }
}

/// Applies a selection action; returns false for non-selection actions.
pub fn apply_selection(session: &mut PosterSession, action: PanelAction) -> bool {
    match action {
        PanelAction::Composition(variant) => session.select_composition(variant),
        PanelAction::Style(variant) => session.select_style(variant),
        PanelAction::AspectRatio(ratio) => session.select_aspect_ratio(ratio),
        PanelAction::Resolution(resolution) => session.select_resolution(resolution),
        _ => return false,
    }
    true
}

fn option_button(label: &str, selected: bool, action: PanelAction) -> InlineKeyboardButton {
    let text = if selected {
        format!("{SELECTED_MARK}{label}")
    } else {
        label.to_string()
    };
    InlineKeyboardButton::callback(text, action.callback_data())
}

fn rows(buttons: Vec<InlineKeyboardButton>, per_row: usize) -> Vec<Vec<InlineKeyboardButton>> {
    buttons
        .chunks(per_row)
        .map(|chunk| chunk.to_vec())
        .collect()
}

pub fn panel_keyboard(session: &PosterSession) -> InlineKeyboardMarkup {
    let compositions = CompositionVariant::ALL
        .into_iter()
        .map(|variant| {
            option_button(
                variant.label(),
                session.composition == variant,
                PanelAction::Composition(variant),
            )
        })
        .collect();
    let styles = StyleVariant::ALL
        .into_iter()
        .map(|variant| {
            option_button(
                variant.label(),
                session.style == variant,
                PanelAction::Style(variant),
            )
        })
        .collect();
    let ratios = AspectRatio::ALL
        .into_iter()
        .map(|ratio| {
            option_button(
                ratio.as_str(),
                session.output.aspect_ratio == ratio,
                PanelAction::AspectRatio(ratio),
            )
        })
        .collect();
    let resolutions = ImageResolution::ALL
        .into_iter()
        .map(|resolution| {
            option_button(
                resolution.as_str(),
                session.output.resolution == resolution,
                PanelAction::Resolution(resolution),
            )
        })
        .collect();

    let mut keyboard = rows(compositions, 2);
    keyboard.extend(rows(styles, 2));
    keyboard.extend(rows(ratios, 4));
    keyboard.extend(rows(resolutions, 3));
    keyboard.push(vec![InlineKeyboardButton::callback(
        "Generate VS Cover",
        PanelAction::Generate.callback_data(),
    )]);
    InlineKeyboardMarkup::new(keyboard)
}

pub fn result_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Regenerate", PanelAction::Regenerate.callback_data()),
        InlineKeyboardButton::callback("Download", PanelAction::Download.callback_data()),
        InlineKeyboardButton::callback("Close", PanelAction::Close.callback_data()),
    ]])
}

fn side_line(session: &PosterSession, side: Side) -> String {
    let input = session.side(side);
    let name = input.name.trim();
    let name = if name.is_empty() {
        format!("<i>{}</i>", side.default_label())
    } else {
        escape_html(name)
    };
    let photo = if input.image.is_some() {
        "photo set"
    } else {
        "no photo"
    };
    format!("<b>{}:</b> {} ({})", side.title(), name, photo)
}

/// HTML body of the settings panel message.
pub fn panel_text(session: &PosterSession) -> String {
    let details = session.details.trim();
    let details = if details.is_empty() {
        "<i>none</i>".to_string()
    } else {
        escape_html(&truncate_chars(details, 300))
    };
    format!(
        "<b>VS Cover Builder</b>\n\n{}\n{}\n\n<b>Composition:</b> {}\n<b>Style:</b> {}\n<b>Format:</b> {} / {}\n<b>Details:</b> {}\n\nSend a photo captioned <code>home</code> or <code>away</code>, set names with /home and /away, then press Generate.",
        side_line(session, Side::A),
        side_line(session, Side::B),
        session.composition.label(),
        session.style.label(),
        session.output.aspect_ratio,
        session.output.resolution,
        details
    )
}

pub fn result_caption(artifact: &GeneratedArtifact) -> String {
    let base_caption = "<b>VS cover ready</b>";
    let caption = format!(
        "{base_caption}\n<blockquote expandable>{}</blockquote>",
        escape_html(&artifact.prompt)
    );
    if caption.chars().count() <= CAPTION_LIMIT {
        return caption;
    }

    let caption = format!(
        "{base_caption}\n<blockquote expandable>{}</blockquote>",
        escape_html(&truncate_chars(&artifact.prompt, CAPTION_PROMPT_PREVIEW))
    );
    if caption.chars().count() <= CAPTION_LIMIT {
        caption
    } else {
        base_caption.to_string()
    }
}

#[cfg(test)]
mod tests {
    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;
    use crate::poster::SourceImage;

    fn callback_data(button: &InlineKeyboardButton) -> &str {
        match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data,
            other => panic!("unexpected button kind {other:?}"),
        }
    }

    fn all_actions() -> Vec<PanelAction> {
        let mut actions: Vec<PanelAction> = Vec::new();
        actions.extend(CompositionVariant::ALL.map(PanelAction::Composition));
        actions.extend(StyleVariant::ALL.map(PanelAction::Style));
        actions.extend(AspectRatio::ALL.map(PanelAction::AspectRatio));
        actions.extend(ImageResolution::ALL.map(PanelAction::Resolution));
        actions.extend([
            PanelAction::Generate,
            PanelAction::Regenerate,
            PanelAction::Download,
            PanelAction::Close,
        ]);
        actions
    }

    #[test]
    fn callback_data_round_trips() {
        for action in all_actions() {
            let data = action.callback_data();
            assert!(data.starts_with(CALLBACK_NAMESPACE));
            assert!(data.len() <= 64, "{data} exceeds the callback data limit");
            assert_eq!(PanelAction::parse(&data), Some(action));
        }
    }

    #[test]
    fn rejects_unknown_callback_data() {
        assert_eq!(PanelAction::parse("vs_comp:spiral"), None);
        assert_eq!(PanelAction::parse("vs_ar:5:4"), None);
        assert_eq!(PanelAction::parse("image_res:abc|2K"), None);
        assert_eq!(PanelAction::parse(""), None);
    }

    #[test]
    fn selections_update_the_session() {
        let mut session = PosterSession::default();
        assert!(apply_selection(&mut session, PanelAction::Composition(CompositionVariant::VFormation)));
        assert!(apply_selection(&mut session, PanelAction::Style(StyleVariant::RetroVintage)));
        assert!(apply_selection(&mut session, PanelAction::AspectRatio(AspectRatio::Square)));
        assert!(apply_selection(&mut session, PanelAction::Resolution(ImageResolution::Res1k)));
        assert!(!apply_selection(&mut session, PanelAction::Generate));

        assert_eq!(session.composition, CompositionVariant::VFormation);
        assert_eq!(session.style, StyleVariant::RetroVintage);
        assert_eq!(session.output.aspect_ratio, AspectRatio::Square);
        assert_eq!(session.output.resolution, ImageResolution::Res1k);
    }

    #[test]
    fn panel_marks_current_selection() {
        let mut session = PosterSession::default();
        session.select_style(StyleVariant::GoldLuxury);
        let keyboard = panel_keyboard(&session);

        let buttons: Vec<&InlineKeyboardButton> =
            keyboard.inline_keyboard.iter().flatten().collect();
        // 8 compositions, 10 styles, 8 ratios, 3 resolutions, generate.
        assert_eq!(buttons.len(), 30);

        let selected: Vec<&str> = buttons
            .iter()
            .filter(|button| button.text.starts_with(SELECTED_MARK))
            .map(|button| callback_data(button))
            .collect();
        assert_eq!(
            selected,
            vec!["vs_comp:diagonal", "vs_style:gold", "vs_ar:9:16", "vs_res:2K"]
        );
        let last = buttons.last().map(|button| callback_data(button));
        assert_eq!(last, Some("vs_gen"));
    }

    #[test]
    fn panel_text_escapes_user_input() {
        let mut session = PosterSession::default();
        session.set_name(Side::A, "<Chelsea & Co>");
        session.set_image(
            Side::B,
            SourceImage {
                data: "iVBORw0KGgo".into(),
                mime_type: "image/png",
            },
        );
        let text = panel_text(&session);
        assert!(text.contains("&lt;Chelsea &amp; Co&gt; (no photo)"));
        assert!(text.contains("<i>Away Team</i> (photo set)"));
        assert!(text.contains("<b>Format:</b> 9:16 / 2K"));
    }

    #[test]
    fn caption_stays_within_telegram_limit() {
        let short = GeneratedArtifact::new("data:image/png;base64,AA".into(), "add <rain>".into());
        assert!(result_caption(&short).contains("add &lt;rain&gt;"));

        let long = GeneratedArtifact::new("data:image/png;base64,AA".into(), "word ".repeat(400));
        let caption = result_caption(&long);
        assert!(caption.chars().count() <= CAPTION_LIMIT);
        assert!(caption.contains("word word"));
        assert!(caption.contains("...</blockquote>"));

        let noisy = GeneratedArtifact::new("data:image/png;base64,AA".into(), "&".repeat(2000));
        assert_eq!(result_caption(&noisy), "<b>VS cover ready</b>");
    }
}
