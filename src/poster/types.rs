use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::A, Side::B];

    pub fn default_label(self) -> &'static str {
        match self {
            Side::A => "Home Team",
            Side::B => "Away Team",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Side::A => "Home / Side A",
            Side::B => "Away / Side B",
        }
    }

    /// Maps an upload caption keyword (`home`, `/away`, `a`, ...) to a side.
    pub fn from_keyword(value: &str) -> Option<Side> {
        let lowered = value.trim().trim_start_matches('/').to_ascii_lowercase();
        match lowered.as_str() {
            "home" | "a" => Some(Side::A),
            "away" | "b" => Some(Side::B),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositionVariant {
    DiagonalSplit,
    FaceOff,
    DoubleExposure,
    ActionCollage,
    CenterBurst,
    VFormation,
    TopBottom,
    CrestBackdrop,
}

impl CompositionVariant {
    pub const COUNT: usize = 8;
    pub const ALL: [CompositionVariant; Self::COUNT] = [
        CompositionVariant::DiagonalSplit,
        CompositionVariant::FaceOff,
        CompositionVariant::DoubleExposure,
        CompositionVariant::ActionCollage,
        CompositionVariant::CenterBurst,
        CompositionVariant::VFormation,
        CompositionVariant::TopBottom,
        CompositionVariant::CrestBackdrop,
    ];

    const CODES: [(&'static str, &'static str); Self::COUNT] = [
        ("diagonal", "Diagonal Split"),
        ("faceoff", "Face to Face"),
        ("double", "Double Exposure"),
        ("collage", "Action Collage"),
        ("burst", "Center Burst"),
        ("vform", "V-Formation"),
        ("topbottom", "Top vs Bottom"),
        ("crest", "Crest Backdrop"),
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn code(self) -> &'static str {
        Self::CODES[self.index()].0
    }

    pub fn label(self) -> &'static str {
        Self::CODES[self.index()].1
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|variant| variant.code().eq_ignore_ascii_case(code))
    }
}

impl Default for CompositionVariant {
    fn default() -> Self {
        CompositionVariant::DiagonalSplit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleVariant {
    RealisticStadium,
    CyberpunkNeon,
    UrbanGrunge,
    Broadcast3d,
    ComicIllustration,
    GoldLuxury,
    RetroVintage,
    InkSplash,
    PaperCollage,
    MinimalistFlat,
}

impl StyleVariant {
    pub const COUNT: usize = 10;
    pub const ALL: [StyleVariant; Self::COUNT] = [
        StyleVariant::RealisticStadium,
        StyleVariant::CyberpunkNeon,
        StyleVariant::UrbanGrunge,
        StyleVariant::Broadcast3d,
        StyleVariant::ComicIllustration,
        StyleVariant::GoldLuxury,
        StyleVariant::RetroVintage,
        StyleVariant::InkSplash,
        StyleVariant::PaperCollage,
        StyleVariant::MinimalistFlat,
    ];

    const CODES: [(&'static str, &'static str); Self::COUNT] = [
        ("stadium", "Realistic Stadium"),
        ("cyberpunk", "Cyberpunk Neon"),
        ("grunge", "Urban Grunge"),
        ("broadcast", "3D Broadcast"),
        ("comic", "Comic Illustration"),
        ("gold", "Gold & Luxury"),
        ("retro", "Retro Vintage"),
        ("ink", "Ink Splash"),
        ("paper", "Paper Collage"),
        ("flat", "Minimalist Flat"),
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn code(self) -> &'static str {
        Self::CODES[self.index()].0
    }

    pub fn label(self) -> &'static str {
        Self::CODES[self.index()].1
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|variant| variant.code().eq_ignore_ascii_case(code))
    }
}

impl Default for StyleVariant {
    fn default() -> Self {
        StyleVariant::Broadcast3d
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    Square,
    Portrait2x3,
    Landscape3x2,
    Portrait3x4,
    Landscape4x3,
    Portrait9x16,
    Landscape16x9,
    Cinematic21x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 8] = [
        AspectRatio::Square,
        AspectRatio::Portrait2x3,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
        AspectRatio::Cinematic21x9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait2x3 => "2:3",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Cinematic21x9 => "21:9",
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio::Portrait9x16
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == value)
            .ok_or_else(|| format!("unknown aspect ratio '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageResolution {
    Res1k,
    Res2k,
    Res4k,
}

impl ImageResolution {
    pub const ALL: [ImageResolution; 3] = [
        ImageResolution::Res1k,
        ImageResolution::Res2k,
        ImageResolution::Res4k,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ImageResolution::Res1k => "1K",
            ImageResolution::Res2k => "2K",
            ImageResolution::Res4k => "4K",
        }
    }
}

impl Default for ImageResolution {
    fn default() -> Self {
        ImageResolution::Res2k
    }
}

impl fmt::Display for ImageResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageResolution {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        ImageResolution::ALL
            .into_iter()
            .find(|res| res.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("unknown resolution '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputSpec {
    pub aspect_ratio: AspectRatio,
    pub resolution: ImageResolution,
}

/// Raw base64 payload for one upload slot, never carrying a data-URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub data: String,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub image_uri: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedArtifact {
    pub fn new(image_uri: String, prompt: String) -> Self {
        Self {
            image_uri,
            prompt,
            created_at: Utc::now(),
        }
    }
}

/// Download name, `vs-cover-<unix millis>.png`.
pub fn artifact_file_name(now: DateTime<Utc>) -> String {
    format!("vs-cover-{}.png", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_tables_follow_declaration_order() {
        for (index, variant) in CompositionVariant::ALL.into_iter().enumerate() {
            assert_eq!(variant.index(), index);
            assert_eq!(CompositionVariant::from_code(variant.code()), Some(variant));
        }
        for (index, variant) in StyleVariant::ALL.into_iter().enumerate() {
            assert_eq!(variant.index(), index);
            assert_eq!(StyleVariant::from_code(variant.code()), Some(variant));
        }
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<&str> = CompositionVariant::ALL.iter().map(|v| v.code()).collect();
        codes.extend(StyleVariant::ALL.iter().map(|v| v.code()));
        let before = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), before);
    }

    #[test]
    fn parses_output_settings() {
        assert_eq!("16:9".parse::<AspectRatio>(), Ok(AspectRatio::Landscape16x9));
        assert_eq!(" 21:9 ".parse::<AspectRatio>(), Ok(AspectRatio::Cinematic21x9));
        assert!("5:4".parse::<AspectRatio>().is_err());
        assert_eq!("4k".parse::<ImageResolution>(), Ok(ImageResolution::Res4k));
        assert!("8K".parse::<ImageResolution>().is_err());
    }

    #[test]
    fn defaults_match_initial_selection() {
        assert_eq!(CompositionVariant::default(), CompositionVariant::DiagonalSplit);
        assert_eq!(StyleVariant::default(), StyleVariant::Broadcast3d);
        let output = OutputSpec::default();
        assert_eq!(output.aspect_ratio.as_str(), "9:16");
        assert_eq!(output.resolution.as_str(), "2K");
    }

    #[test]
    fn side_keywords() {
        assert_eq!(Side::from_keyword("/home"), Some(Side::A));
        assert_eq!(Side::from_keyword("AWAY"), Some(Side::B));
        assert_eq!(Side::from_keyword("b"), Some(Side::B));
        assert_eq!(Side::from_keyword("left"), None);
    }

    #[test]
    fn download_name_uses_millis() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(artifact_file_name(now), "vs-cover-1700000000123.png");
    }
}
