//! Reader configuration and body class resolution.
//!
//! The host reading application supplies a [`ReaderConfig`] per chapter
//! load. This module maps it to the class tokens the injected stylesheet
//! keys on: font family, night mode, text size level.

use smallvec::SmallVec;

/// Font family choices exposed by the reader UI.
///
/// The set is closed; the stylesheet only defines faces for the named
/// variants. [`FontFamily::Default`] contributes no class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FontFamily {
    /// Andada serif face.
    Andada,
    /// Lato sans face.
    Lato,
    /// Lora serif face.
    Lora,
    /// Raleway sans face.
    Raleway,
    /// Publisher or system default face.
    #[default]
    Default,
}

impl FontFamily {
    /// Stylesheet class token for this family, if it has one.
    pub fn class_token(self) -> Option<&'static str> {
        match self {
            FontFamily::Andada => Some("andada"),
            FontFamily::Lato => Some("lato"),
            FontFamily::Lora => Some("lora"),
            FontFamily::Raleway => Some("raleway"),
            FontFamily::Default => None,
        }
    }
}

/// Per-chapter render configuration supplied by the host reader.
///
/// Immutable for the duration of one preparation call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Selected font family.
    pub font: FontFamily,
    /// Text size level. The stylesheet defines levels 0 through 4;
    /// out-of-range values contribute no size class.
    pub font_size: u8,
    /// Inverted palette for dark reading environments.
    pub night_mode: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            font: FontFamily::Default,
            font_size: 2,
            night_mode: false,
        }
    }
}

/// Short-lived class token list resolved from a [`ReaderConfig`].
pub type ClassTokens = SmallVec<[&'static str; 3]>;

impl ReaderConfig {
    /// Resolve class tokens in stylesheet order: font family, night mode,
    /// text size. Unrecognized values contribute nothing.
    pub fn class_tokens(&self) -> ClassTokens {
        let mut tokens = ClassTokens::new();
        if let Some(font) = self.font.class_token() {
            tokens.push(font);
        }
        if self.night_mode {
            tokens.push("nightMode");
        }
        match text_size_token(self.font_size) {
            Some(size) => tokens.push(size),
            None => log::debug!(
                "font size level {} outside stylesheet range; no size class applied",
                self.font_size
            ),
        }
        tokens
    }

    /// Space-joined form of [`class_tokens`](Self::class_tokens).
    pub fn body_classes(&self) -> String {
        self.class_tokens().join(" ")
    }
}

fn text_size_token(level: u8) -> Option<&'static str> {
    match level {
        0 => Some("textSizeOne"),
        1 => Some("textSizeTwo"),
        2 => Some("textSizeThree"),
        3 => Some("textSizeFour"),
        4 => Some("textSizeFive"),
        _ => None,
    }
}
