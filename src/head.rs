//! Head-block construction and literal-text injection.
//!
//! The stylesheet and script references must land before the chapter's
//! closing head tag while the document is still raw text: the rewiring
//! passes re-serialize the tree and would lose the exact anchor. The block
//! layout and load order match what the host web view's bridge scripts
//! expect.

/// Name of the playback bridge function rewired handlers call.
pub const PLAYBACK_BRIDGE_FN: &str = "playAudio";

/// Literal anchor the block is inserted before.
const HEAD_CLOSE: &str = "</head>";

/// Stylesheet path relative to the asset base.
const STYLESHEET_FILE: &str = "css/Style.css";

/// Script files relative to the asset base, in load order. Bridge and the
/// rangy/CFI utilities depend on jsface and jquery being loaded first.
const SCRIPT_FILES: [&str; 9] = [
    "js/jsface.min.js",
    "js/jquery-3.4.1.min.js",
    "js/rangy-core.js",
    "js/rangy-highlighter.js",
    "js/rangy-classapplier.js",
    "js/rangy-serializer.js",
    "js/Bridge.js",
    "js/rangefix.js",
    "js/readium-cfi.umd.js",
];

/// Asset base used by the Android host.
const DEFAULT_ASSET_BASE: &str = "file:///android_asset";

/// Media overlay color the host theme ships with.
const DEFAULT_OVERLAY_COLOR: &str = "#C0ED72";

const VIEWPORT_META: &str =
    "<meta name=\"viewport\" content=\"height=device-height, user-scalable=yes\" />";

/// Playback bridge installed in the head. Rewired `onclick` handlers call
/// it with the matched audio source; it loads the source into the shared
/// player element and reveals it.
const PLAYBACK_BRIDGE_JS: &str = "\nfunction playAudio(src) {\n    \
var audioElement = $('#player')[0];\n    \
audioElement.setAttribute('src',src);\n    \
audioElement.load();\n    \
audioElement.play();\n    \
$(audioElement).show();\n}";

/// Asset references injected into every chapter head.
///
/// The default set points at the fixed Android asset paths; hosts that
/// serve assets elsewhere rebuild the same file set with
/// [`for_asset_base`](Self::for_asset_base). Hrefs are symbolic and never
/// validated for existence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadAssets {
    /// Href of the reader stylesheet.
    pub stylesheet_href: String,
    /// Script file hrefs in load order.
    pub script_hrefs: Vec<String>,
    /// Media overlay highlight color passed to the style setter.
    pub overlay_highlight_color: String,
    /// Media overlay underline color passed to the style setter.
    pub overlay_underline_color: String,
}

impl Default for HeadAssets {
    fn default() -> Self {
        Self::for_asset_base(DEFAULT_ASSET_BASE)
    }
}

impl HeadAssets {
    /// Build the fixed asset set under a different base URL.
    pub fn for_asset_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            stylesheet_href: format!("{}/{}", base, STYLESHEET_FILE),
            script_hrefs: SCRIPT_FILES
                .iter()
                .map(|file| format!("{}/{}", base, file))
                .collect(),
            overlay_highlight_color: DEFAULT_OVERLAY_COLOR.to_string(),
            overlay_underline_color: DEFAULT_OVERLAY_COLOR.to_string(),
        }
    }

    /// Override both media overlay colors.
    pub fn with_overlay_colors(mut self, highlight: &str, underline: &str) -> Self {
        self.overlay_highlight_color = highlight.to_string();
        self.overlay_underline_color = underline.to_string();
        self
    }

    /// Render the full head block: stylesheet, script stack, overlay color
    /// setter, viewport meta, playback bridge definition.
    pub fn head_block(&self) -> String {
        let mut block = String::with_capacity(1024);
        block.push('\n');
        block.push_str(&link_tag(&self.stylesheet_href));
        block.push('\n');
        for href in &self.script_hrefs {
            block.push_str(&script_src_tag(href));
            block.push('\n');
        }
        block.push_str(&inline_script_tag(&format!(
            "setMediaOverlayStyleColors('{}','{}')",
            self.overlay_highlight_color, self.overlay_underline_color
        )));
        block.push('\n');
        block.push_str(VIEWPORT_META);
        block.push('\n');
        block.push_str(&inline_script_tag(PLAYBACK_BRIDGE_JS));
        block.push('\n');
        block
    }
}

fn link_tag(href: &str) -> String {
    format!(
        "<link href=\"{}\" rel=\"stylesheet\" type=\"text/css\"/>",
        href
    )
}

fn script_src_tag(href: &str) -> String {
    format!(
        "<script src=\"{}\" type=\"text/javascript\"></script>",
        href
    )
}

fn inline_script_tag(body: &str) -> String {
    format!("<script type=\"text/javascript\">{}</script>", body)
}

/// Insert the head block immediately before the first `</head>`.
///
/// Returns `None` when the document has no closing head tag; the caller
/// treats that as a recoverable skip.
pub(crate) fn inject_head_block(html: &str, assets: &HeadAssets) -> Option<String> {
    let at = html.find(HEAD_CLOSE)?;
    let block = assets.head_block();
    let mut out = String::with_capacity(html.len() + block.len());
    out.push_str(&html[..at]);
    out.push_str(&block);
    out.push_str(&html[at..]);
    Some(out)
}
