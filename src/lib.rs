//! Chapter markup preparation for embedded web views.
//!
//! Rewrites an EPUB chapter's XHTML before the host reading application
//! hands it to its web view: injects the reader stylesheet and script
//! stack into the head, applies font/size/night-mode classes to the root
//! element, rewires inline audio `onclick` handlers to the playback
//! bridge, and patches a small set of renderer quirks.
//!
//! The whole pipeline is synchronous, allocation-only, and best-effort:
//! it always returns markup, degrading malformed or incomplete input to
//! skipped passes surfaced through [`PrepReport`] and the `log` facade.
//!
//! # Usage
//!
//! ```rust
//! use epub_webview_prep::{prepare_chapter, FontFamily, ReaderConfig};
//!
//! let chapter = "<html><head></head><body><p>text</p></body></html>";
//! let config = ReaderConfig {
//!     font: FontFamily::Lora,
//!     font_size: 2,
//!     night_mode: false,
//! };
//! let html = prepare_chapter(chapter, &config);
//! assert!(html.contains("class=\"lora textSizeThree\""));
//! ```

pub mod config;
pub mod head;
pub mod rewrite;
pub mod transform;

pub use config::{ClassTokens, FontFamily, ReaderConfig};
pub use head::HeadAssets;
pub use rewrite::RewriteError;
pub use transform::{
    prepare_chapter, ChapterPrep, PrepReport, PrepStage, PreparedChapter, SkipReason, StageStatus,
};
