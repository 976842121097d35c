//! Chapter preparation pipeline.
//!
//! Fixed pass order: head-block injection on raw text, root class merge,
//! audio handler rewiring with player injection, cosmetic patches. Every
//! pass degrades to a skip instead of failing, so the caller always gets a
//! renderable string back; [`ChapterPrep::prepare_with_report`] keeps the
//! per-stage outcomes for callers that want to see what was skipped and
//! why.

use crate::config::ReaderConfig;
use crate::head::{inject_head_block, HeadAssets};
use crate::rewrite::{
    collect_audio_elements, merge_root_classes, rewire_audio_handlers, RewriteError,
};

/// Pipeline stages surfaced in a [`PrepReport`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepStage {
    /// Stylesheet/script head-block injection.
    HeadInjection,
    /// Root element class merge and background-tap hook.
    RootClassMerge,
    /// Audio handler rewiring.
    AudioRewiring,
    /// Shared player element injection.
    PlayerInjection,
    /// Unconditional output patches.
    CosmeticPatches,
}

/// Why a stage did not apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// No closing head tag to anchor the injected block.
    HeadCloseMissing,
    /// No element start tag found for the root merge.
    RootTagMissing,
    /// Document has no audio elements.
    NoAudioElements,
    /// Handlers mention `play()` but none could be bound, or none exist.
    NoPlaybackBindings,
    /// No closing body tag to anchor the player element.
    BodyCloseMissing,
    /// The tokenizer rejected the markup; the stage fell back to its input.
    MalformedMarkup(RewriteError),
}

/// Outcome of one pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage transformed the document.
    Applied,
    /// The stage left the document as it found it.
    Skipped(SkipReason),
}

/// Stage-by-stage outcome of one preparation call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrepReport {
    stages: Vec<(PrepStage, StageStatus)>,
    /// Handlers bound to audio sources.
    pub audio_bindings: usize,
    /// `play()` handlers that could not be bound.
    pub unbound_handlers: usize,
}

impl PrepReport {
    fn record(&mut self, stage: PrepStage, status: StageStatus) {
        self.stages.push((stage, status));
    }

    /// Status for a stage, if it was reached.
    pub fn stage(&self, stage: PrepStage) -> Option<&StageStatus> {
        self.stages
            .iter()
            .find(|(recorded, _)| *recorded == stage)
            .map(|(_, status)| status)
    }

    /// Whether a stage transformed the document.
    pub fn applied(&self, stage: PrepStage) -> bool {
        matches!(self.stage(stage), Some(StageStatus::Applied))
    }

    /// Iterate skipped stages with their reasons.
    pub fn skips(&self) -> impl Iterator<Item = (PrepStage, &SkipReason)> {
        self.stages.iter().filter_map(|(stage, status)| match status {
            StageStatus::Skipped(reason) => Some((*stage, reason)),
            StageStatus::Applied => None,
        })
    }
}

/// Prepared chapter markup plus the per-stage report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedChapter {
    /// Markup ready to hand to the web view.
    pub html: String,
    /// Stage outcomes for diagnostics.
    pub report: PrepReport,
}

/// Chapter preparation entry point.
///
/// Holds the head asset references; everything else is per-call input.
/// One value can prepare any number of chapters from any thread the host
/// designates, one call at a time per chapter.
#[derive(Clone, Debug, Default)]
pub struct ChapterPrep {
    assets: HeadAssets,
}

impl ChapterPrep {
    /// Preparation with the default Android asset references.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom head asset references.
    pub fn with_assets(mut self, assets: HeadAssets) -> Self {
        self.assets = assets;
        self
    }

    /// Prepare one chapter. Best-effort: always returns markup, never an
    /// error.
    pub fn prepare(&self, html: &str, config: &ReaderConfig) -> String {
        self.prepare_with_report(html, config).html
    }

    /// Prepare one chapter and keep the per-stage outcomes.
    pub fn prepare_with_report(&self, html: &str, config: &ReaderConfig) -> PreparedChapter {
        let mut report = PrepReport::default();

        // Head block goes in while the document is still raw text; the
        // rewiring passes re-serialize and would lose the literal anchor.
        let html = match inject_head_block(html, &self.assets) {
            Some(injected) => {
                report.record(PrepStage::HeadInjection, StageStatus::Applied);
                injected
            }
            None => {
                log::warn!("chapter has no closing head tag; stylesheet and script block dropped");
                report.record(
                    PrepStage::HeadInjection,
                    StageStatus::Skipped(SkipReason::HeadCloseMissing),
                );
                html.to_string()
            }
        };

        let classes = config.body_classes();
        let html = match merge_root_classes(&html, &classes) {
            Ok(Some(merged)) => {
                report.record(PrepStage::RootClassMerge, StageStatus::Applied);
                merged
            }
            Ok(None) => {
                log::warn!("chapter has no root element; class merge skipped");
                report.record(
                    PrepStage::RootClassMerge,
                    StageStatus::Skipped(SkipReason::RootTagMissing),
                );
                html
            }
            Err(err) => {
                log::warn!("root tag rewrite failed, document left as-is: {}", err);
                report.record(
                    PrepStage::RootClassMerge,
                    StageStatus::Skipped(SkipReason::MalformedMarkup(err)),
                );
                html
            }
        };

        let html = self.rewire_audio(html, &mut report);

        report.record(PrepStage::CosmeticPatches, StageStatus::Applied);
        PreparedChapter {
            html: apply_cosmetic_patches(&html),
            report,
        }
    }

    fn rewire_audio(&self, html: String, report: &mut PrepReport) -> String {
        let audios = match collect_audio_elements(&html) {
            Ok(audios) => audios,
            Err(err) => {
                log::warn!("audio scan failed, handlers left unwired: {}", err);
                report.record(
                    PrepStage::AudioRewiring,
                    StageStatus::Skipped(SkipReason::MalformedMarkup(err)),
                );
                return html;
            }
        };
        if audios.is_empty() {
            log::debug!("chapter has no audio elements; handler rewiring skipped");
            report.record(
                PrepStage::AudioRewiring,
                StageStatus::Skipped(SkipReason::NoAudioElements),
            );
            report.record(
                PrepStage::PlayerInjection,
                StageStatus::Skipped(SkipReason::NoAudioElements),
            );
            return html;
        }
        match rewire_audio_handlers(&html, &audios) {
            Ok(outcome) => {
                report.audio_bindings = outcome.bindings;
                report.unbound_handlers = outcome.unbound;
                let rewiring = if outcome.bindings > 0 {
                    StageStatus::Applied
                } else {
                    StageStatus::Skipped(SkipReason::NoPlaybackBindings)
                };
                report.record(PrepStage::AudioRewiring, rewiring);
                let player = if outcome.player_injected {
                    StageStatus::Applied
                } else if outcome.bindings == 0 {
                    StageStatus::Skipped(SkipReason::NoPlaybackBindings)
                } else {
                    StageStatus::Skipped(SkipReason::BodyCloseMissing)
                };
                report.record(PrepStage::PlayerInjection, player);
                outcome.html
            }
            Err(err) => {
                log::warn!("audio rewiring failed, document left as-is: {}", err);
                report.record(
                    PrepStage::AudioRewiring,
                    StageStatus::Skipped(SkipReason::MalformedMarkup(err)),
                );
                html
            }
        }
    }
}

/// Prepare a chapter with the default asset references.
pub fn prepare_chapter(html: &str, config: &ReaderConfig) -> String {
    ChapterPrep::new().prepare(html, config)
}

const DOCTYPE_PLAIN: &str = "DOCTYPE html>";

/// Replacement doctype declaring the `nbsp` entity; the consuming renderer
/// chokes on the bare named entity otherwise.
const DOCTYPE_WITH_NBSP_ENTITY: &str = "DOCTYPE html [\n    <!ENTITY nbsp \"&#160;\"> \n]>";

/// Unconditional output patches: download-control suppression on existing
/// media controls, and the `nbsp` entity declaration.
fn apply_cosmetic_patches(html: &str) -> String {
    let patched = html.replace(
        "controls=\"controls\"",
        "controls=\"controls\" controlslist=\"nodownload\"",
    );
    patched.replace(DOCTYPE_PLAIN, DOCTYPE_WITH_NBSP_ENTITY)
}
