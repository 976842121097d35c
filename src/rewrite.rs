//! Structured-markup rewriting passes.
//!
//! Everything here runs on quick-xml event streams rather than substring
//! editing: the root-tag class merge rebuilds the tag from a parsed
//! attribute map, and the audio rewiring passes copy every untouched event
//! back out verbatim so unrelated markup survives byte-for-byte. Chapter
//! markup in the wild is only approximately XHTML, so readers run with
//! end-name checking off and HTML-mode attribute iteration.

use std::borrow::Cow;
use std::fmt;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::head::PLAYBACK_BRIDGE_FN;

/// Handler installed on the root element so the host can detect taps on
/// the document background.
const ROOT_CLICK_HOOK: &str = "onClickHtml()";

/// Player element appended once per document when at least one handler was
/// bound. Remote playback stays disabled and the download control hidden.
pub(crate) const PLAYER_MARKUP: &str = "<audio id=\"player\" \
disableRemotePlayback=\"\" controls=\"\" controlslist=\"nodownload\" \
style=\"position:fixed;bottom:30px; width:80%; left:50%;margin-left:-40%;\">\
</audio>\n";

/// Structured error for rewrite passes.
///
/// Collapsed into skip outcomes at the public boundary; codes stay stable
/// so report consumers can key on them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteError {
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: Box<str>,
    /// Tokenizer byte offset where the error surfaced.
    pub offset: Option<usize>,
}

impl RewriteError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into().into_boxed_str(),
            offset: None,
        }
    }

    fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " [offset={}]", offset)?;
        }
        Ok(())
    }
}

impl std::error::Error for RewriteError {}

/// An `<audio>` element surfaced by the scan pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct AudioElement {
    /// Entity-decoded `id` attribute; empty when absent.
    pub id: String,
    /// Raw `src` attribute bytes as they appear in the source.
    pub src: String,
}

/// Outcome of the handler rewrite pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct RewireOutcome {
    /// Serialized document after rewiring.
    pub html: String,
    /// Handlers bound to an audio source.
    pub bindings: usize,
    /// Handlers containing `play()` that could not be bound.
    pub unbound: usize,
    /// Whether the player element was appended.
    pub player_injected: bool,
}

fn lenient_reader(html: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    reader
}

fn reader_offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

fn tokenize_error(err: quick_xml::Error, reader: &Reader<&[u8]>) -> RewriteError {
    RewriteError::new("REWRITE_TOKENIZE_ERROR", format!("XML error: {:?}", err))
        .with_offset(reader_offset(reader))
}

fn is_local_tag(e: &BytesStart<'_>, tag: &[u8]) -> bool {
    e.local_name().as_ref().eq_ignore_ascii_case(tag)
}

/// Attribute value with entities resolved; falls back to the raw bytes for
/// undecodable content rather than dropping the attribute.
fn decoded_attr_value(attr: &Attribute<'_>) -> String {
    match attr.unescape_value() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    }
}

fn raw_attr_value(attr: &Attribute<'_>) -> String {
    String::from_utf8_lossy(&attr.value).into_owned()
}

/// Merge computed classes into the root element's opening tag.
///
/// The first element start tag is rebuilt from its parsed attributes: the
/// merged `class` plus the background-tap hook go in right after the tag
/// name, remaining attributes keep their order, and any existing `class`
/// attribute is absorbed so the output never carries two. Only the tag's
/// own bytes are replaced; the rest of the document is spliced back
/// untouched.
///
/// Returns `Ok(None)` when the document has no element start tag.
pub(crate) fn merge_root_classes(
    html: &str,
    classes: &str,
) -> Result<Option<String>, RewriteError> {
    let mut reader = lenient_reader(html);
    let mut buf = Vec::with_capacity(64);
    loop {
        let tag_start = reader_offset(&reader);
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag_end = reader_offset(&reader);
                let rebuilt = rebuild_root_tag(&e, classes, false);
                return Ok(Some(splice(html, tag_start, tag_end, &rebuilt)));
            }
            Ok(Event::Empty(e)) => {
                let tag_end = reader_offset(&reader);
                let rebuilt = rebuild_root_tag(&e, classes, true);
                return Ok(Some(splice(html, tag_start, tag_end, &rebuilt)));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(err) => return Err(tokenize_error(err, &reader)),
        }
        buf.clear();
    }
}

fn splice(html: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(html.len() + replacement.len());
    out.push_str(&html[..start]);
    out.push_str(replacement);
    out.push_str(&html[end..]);
    out
}

fn rebuild_root_tag(e: &BytesStart<'_>, classes: &str, self_closing: bool) -> String {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut existing_class: Option<String> = None;
    let mut rest: Vec<(String, String)> = Vec::with_capacity(4);
    for attr in e.html_attributes().flatten() {
        if attr.key.as_ref().eq_ignore_ascii_case(b"class") {
            existing_class = Some(raw_attr_value(&attr));
        } else {
            rest.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                raw_attr_value(&attr),
            ));
        }
    }

    let merged = match existing_class {
        Some(existing) if !existing.is_empty() => {
            if classes.is_empty() {
                existing
            } else {
                format!("{} {}", classes, existing)
            }
        }
        _ => classes.to_string(),
    };

    let mut tag = String::with_capacity(64 + merged.len());
    tag.push('<');
    tag.push_str(&name);
    push_attr(&mut tag, "class", &merged);
    push_attr(&mut tag, "onclick", ROOT_CLICK_HOOK);
    for (key, value) in &rest {
        push_attr(&mut tag, key, value);
    }
    tag.push_str(if self_closing { "/>" } else { ">" });
    tag
}

fn push_attr(tag: &mut String, key: &str, value: &str) {
    let quote = if value.contains('"') { '\'' } else { '"' };
    tag.push(' ');
    tag.push_str(key);
    tag.push('=');
    tag.push(quote);
    tag.push_str(value);
    tag.push(quote);
}

/// Collect all `<audio>` elements in document order.
pub(crate) fn collect_audio_elements(html: &str) -> Result<Vec<AudioElement>, RewriteError> {
    let mut reader = lenient_reader(html);
    let mut buf = Vec::with_capacity(64);
    let mut audios = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if is_local_tag(&e, b"audio") {
                    audios.push(audio_from_tag(&e));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(tokenize_error(err, &reader)),
        }
        buf.clear();
    }
    Ok(audios)
}

fn audio_from_tag(e: &BytesStart<'_>) -> AudioElement {
    let mut audio = AudioElement::default();
    for attr in e.html_attributes().flatten() {
        if attr.key.as_ref().eq_ignore_ascii_case(b"id") {
            audio.id = decoded_attr_value(&attr);
        } else if attr.key.as_ref().eq_ignore_ascii_case(b"src") {
            audio.src = raw_attr_value(&attr);
        }
    }
    audio
}

/// Rewire playback `onclick` handlers to the bridge function and append
/// the shared player element.
///
/// Each element whose handler text contains `play()` is matched against
/// the collected audio elements by the quoted id token in the handler;
/// first id match wins. Unmatched or unparseable handlers are left in
/// place. The player element goes in before the closing `body` tag, once,
/// and only when at least one handler was bound.
pub(crate) fn rewire_audio_handlers(
    html: &str,
    audios: &[AudioElement],
) -> Result<RewireOutcome, RewriteError> {
    let mut reader = lenient_reader(html);
    let mut writer = Writer::new(Vec::with_capacity(html.len() + PLAYER_MARKUP.len()));
    let mut buf = Vec::with_capacity(64);
    let mut outcome = RewireOutcome::default();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let rewired = rewire_start_tag(e, audios, &mut outcome);
                write_event(&mut writer, Event::Start(rewired))?;
            }
            Ok(Event::Empty(e)) => {
                let rewired = rewire_start_tag(e, audios, &mut outcome);
                write_event(&mut writer, Event::Empty(rewired))?;
            }
            Ok(Event::End(e)) => {
                if outcome.bindings > 0
                    && !outcome.player_injected
                    && e.local_name().as_ref().eq_ignore_ascii_case(b"body")
                {
                    writer.get_mut().extend_from_slice(PLAYER_MARKUP.as_bytes());
                    outcome.player_injected = true;
                }
                write_event(&mut writer, Event::End(e))?;
            }
            Ok(Event::Eof) => break,
            Ok(event) => write_event(&mut writer, event)?,
            Err(err) => return Err(tokenize_error(err, &reader)),
        }
        buf.clear();
    }
    outcome.html = match String::from_utf8(writer.into_inner()) {
        Ok(html) => html,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    };
    Ok(outcome)
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), RewriteError> {
    writer
        .write_event(event)
        .map_err(|err| RewriteError::new("REWRITE_WRITE_ERROR", format!("write error: {:?}", err)))
}

/// Rewire one start tag, or hand it back untouched so the writer
/// reproduces its original bytes.
fn rewire_start_tag<'a>(
    e: BytesStart<'a>,
    audios: &[AudioElement],
    outcome: &mut RewireOutcome,
) -> BytesStart<'a> {
    let Some(handler) = playable_onclick(&e) else {
        return e;
    };
    let Some(target_id) = onclick_target_id(&handler) else {
        outcome.unbound += 1;
        log::warn!(
            "onclick handler has no quoted target id; left unwired: {}",
            handler
        );
        return e;
    };
    let Some(audio) = audios.iter().find(|audio| audio.id == target_id) else {
        outcome.unbound += 1;
        log::warn!(
            "no audio element with id {:?}; handler left unwired",
            target_id
        );
        return e;
    };
    outcome.bindings += 1;
    replace_onclick(&e, &audio.src)
}

/// Entity-decoded `onclick` value, if the element has one that invokes
/// `play()`.
fn playable_onclick(e: &BytesStart<'_>) -> Option<String> {
    for attr in e.html_attributes().flatten() {
        if attr.key.as_ref().eq_ignore_ascii_case(b"onclick") {
            let handler = decoded_attr_value(&attr);
            if handler.contains("play()") {
                return Some(handler);
            }
            return None;
        }
    }
    None
}

/// Extract the element id a playback handler points at.
///
/// The encoding observed in narrated content is `$("#TRAC_126")[0].play()`:
/// the text between the first two quote characters with its leading
/// selector prefix stripped. Handlers quoted with apostrophes are accepted
/// the same way.
fn onclick_target_id(handler: &str) -> Option<&str> {
    let token = quoted_segment(handler, '"').or_else(|| quoted_segment(handler, '\''))?;
    let mut chars = token.chars();
    chars.next()?;
    let id = chars.as_str();
    if id.is_empty() {
        return None;
    }
    Some(id)
}

fn quoted_segment(text: &str, quote: char) -> Option<&str> {
    let mut parts = text.split(quote);
    parts.next()?;
    parts.next()
}

fn replace_onclick(e: &BytesStart<'_>, src: &str) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let handler = format!("{}('{}')", PLAYBACK_BRIDGE_FN, src);
    let mut out = BytesStart::new(name);
    for attr in e.html_attributes().flatten() {
        if attr.key.as_ref().eq_ignore_ascii_case(b"onclick") {
            out.push_attribute(Attribute {
                key: QName(b"onclick"),
                value: Cow::Owned(handler.clone().into_bytes()),
            });
        } else {
            out.push_attribute(attr);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_class_and_tap_hook_to_bare_root() {
        let html = "<html><body/></html>";
        let merged = merge_root_classes(html, "lato nightMode")
            .expect("tokenize")
            .expect("root tag");
        assert_eq!(
            merged,
            "<html class=\"lato nightMode\" onclick=\"onClickHtml()\"><body/></html>"
        );
    }

    #[test]
    fn merge_absorbs_existing_class_attribute() {
        let html = "<html xmlns=\"http://www.w3.org/1999/xhtml\" class=\"calibre dark\" lang=\"en\"><body/></html>";
        let merged = merge_root_classes(html, "lora")
            .expect("tokenize")
            .expect("root tag");
        assert_eq!(merged.matches("class=").count(), 1);
        assert!(merged.starts_with("<html class=\"lora calibre dark\" onclick=\"onClickHtml()\""));
        assert!(merged.contains("xmlns=\"http://www.w3.org/1999/xhtml\""));
        assert!(merged.contains("lang=\"en\""));
    }

    #[test]
    fn merge_with_no_computed_classes_keeps_existing_value() {
        let html = "<html class=\"calibre\"><body/></html>";
        let merged = merge_root_classes(html, "")
            .expect("tokenize")
            .expect("root tag");
        assert!(merged.starts_with("<html class=\"calibre\" onclick=\"onClickHtml()\">"));
    }

    #[test]
    fn merge_skips_document_prologue() {
        let html = "<?xml version=\"1.0\"?>\n<!DOCTYPE html>\n<!-- <html class=\"decoy\"> -->\n<html><body/></html>";
        let merged = merge_root_classes(html, "raleway")
            .expect("tokenize")
            .expect("root tag");
        assert!(merged.contains("<!-- <html class=\"decoy\"> -->"));
        assert!(merged.contains("<html class=\"raleway\" onclick=\"onClickHtml()\">"));
        assert_eq!(merged.matches("onClickHtml").count(), 1);
    }

    #[test]
    fn merge_without_any_element_is_none() {
        assert_eq!(
            merge_root_classes("just text, no markup", "lato").expect("tokenize"),
            None
        );
    }

    #[test]
    fn scan_collects_audio_ids_and_sources() {
        let html = "<html><body>\
<audio id=\"TRAC_1\" src=\"audio/one.mp3\"></audio>\
<audio id=\"TRAC_2\" src=\"audio/two.mp3\"/>\
</body></html>";
        let audios = collect_audio_elements(html).expect("tokenize");
        assert_eq!(audios.len(), 2);
        assert_eq!(audios[0].id, "TRAC_1");
        assert_eq!(audios[0].src, "audio/one.mp3");
        assert_eq!(audios[1].id, "TRAC_2");
    }

    #[test]
    fn target_id_extraction_handles_both_quote_styles() {
        assert_eq!(
            onclick_target_id("$(\"#TRAC_126\")[0].play()"),
            Some("TRAC_126")
        );
        assert_eq!(onclick_target_id("$('#A1')[0].play()"), Some("A1"));
        assert_eq!(onclick_target_id("play()"), None);
        assert_eq!(onclick_target_id("$(\"\")[0].play()"), None);
        assert_eq!(onclick_target_id("$(\"#\")[0].play()"), None);
    }

    #[test]
    fn rewire_binds_handler_and_appends_player_once() {
        let html = "<html><body>\
<p onclick=\"$(&quot;#TRAC_1&quot;)[0].play()\">one</p>\
<p onclick=\"$(&quot;#TRAC_1&quot;)[0].play()\">again</p>\
<audio id=\"TRAC_1\" src=\"audio/one.mp3\"></audio>\
</body></html>";
        let audios = collect_audio_elements(html).expect("scan");
        let outcome = rewire_audio_handlers(html, &audios).expect("rewire");
        assert_eq!(outcome.bindings, 2);
        assert!(outcome.player_injected);
        assert_eq!(
            outcome.html.matches("onclick=\"playAudio('audio/one.mp3')\"").count(),
            2
        );
        assert_eq!(outcome.html.matches("id=\"player\"").count(), 1);
        let player = outcome.html.find("id=\"player\"").expect("player");
        let body_close = outcome.html.rfind("</body>").expect("body close");
        assert!(player < body_close);
    }

    #[test]
    fn rewire_without_bindings_skips_player() {
        let html = "<html><body>\
<p onclick=\"$(&quot;#MISSING&quot;)[0].play()\">one</p>\
<audio id=\"TRAC_1\" src=\"audio/one.mp3\"></audio>\
</body></html>";
        let audios = collect_audio_elements(html).expect("scan");
        let outcome = rewire_audio_handlers(html, &audios).expect("rewire");
        assert_eq!(outcome.bindings, 0);
        assert_eq!(outcome.unbound, 1);
        assert!(!outcome.player_injected);
        assert!(!outcome.html.contains("id=\"player\""));
        assert!(outcome
            .html
            .contains("onclick=\"$(&quot;#MISSING&quot;)[0].play()\""));
    }

    #[test]
    fn rewire_leaves_unrelated_handlers_byte_identical() {
        let html = "<html><body>\
<p onclick=\"doSomething()\">inert</p>\
<p onclick=\"$(&quot;#TRAC_1&quot;)[0].play()\">narrated</p>\
<audio id=\"TRAC_1\" src=\"audio/one.mp3\"></audio>\
</body></html>";
        let audios = collect_audio_elements(html).expect("scan");
        let outcome = rewire_audio_handlers(html, &audios).expect("rewire");
        assert!(outcome.html.contains("<p onclick=\"doSomething()\">inert</p>"));
    }

    #[test]
    fn first_matching_audio_wins_for_duplicate_ids() {
        let html = "<html><body>\
<p onclick=\"$(&quot;#DUP&quot;)[0].play()\">x</p>\
<audio id=\"DUP\" src=\"audio/first.mp3\"></audio>\
<audio id=\"DUP\" src=\"audio/second.mp3\"></audio>\
</body></html>";
        let audios = collect_audio_elements(html).expect("scan");
        let outcome = rewire_audio_handlers(html, &audios).expect("rewire");
        assert!(outcome.html.contains("playAudio('audio/first.mp3')"));
        assert!(!outcome.html.contains("playAudio('audio/second.mp3')"));
    }
}
