//! Shared chapter fixtures for integration tests.

/// Minimal XHTML chapter wrapping the given body content.
pub fn chapter_with_body(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
         <head>\n<title>Chapter</title>\n</head>\n\
         <body>\n{}\n</body>\n</html>\n",
        body
    )
}

/// Chapter whose root element already carries a class attribute.
pub fn chapter_with_root_class(class: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" class=\"{}\">\n\
         <head>\n<title>Chapter</title>\n</head>\n\
         <body>\n{}\n</body>\n</html>\n",
        class, body
    )
}

/// Narrated chapter: one tappable paragraph per track plus its audio
/// element, in the double-quoted handler encoding found in media-overlay
/// content.
pub fn narrated_chapter(tracks: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (id, _) in tracks {
        body.push_str(&format!(
            "<p onclick=\"$(&quot;#{}&quot;)[0].play()\">narrated</p>\n",
            id
        ));
    }
    for (id, src) in tracks {
        body.push_str(&format!("<audio id=\"{}\" src=\"{}\"></audio>\n", id, src));
    }
    chapter_with_body(&body)
}
