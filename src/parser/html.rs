//! Minimal HTML-to-text conversion for rendering HTML-only messages.
//!
//! Not a general HTML renderer: block elements become line breaks, link
//! targets are kept next to the link text, scripts and styles are dropped,
//! and a handful of common entities are decoded.

/// Convert an HTML body to plain text suitable for page layout.
pub fn html_to_text(html: &str) -> String {
    let mut text = remove_tag_block(html, "script");
    text = remove_tag_block(&text, "style");
    text = remove_tag_block(&text, "noscript");

    text = inline_link_targets(&text);

    // Block elements become newlines
    for tag in &["br", "br/", "br /"] {
        text = text.replace(&format!("<{tag}>"), "\n");
        text = text.replace(&format!("<{}>", tag.to_uppercase()), "\n");
    }
    for tag in &["p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6"] {
        text = text.replace(&format!("<{tag}>"), "\n");
        text = text.replace(&format!("<{tag} "), "\n<");
        text = text.replace(&format!("</{tag}>"), "\n");
        let upper = tag.to_uppercase();
        text = text.replace(&format!("<{upper}>"), "\n");
        text = text.replace(&format!("</{upper}>"), "\n");
    }

    // Strip remaining tags
    let mut stripped = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }

    let mut result = stripped;
    for (entity, repl) in [
        ("&amp;", "&"),
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&#160;", " "),
    ] {
        result = result.replace(entity, repl);
    }

    collapse_blank_lines(&result)
}

/// Rewrite `<a href="url">text</a>` as `text (url)` so link targets survive
/// the conversion to plain text.
fn inline_link_targets(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;

    while let Some(start) = find_ci(remaining, "<a ") {
        result.push_str(&remaining[..start]);
        let after_open = &remaining[start..];
        let Some(tag_end) = after_open.find('>') else {
            remaining = after_open;
            break;
        };
        let tag = &after_open[..tag_end];
        let href = extract_href(tag);
        let rest = &after_open[tag_end + 1..];
        let Some(close) = find_ci(rest, "</a>") else {
            remaining = rest;
            break;
        };
        let inner = &rest[..close];
        match href {
            Some(url) if !inner.trim().is_empty() && inner.trim() != url => {
                result.push_str(inner);
                result.push_str(&format!(" ({url})"));
            }
            _ => result.push_str(inner),
        }
        remaining = &rest[close + 4..];
    }
    result.push_str(remaining);
    result
}

fn extract_href(tag: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let pos = lower.find("href=")?;
    let rest = &tag[pos + 5..];
    let quote = rest.chars().next()?;
    if quote == '"' || quote == '\'' {
        let inner = &rest[1..];
        let end = inner.find(quote)?;
        Some(inner[..end].to_string())
    } else {
        let end = rest.find([' ', '>']).unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    while let Some(start) = find_ci(remaining, &open) {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        if let Some(end) = find_ci(after, &close) {
            remaining = &after[end + close.len()..];
        } else {
            remaining = "";
            break;
        }
    }
    result.push_str(remaining);
    result
}

/// Case-insensitive substring search returning a byte offset.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Collapse runs of blank lines into at most one and trim line edges.
fn collapse_blank_lines(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut prev_was_blank = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }
    cleaned.trim().to_string()
}
