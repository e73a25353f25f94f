use scraper::{Html, Selector};

/// Extract the essay body from a fetched page. The target site lays essays
/// out in a table, so the first `tbody` is tried before the usual article
/// containers; the last resort is joining all paragraphs.
pub fn extract_text(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    let candidates = [
        "tbody",
        "article",
        "main",
        "[role=main]",
        "#content",
        ".post-content",
    ];
    for sel in candidates.iter() {
        if let Some(text) = scrape_with_selector(&doc, sel) {
            if text.len() >= 200 {
                return Some(text);
            }
        }
    }

    // fallback: collect all paragraphs
    let p_sel = Selector::parse("p").ok()?;
    let mut out: Vec<String> = Vec::new();
    for p in doc.select(&p_sel) {
        let t = p.text().collect::<String>();
        let s = normalize(&t);
        if !s.is_empty() {
            out.push(s);
        }
    }
    let joined = out.join("\n");
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn scrape_with_selector(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let node = doc.select(&sel).next()?;
    let text = node.text().collect::<String>();
    let s = normalize(&text);
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn normalize(s: &str) -> String {
    // collapse whitespace and trim lines
    let mut out = String::new();
    for line in s.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(trimmed);
    }
    out
}
