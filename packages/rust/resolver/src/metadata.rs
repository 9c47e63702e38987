use scraper::{Html, Selector};

use sitemap_shared::PageMetadata;

/// Pull `<title>` text and `<meta name="description">` content from an HTML
/// body. Missing or blank values are `None`.
pub fn extract_metadata(html: &str) -> PageMetadata {
    let doc = Html::parse_document(html);

    let title = first(&doc, "title")
        .map(|el| el.text().collect::<String>())
        .and_then(non_blank);

    let description = first(&doc, r#"meta[name="description"]"#)
        .and_then(|el| el.value().attr("content").map(str::to_string))
        .and_then(non_blank);

    PageMetadata { title, description }
}

fn first<'a>(doc: &'a Html, css: &str) -> Option<scraper::ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector).next()
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
