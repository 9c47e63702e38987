//! Small element-path helpers over `roxmltree`.

use roxmltree::{Document, Node};
use sitemap_shared::{Result, SitemapError};

/// Parse a feed body, checking the root element name.
pub(crate) fn parse_document<'a>(body: &'a str, root: &str) -> Result<Document<'a>> {
    let doc = Document::parse(body)
        .map_err(|e| SitemapError::parse(format!("invalid XML: {e}")))?;

    let actual = doc.root_element().tag_name().name();
    if actual != root {
        return Err(SitemapError::parse(format!(
            "expected <{root}> root element, found <{actual}>"
        )));
    }
    Ok(doc)
}

/// Child elements of `node` named `name`.
pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Trimmed text of the first child element named `name`, if non-empty.
pub(crate) fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    children(node, name)
        .next()
        .and_then(|c| c.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Like [`child_text`] but a missing or empty element is a parse error.
pub(crate) fn required_text(node: Node<'_, '_>, name: &str) -> Result<String> {
    child_text(node, name).ok_or_else(|| {
        SitemapError::parse(format!(
            "<{}> is missing <{name}>",
            node.tag_name().name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_child_text() {
        let doc = parse_document(
            "<Page><categoryItem><path> news </path><name></name></categoryItem></Page>",
            "Page",
        )
        .unwrap();
        let item = children(doc.root_element(), "categoryItem").next().unwrap();
        assert_eq!(child_text(item, "path").as_deref(), Some("news"));
        assert_eq!(child_text(item, "name"), None);
        assert!(required_text(item, "displayName").is_err());
    }

    #[test]
    fn rejects_wrong_root() {
        let err = parse_document("<shows/>", "Page").unwrap_err();
        assert!(err.to_string().contains("<Page>"));
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(parse_document("<Page><unclosed></Page>", "Page").is_err());
    }
}
