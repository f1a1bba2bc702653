//! Markup helpers shared by the site adapters.

use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::ScrapeError;
use crate::models::{DoctorRecord, NOT_AVAILABLE, join_values};
use crate::traits::{DetailSelectors, FieldLocator};

/// Parse a CSS selector, reporting which one was invalid.
pub fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| ScrapeError::Selector(css.to_string()).into())
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match, if any.
pub fn first_text(document: &Html, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(document.select(&sel).next().map(element_text))
}

/// Non-empty texts of every match, in document order.
pub fn all_texts(document: &Html, css: &str) -> Result<Vec<String>> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect())
}

/// Text of the first `tag` element that follows, in document order, a text
/// node reading exactly `label`.
pub fn text_after_label(document: &Html, label: &str, tag: &str) -> Option<String> {
    let mut seen_label = false;
    for node in document.root_element().descendants() {
        if !seen_label {
            seen_label = node
                .value()
                .as_text()
                .is_some_and(|text| text.trim() == label);
            continue;
        }

        if let Some(element) = ElementRef::wrap(node)
            && element.value().name() == tag
        {
            return Some(element_text(element));
        }
    }
    None
}

/// First link inside each result card, resolved against `base`.
///
/// Cards without a matching link are skipped.
pub fn card_links(html: &str, base: &Url, card_css: &str, link_css: &str) -> Result<Vec<String>> {
    let card_sel = selector(card_css)?;
    let link_sel = selector(link_css)?;
    let document = Html::parse_document(html);

    document
        .select(&card_sel)
        .filter_map(|card| card.select(&link_sel).next())
        .filter_map(|link| link.value().attr("href"))
        .map(|href| absolute_url(base, href))
        .collect()
}

/// Resolve a possibly relative `href` against `base`.
pub fn absolute_url(base: &Url, href: &str) -> Result<String> {
    Ok(base.join(href.trim())?.to_string())
}

/// Values found by `locator`; an `AfterLabel` locator yields at most one.
pub fn locate_all(document: &Html, locator: &FieldLocator) -> Result<Vec<String>> {
    match locator {
        FieldLocator::Css(css) => all_texts(document, css),
        FieldLocator::AfterLabel { label, tag } => Ok(text_after_label(document, label, tag)
            .filter(|t| !t.is_empty())
            .into_iter()
            .collect()),
    }
}

/// Extract a [`DoctorRecord`] from a detail page.
///
/// Only the name is required; every other field falls back to `N/A`.
pub fn parse_detail(html: &str, selectors: &DetailSelectors) -> Result<DoctorRecord> {
    let document = Html::parse_document(html);

    let name = first_text(&document, &selectors.name)?
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ScrapeError::MissingElement(selectors.name.clone()))?;

    let specialty = join_values(locate_all(&document, &selectors.specialty)?);
    let unit = join_values(locate_all(&document, &selectors.unit)?);

    let registration_number = match &selectors.registration_number {
        Some(locator) => Some(
            locate_all(&document, locator)?
                .into_iter()
                .next()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        ),
        None => None,
    };

    Ok(DoctorRecord {
        name,
        specialty,
        unit,
        registration_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
        <html><body>
            <h1>
                Dra. Maria   Sousa
            </h1>
            <section>
                <h3>Áreas de Diferenciação</h3>
                <p>ignored</p>
                <div> Alergologia pediátrica </div>
            </section>
            <ul><li>One</li><li>  </li><li>Two</li></ul>
        </body></html>
    "#;

    #[test]
    fn collapses_whitespace_in_text() {
        let doc = Html::parse_document(DOC);
        assert_eq!(
            first_text(&doc, "h1").unwrap().as_deref(),
            Some("Dra. Maria Sousa")
        );
        assert_eq!(first_text(&doc, "h2").unwrap(), None);
    }

    #[test]
    fn skips_blank_entries() {
        let doc = Html::parse_document(DOC);
        assert_eq!(all_texts(&doc, "li").unwrap(), vec!["One", "Two"]);
    }

    #[test]
    fn finds_the_div_following_a_label() {
        let doc = Html::parse_document(DOC);
        assert_eq!(
            text_after_label(&doc, "Áreas de Diferenciação", "div").as_deref(),
            Some("Alergologia pediátrica")
        );
        assert_eq!(text_after_label(&doc, "Unidades", "div"), None);
    }

    #[test]
    fn resolves_relative_links() {
        let base = Url::parse("https://www.cuf.pt").unwrap();
        assert_eq!(
            absolute_url(&base, "/medicos/ana-silva").unwrap(),
            "https://www.cuf.pt/medicos/ana-silva"
        );
        assert_eq!(
            absolute_url(&base, "https://other.pt/x").unwrap(),
            "https://other.pt/x"
        );
    }

    fn detail_selectors() -> DetailSelectors {
        DetailSelectors {
            name: "h1".into(),
            specialty: FieldLocator::AfterLabel {
                label: "Áreas de Diferenciação".into(),
                tag: "div".into(),
            },
            unit: FieldLocator::Css("li".into()),
            registration_number: Some(FieldLocator::Css("span.order".into())),
        }
    }

    #[test]
    fn parses_detail_with_defaults_for_missing_fields() {
        let record = parse_detail(DOC, &detail_selectors()).unwrap();
        assert_eq!(record.name, "Dra. Maria Sousa");
        assert_eq!(record.specialty, "Alergologia pediátrica");
        assert_eq!(record.unit, "One | Two");
        assert_eq!(record.registration_number.as_deref(), Some("N/A"));
    }

    #[test]
    fn detail_without_heading_is_an_error() {
        let err = parse_detail("<html><body><p>gone</p></body></html>", &detail_selectors())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::MissingElement(_))
        ));
    }

    #[test]
    fn takes_the_first_link_of_each_card() {
        let html = r#"
            <div class="medic-card"><a href="/pt/medico/a">A</a><a href="/pt/marcar">book</a></div>
            <div class="medic-card"><span>no link</span></div>
            <div class="medic-card"><a href="/pt/medico/b">B</a></div>
        "#;
        let base = Url::parse("https://www.hospitaldaluz.pt").unwrap();
        let links = card_links(html, &base, ".medic-card", "a[href]").unwrap();
        assert_eq!(
            links,
            vec![
                "https://www.hospitaldaluz.pt/pt/medico/a",
                "https://www.hospitaldaluz.pt/pt/medico/b",
            ]
        );
    }

    #[test]
    fn rejects_bad_selectors() {
        let doc = Html::parse_document(DOC);
        let err = first_text(&doc, "div[").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::Selector(_))
        ));
    }
}
