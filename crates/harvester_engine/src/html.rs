//! Rendered result pages: selector catalog cards into raw JSON records.
use harvester_core::{HtmlCatalog, RawPage};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::transport::TransportError;

/// Checks every selector of a catalog up front, so a typo fails at startup
/// rather than as an empty harvest.
pub fn validate_catalog(catalog: &HtmlCatalog) -> Result<(), TransportError> {
    compile(&catalog.card)?;
    compile(&catalog.page_links)?;
    for field in &catalog.fields {
        compile(&field.selector)?;
    }
    Ok(())
}

/// Turns every card of the page into a record of its catalog fields, and
/// reports whether a link to `current_page + 1` is rendered.
///
/// The body is a top-level list, so the default record path `$` finds it.
pub fn parse_cards(
    html: &str,
    catalog: &HtmlCatalog,
    current_page: u32,
) -> Result<RawPage, TransportError> {
    let document = Html::parse_document(html);
    let card_selector = compile(&catalog.card)?;
    let fields = catalog
        .fields
        .iter()
        .map(|field| Ok((field, compile(&field.selector)?)))
        .collect::<Result<Vec<_>, TransportError>>()?;

    let cards: Vec<Value> = document
        .select(&card_selector)
        .map(|card| {
            let record: Map<String, Value> = fields
                .iter()
                .map(|(field, selector)| {
                    let value = card
                        .select(selector)
                        .next()
                        .and_then(|element| match &field.attr {
                            Some(attr) => element.value().attr(attr).map(str::to_string),
                            None => Some(element_text(element)),
                        })
                        .map(|text| text.trim().to_string())
                        .filter(|text| !text.is_empty())
                        .map_or(Value::Null, Value::String);
                    (field.name.clone(), value)
                })
                .collect();
            Value::Object(record)
        })
        .collect();

    let next_label = (current_page + 1).to_string();
    let link_selector = compile(&catalog.page_links)?;
    let has_next = document
        .select(&link_selector)
        .any(|link| element_text(link).trim() == next_label);

    Ok(RawPage::new(Value::Array(cards)).with_next_link(has_next))
}

/// Text content with runs of whitespace collapsed to one space.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn compile(selector: &str) -> Result<Selector, TransportError> {
    Selector::parse(selector).map_err(|err| TransportError::InvalidSelector {
        selector: selector.to_string(),
        message: err.to_string(),
    })
}
