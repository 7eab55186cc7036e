use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// CSS selectors describing a watched page's price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySelectors {
    /// Matches every row of the list, header included.
    pub row: String,
    /// Class marking the header row.
    pub header_class: String,
    /// Attribute holding the item id, on the row or a descendant.
    pub id_attribute: String,
    pub name: String,
    /// Present inside a row when the item is out of stock.
    pub out_of_stock: String,
    /// Present inside a row when the item is already in the delivery cart.
    pub reserved: String,
}

impl Default for InventorySelectors {
    fn default() -> Self {
        Self {
            row: "#main .price-list > *".to_string(),
            header_class: "header".to_string(),
            id_attribute: "data-id".to_string(),
            name: ".name".to_string(),
            out_of_stock: ".stock.out".to_string(),
            reserved: ".delivery .delivery-count".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FulfillmentSelectors {
    pub in_progress: String,
    pub reserved_count: String,
}

impl Default for FulfillmentSelectors {
    fn default() -> Self {
        Self {
            in_progress: ".delivery-in-progress".to_string(),
            reserved_count: ".delivery-summary .count".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid selector {selector:?}: {message}")]
pub struct SelectorError {
    pub selector: String,
    pub message: String,
}

fn parse_selector(selector: &str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|err| SelectorError {
        selector: selector.to_string(),
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRow {
    pub id: String,
    pub name: String,
    pub in_stock: bool,
    pub already_reserved: bool,
}

pub trait InventoryReader: Send + Sync {
    fn scan(&self, html: &str) -> Vec<ScannedRow>;
}

/// Reads rows with configurable selectors. Rows without an id are skipped.
#[derive(Debug)]
pub struct SelectorInventoryReader {
    row: Selector,
    id_holder: Selector,
    name: Selector,
    out_of_stock: Selector,
    reserved: Selector,
    header_class: String,
    id_attribute: String,
}

impl SelectorInventoryReader {
    pub fn new(selectors: &InventorySelectors) -> Result<Self, SelectorError> {
        Ok(Self {
            row: parse_selector(&selectors.row)?,
            id_holder: parse_selector(&format!("[{}]", selectors.id_attribute))?,
            name: parse_selector(&selectors.name)?,
            out_of_stock: parse_selector(&selectors.out_of_stock)?,
            reserved: parse_selector(&selectors.reserved)?,
            header_class: selectors.header_class.clone(),
            id_attribute: selectors.id_attribute.clone(),
        })
    }

    fn read_row(&self, row: ElementRef<'_>) -> Option<ScannedRow> {
        if row.value().classes().any(|class| class == self.header_class) {
            return None;
        }
        let id = row
            .value()
            .attr(&self.id_attribute)
            .or_else(|| {
                row.select(&self.id_holder)
                    .find_map(|holder| holder.value().attr(&self.id_attribute))
            })?
            .trim()
            .to_string();
        if id.is_empty() {
            return None;
        }
        let name = row
            .select(&self.name)
            .next()
            .map(|node| collapse_whitespace(&node.text().collect::<String>()))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.clone());

        Some(ScannedRow {
            in_stock: row.select(&self.out_of_stock).next().is_none(),
            already_reserved: row.select(&self.reserved).next().is_some(),
            id,
            name,
        })
    }
}

impl InventoryReader for SelectorInventoryReader {
    fn scan(&self, html: &str) -> Vec<ScannedRow> {
        let doc = Html::parse_document(html);
        doc.select(&self.row)
            .filter_map(|row| self.read_row(row))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FulfillmentPageState {
    pub in_progress: bool,
    pub reserved_count: u32,
}

#[derive(Debug)]
pub struct FulfillmentPageReader {
    in_progress: Selector,
    reserved_count: Selector,
}

impl FulfillmentPageReader {
    pub fn new(selectors: &FulfillmentSelectors) -> Result<Self, SelectorError> {
        Ok(Self {
            in_progress: parse_selector(&selectors.in_progress)?,
            reserved_count: parse_selector(&selectors.reserved_count)?,
        })
    }

    /// A missing or non-numeric count reads as zero.
    pub fn inspect(&self, html: &str) -> FulfillmentPageState {
        let doc = Html::parse_document(html);
        let reserved_count = doc
            .select(&self.reserved_count)
            .next()
            .map(|node| {
                node.text()
                    .flat_map(str::chars)
                    .filter(char::is_ascii_digit)
                    .collect::<String>()
            })
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0);
        FulfillmentPageState {
            in_progress: doc.select(&self.in_progress).next().is_some(),
            reserved_count,
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
