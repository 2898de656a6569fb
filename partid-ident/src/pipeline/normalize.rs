//! Contract response → canonical field set
//!
//! Both depths collapse into `RecordFields`, which always carries every
//! field of the canonical record. Basic answers get empty defaults for all
//! Advanced-only fields.

use reqwest::Url;

use crate::models::{Confidence, Pin, Specification};
use crate::recognition::contract::{AdvancedResponse, BasicResponse, WirePin, WireSpecification};
use crate::recognition::ContractResponse;

/// Depth-independent validated fields, minus identity/time/image
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    pub name: String,
    pub category: String,
    pub description: String,
    pub manufacturer: String,
    pub package_type: String,
    pub application_category: String,
    pub key_features: Vec<String>,
    pub substitutes: Vec<String>,
    pub functional_blocks: Vec<String>,
    pub pinout: Vec<Pin>,
    pub specifications: Vec<Specification>,
    pub common_usage: String,
    pub confidence: Confidence,
    pub datasheet_url: String,
}

impl RecordFields {
    /// Required fields only; everything else empty
    pub fn required(
        name: String,
        category: String,
        common_usage: String,
        confidence: Confidence,
    ) -> Self {
        Self {
            name,
            category,
            description: String::new(),
            manufacturer: String::new(),
            package_type: String::new(),
            application_category: String::new(),
            key_features: Vec::new(),
            substitutes: Vec::new(),
            functional_blocks: Vec::new(),
            pinout: Vec::new(),
            specifications: Vec::new(),
            common_usage,
            confidence,
            datasheet_url: String::new(),
        }
    }

    /// Name of the first required field that is blank, if any
    pub fn missing_required(&self) -> Option<&'static str> {
        if self.name.is_empty() {
            Some("name")
        } else if self.category.is_empty() {
            Some("type")
        } else if self.common_usage.is_empty() {
            Some("commonUsage")
        } else {
            None
        }
    }
}

pub fn normalize(response: ContractResponse) -> RecordFields {
    match response {
        ContractResponse::Basic(basic) => from_basic(basic),
        ContractResponse::Advanced(advanced) => from_advanced(advanced),
    }
}

fn from_basic(r: BasicResponse) -> RecordFields {
    RecordFields::required(
        clean(r.name),
        clean(r.category),
        clean(r.common_usage),
        r.confidence,
    )
}

fn from_advanced(r: AdvancedResponse) -> RecordFields {
    RecordFields {
        name: clean(r.name),
        category: clean(r.category),
        description: clean_opt(r.description),
        manufacturer: clean_opt(r.manufacturer),
        package_type: clean_opt(r.package_type),
        application_category: clean_opt(r.application_category),
        key_features: clean_list(r.key_features),
        substitutes: clean_list(r.substitutes),
        functional_blocks: clean_list(r.functional_blocks),
        pinout: clean_pinout(r.pinout),
        specifications: clean_specifications(r.specifications),
        common_usage: clean(r.common_usage),
        confidence: r.confidence,
        datasheet_url: clean_url(r.datasheet_url),
    }
}

fn clean(value: String) -> String {
    value.trim().to_string()
}

fn clean_opt(value: Option<String>) -> String {
    value.map(clean).unwrap_or_default()
}

fn clean_list(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .map(clean)
        .filter(|v| !v.is_empty())
        .collect()
}

fn clean_pinout(pins: Option<Vec<WirePin>>) -> Vec<Pin> {
    pins.unwrap_or_default()
        .into_iter()
        .filter_map(|pin| {
            let pin_number = u32::try_from(pin.pin_number).ok().filter(|n| *n > 0)?;
            Some(Pin {
                pin_number,
                pin_name: clean_opt(pin.pin_name),
                pin_description: clean_opt(pin.pin_description),
            })
        })
        .collect()
}

// Order is display order; duplicate names are kept
fn clean_specifications(specs: Vec<WireSpecification>) -> Vec<Specification> {
    specs
        .into_iter()
        .map(|s| Specification {
            name: clean(s.name),
            value: clean(s.value),
        })
        .filter(|s| !s.name.is_empty())
        .collect()
}

fn clean_url(url: Option<String>) -> String {
    let url = clean_opt(url);
    match Url::parse(&url) {
        Ok(parsed)
            if matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|host| !host.is_empty()) =>
        {
            parsed.as_str().to_string()
        }
        _ => String::new(),
    }
}
