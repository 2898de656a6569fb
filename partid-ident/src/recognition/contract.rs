//! Depth-specific response contracts
//!
//! `Basic` asks for name, category, usage summary and confidence.
//! `Advanced` asks for the full field set, including pinout and substitutes.
//! Parsing is strict about required keys and the confidence vocabulary;
//! anything the contract marks optional defaults to absent.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{AnalysisLevel, Confidence};

const CONFIDENCE_VALUES: [&str; 4] = ["High", "Medium", "Low", "Uncertain"];

const BASIC_INSTRUCTIONS: &str = "Analyze the image of the electronic component. \
Identify it and provide its name, its general category, a brief summary of what it is \
commonly used for, and your confidence, according to the JSON schema. \
If the component is unidentifiable, set confidence to 'Uncertain' and explain in \
commonUsage why it could not be identified.";

const ADVANCED_INSTRUCTIONS: &str = "Analyze the image of the electronic component in detail. \
Identify it and provide its details according to the JSON schema: name, category, \
description, manufacturer, package type, application category, key features, \
specifications, pinout with pin numbers and functions, functional blocks, common \
substitutes, and common usage. Find a direct URL to its PDF datasheet. \
If the component is unidentifiable, set confidence to 'Uncertain', explain in commonUsage \
why it could not be identified, and return empty arrays for specifications.";

/// Response contract selected by analysis depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseContract {
    level: AnalysisLevel,
}

impl ResponseContract {
    pub fn for_level(level: AnalysisLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> AnalysisLevel {
        self.level
    }

    /// Instruction text sent alongside the image
    pub fn instructions(&self) -> &'static str {
        match self.level {
            AnalysisLevel::Basic => BASIC_INSTRUCTIONS,
            AnalysisLevel::Advanced => ADVANCED_INSTRUCTIONS,
        }
    }

    /// Structured-output schema for the service
    pub fn response_schema(&self) -> Value {
        match self.level {
            AnalysisLevel::Basic => basic_schema(),
            AnalysisLevel::Advanced => advanced_schema(),
        }
    }

    /// Parse the raw answer text per this contract
    ///
    /// A Markdown code fence around the JSON is tolerated.
    pub fn parse(&self, raw: &str) -> Result<ContractResponse, String> {
        let body = strip_code_fence(raw);
        match self.level {
            AnalysisLevel::Basic => serde_json::from_str::<BasicResponse>(body)
                .map(ContractResponse::Basic)
                .map_err(|e| format!("basic contract violated: {}", e)),
            AnalysisLevel::Advanced => serde_json::from_str::<AdvancedResponse>(body)
                .map(ContractResponse::Advanced)
                .map_err(|e| format!("advanced contract violated: {}", e)),
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Basic contract answer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicResponse {
    pub name: String,
    #[serde(rename = "type", alias = "category")]
    pub category: String,
    pub common_usage: String,
    pub confidence: Confidence,
}

/// Advanced contract answer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedResponse {
    pub name: String,
    #[serde(rename = "type", alias = "category")]
    pub category: String,
    pub common_usage: String,
    pub confidence: Confidence,
    pub specifications: Vec<WireSpecification>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub application_category: Option<String>,
    #[serde(default)]
    pub key_features: Option<Vec<String>>,
    #[serde(default)]
    pub substitutes: Option<Vec<String>>,
    #[serde(default)]
    pub functional_blocks: Option<Vec<String>>,
    #[serde(default)]
    pub pinout: Option<Vec<WirePin>>,
    #[serde(default)]
    pub datasheet_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireSpecification {
    #[serde(rename = "specName", alias = "name")]
    pub name: String,
    #[serde(rename = "specValue", alias = "value")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePin {
    pub pin_number: i64,
    #[serde(default)]
    pub pin_name: Option<String>,
    #[serde(default)]
    pub pin_description: Option<String>,
}

/// Parsed answer of either depth
#[derive(Debug, Clone, PartialEq)]
pub enum ContractResponse {
    Basic(BasicResponse),
    Advanced(AdvancedResponse),
}

impl ContractResponse {
    pub fn confidence(&self) -> Confidence {
        match self {
            ContractResponse::Basic(r) => r.confidence,
            ContractResponse::Advanced(r) => r.confidence,
        }
    }

    pub fn common_usage(&self) -> &str {
        match self {
            ContractResponse::Basic(r) => &r.common_usage,
            ContractResponse::Advanced(r) => &r.common_usage,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ContractResponse::Basic(r) => &r.name,
            ContractResponse::Advanced(r) => &r.name,
        }
    }

    pub fn category(&self) -> &str {
        match self {
            ContractResponse::Basic(r) => &r.category,
            ContractResponse::Advanced(r) => &r.category,
        }
    }
}

fn string_prop(description: &str) -> Value {
    json!({ "type": "STRING", "description": description })
}

fn string_list_prop(description: &str) -> Value {
    json!({ "type": "ARRAY", "description": description, "items": { "type": "STRING" } })
}

fn basic_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert(
        "name".into(),
        string_prop("The common name of the electronic component (e.g., '555 Timer IC')."),
    );
    props.insert(
        "type".into(),
        string_prop("The general category of the component (e.g., 'Integrated Circuit')."),
    );
    props.insert(
        "commonUsage".into(),
        string_prop(
            "A brief summary of what this component is commonly used for, or why it could not be identified.",
        ),
    );
    props.insert(
        "confidence".into(),
        json!({
            "type": "STRING",
            "description": "An assessment of the identification confidence.",
            "enum": CONFIDENCE_VALUES,
        }),
    );
    props
}

fn basic_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": Value::Object(basic_properties()),
        "required": ["name", "type", "commonUsage", "confidence"],
    })
}

fn advanced_schema() -> Value {
    let mut props = basic_properties();
    props.insert("description".into(), string_prop("A short technical description."));
    props.insert("manufacturer".into(), string_prop("Manufacturer, if identifiable."));
    props.insert(
        "packageType".into(),
        string_prop("Physical package (e.g., 'DIP-8', 'TO-92')."),
    );
    props.insert(
        "applicationCategory".into(),
        string_prop("Application domain (e.g., 'Power Management')."),
    );
    props.insert("keyFeatures".into(), string_list_prop("Notable features."));
    props.insert(
        "substitutes".into(),
        string_list_prop("Common drop-in substitutes or equivalents."),
    );
    props.insert(
        "functionalBlocks".into(),
        string_list_prop("Internal functional blocks."),
    );
    props.insert(
        "pinout".into(),
        json!({
            "type": "ARRAY",
            "description": "Pin assignments in pin-number order.",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "pinNumber": { "type": "INTEGER" },
                    "pinName": { "type": "STRING" },
                    "pinDescription": { "type": "STRING" },
                },
                "required": ["pinNumber", "pinName", "pinDescription"],
            },
        }),
    );
    props.insert(
        "specifications".into(),
        json!({
            "type": "ARRAY",
            "description": "A list of the component's specifications.",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "specName": string_prop("The name of the specification (e.g., 'Voltage')."),
                    "specValue": string_prop("The value of the specification (e.g., '5-15V')."),
                },
                "required": ["specName", "specValue"],
            },
        }),
    );
    props.insert(
        "datasheetUrl".into(),
        string_prop("A direct URL to the component's official PDF datasheet if available. Can be empty."),
    );

    json!({
        "type": "OBJECT",
        "properties": Value::Object(props),
        "required": ["name", "type", "specifications", "commonUsage", "confidence"],
    })
}
