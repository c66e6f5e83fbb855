use roxmltree::{Document, Node};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReport {
    pub shape: ReportShape,
    pub report_time: Option<String>,
    pub computer_name: String,
    pub system_manufacturer: Option<String>,
    pub system_product_name: Option<String>,
    pub design_capacity: u32,
    pub full_charge_capacity: u32,
    pub cycle_count: u32,
    pub runtimes: RuntimeEstimates,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeEstimates {
    pub active_runtime: Option<String>,
    pub active_runtime_at_design_capacity: Option<String>,
    pub modern_standby: Option<String>,
    pub modern_standby_at_design_capacity: Option<String>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("structured report is not valid XML: {0}")]
    InvalidDocument(String),
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),
    #[error("failed to read structured report")]
    Io(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportShape {
    V1,
    V2,
}

const IDENTITY_PATH: &[&str] = &["SystemInformation", "ComputerName"];
const MANUFACTURER_PATH: &[&str] = &["SystemInformation", "SystemManufacturer"];
const PRODUCT_NAME_PATH: &[&str] = &["SystemInformation", "SystemProductName"];
const REPORT_TIME_PATH: &[&str] = &["ReportInformation", "ReportTime"];
const BATTERY_PATH: &[&str] = &["Batteries", "Battery"];
const RUNTIME_ESTIMATES: &str = "RuntimeEstimates";

const STANDBY_KEYS: &[&str] = &["ModernStandby", "ConnectedStandby"];
const STANDBY_AT_DESIGN_KEYS: &[&str] = &[
    "ModernStandbyAtDesignCapacity",
    "ConnectedStandbyAtDesignCapacity",
];

impl ReportShape {
    pub fn detect(root: Node<'_, '_>) -> Self {
        let Some(estimates) = child(root, RUNTIME_ESTIMATES) else {
            return Self::V2;
        };

        if child(estimates, "FullChargeCapacity").is_some()
            || child(estimates, "DesignCapacity").is_some()
        {
            Self::V2
        } else {
            Self::V1
        }
    }

    pub fn extract_runtimes(self, root: Node<'_, '_>) -> RuntimeEstimates {
        let Some(estimates) = child(root, RUNTIME_ESTIMATES) else {
            return RuntimeEstimates::default();
        };

        match self {
            Self::V1 => RuntimeEstimates {
                active_runtime: first_text(estimates, &["ActiveRuntime"]),
                active_runtime_at_design_capacity: first_text(
                    estimates,
                    &["ActiveRuntimeAtDesignCapacity"],
                ),
                modern_standby: first_text(estimates, STANDBY_KEYS),
                modern_standby_at_design_capacity: first_text(estimates, STANDBY_AT_DESIGN_KEYS),
            },
            Self::V2 => {
                let full_charge = child(estimates, "FullChargeCapacity");
                let design = child(estimates, "DesignCapacity");

                RuntimeEstimates {
                    active_runtime: full_charge.and_then(|node| first_text(node, &["ActiveRuntime"])),
                    active_runtime_at_design_capacity: design
                        .and_then(|node| first_text(node, &["ActiveRuntime"])),
                    modern_standby: full_charge.and_then(|node| first_text(node, STANDBY_KEYS)),
                    modern_standby_at_design_capacity: design
                        .and_then(|node| first_text(node, STANDBY_KEYS)),
                }
            }
        }
    }
}

pub fn parse_battery_report(xml: &str) -> Result<ParsedReport, ParseError> {
    let document =
        Document::parse(xml).map_err(|error| ParseError::InvalidDocument(error.to_string()))?;
    let root = document.root_element();

    let computer_name = text_at(root, IDENTITY_PATH)
        .ok_or(ParseError::MissingRequiredField("SystemInformation/ComputerName"))?;

    let shape = ReportShape::detect(root);
    let battery = descend(root, BATTERY_PATH);

    Ok(ParsedReport {
        shape,
        report_time: text_at(root, REPORT_TIME_PATH),
        computer_name,
        system_manufacturer: text_at(root, MANUFACTURER_PATH),
        system_product_name: text_at(root, PRODUCT_NAME_PATH),
        design_capacity: battery_number(battery, "DesignCapacity"),
        full_charge_capacity: battery_number(battery, "FullChargeCapacity"),
        cycle_count: battery_number(battery, "CycleCount"),
        runtimes: shape.extract_runtimes(root),
    })
}

fn battery_number(battery: Option<Node<'_, '_>>, name: &'static str) -> u32 {
    let Some(raw) = battery.and_then(|node| first_text(node, &[name])) else {
        return 0;
    };

    match raw.parse::<u32>() {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(field = name, value = %raw, error = %error, "numeric field unparsable, using 0");
            0
        }
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|candidate| candidate.is_element() && candidate.tag_name().name() == name)
}

fn descend<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Option<Node<'a, 'input>> {
    path.iter()
        .try_fold(node, |current, segment| child(current, segment))
}

fn text_at(node: Node<'_, '_>, path: &[&str]) -> Option<String> {
    descend(node, path).and_then(element_text)
}

fn first_text(node: Node<'_, '_>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| child(node, name).and_then(element_text))
}

fn element_text(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
