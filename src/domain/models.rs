use serde::Serialize;

use crate::domain::battery_report::ParsedReport;
use crate::domain::duration::{ZERO_DURATION, normalize};
use crate::domain::schema::{
    FIELD_ACTIVE_RUNTIME, FIELD_ACTIVE_RUNTIME_AT_DESIGN, FIELD_CYCLE_COUNT, FIELD_DESIGN_CAPACITY,
    FIELD_FULL_CHARGE_CAPACITY, FIELD_MODERN_STANDBY, FIELD_MODERN_STANDBY_AT_DESIGN,
    FIELD_SYSTEM_MANUFACTURER, FIELD_SYSTEM_PRODUCT_NAME, FieldValue, FieldValues,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryRecord {
    pub computer_name: String,
    pub system_manufacturer: Option<String>,
    pub system_product_name: Option<String>,
    pub design_capacity: u32,
    pub full_charge_capacity: u32,
    pub cycle_count: u32,
    pub active_runtime: String,
    pub active_runtime_at_design_capacity: String,
    pub modern_standby: String,
    pub modern_standby_at_design_capacity: String,
}

impl BatteryRecord {
    pub fn from_parsed(report: &ParsedReport) -> Self {
        Self {
            computer_name: report.computer_name.clone(),
            system_manufacturer: report.system_manufacturer.clone(),
            system_product_name: report.system_product_name.clone(),
            design_capacity: report.design_capacity,
            full_charge_capacity: report.full_charge_capacity,
            cycle_count: report.cycle_count,
            active_runtime: normalize(report.runtimes.active_runtime.as_deref()),
            active_runtime_at_design_capacity: normalize(
                report.runtimes.active_runtime_at_design_capacity.as_deref(),
            ),
            modern_standby: normalize(report.runtimes.modern_standby.as_deref()),
            modern_standby_at_design_capacity: normalize(
                report.runtimes.modern_standby_at_design_capacity.as_deref(),
            ),
        }
    }

    pub fn to_field_values(&self) -> FieldValues {
        let optional_text = |value: &Option<String>| {
            value
                .clone()
                .map(FieldValue::Text)
                .unwrap_or(FieldValue::Null)
        };

        FieldValues::from([
            (
                FIELD_SYSTEM_MANUFACTURER.to_string(),
                optional_text(&self.system_manufacturer),
            ),
            (
                FIELD_SYSTEM_PRODUCT_NAME.to_string(),
                optional_text(&self.system_product_name),
            ),
            (
                FIELD_DESIGN_CAPACITY.to_string(),
                FieldValue::UInt32(self.design_capacity),
            ),
            (
                FIELD_FULL_CHARGE_CAPACITY.to_string(),
                FieldValue::UInt32(self.full_charge_capacity),
            ),
            (
                FIELD_CYCLE_COUNT.to_string(),
                FieldValue::UInt32(self.cycle_count),
            ),
            (
                FIELD_ACTIVE_RUNTIME.to_string(),
                FieldValue::Text(self.active_runtime.clone()),
            ),
            (
                FIELD_ACTIVE_RUNTIME_AT_DESIGN.to_string(),
                FieldValue::Text(self.active_runtime_at_design_capacity.clone()),
            ),
            (
                FIELD_MODERN_STANDBY.to_string(),
                FieldValue::Text(self.modern_standby.clone()),
            ),
            (
                FIELD_MODERN_STANDBY_AT_DESIGN.to_string(),
                FieldValue::Text(self.modern_standby_at_design_capacity.clone()),
            ),
        ])
    }

    pub fn from_field_values(computer_name: &str, values: &FieldValues) -> Self {
        let text = |name: &str| {
            values
                .get(name)
                .and_then(FieldValue::as_text)
                .map(str::to_string)
        };
        let number = |name: &str| values.get(name).and_then(FieldValue::as_u32).unwrap_or(0);
        let duration = |name: &str| text(name).unwrap_or_else(|| ZERO_DURATION.to_string());

        Self {
            computer_name: computer_name.to_string(),
            system_manufacturer: text(FIELD_SYSTEM_MANUFACTURER),
            system_product_name: text(FIELD_SYSTEM_PRODUCT_NAME),
            design_capacity: number(FIELD_DESIGN_CAPACITY),
            full_charge_capacity: number(FIELD_FULL_CHARGE_CAPACITY),
            cycle_count: number(FIELD_CYCLE_COUNT),
            active_runtime: duration(FIELD_ACTIVE_RUNTIME),
            active_runtime_at_design_capacity: duration(FIELD_ACTIVE_RUNTIME_AT_DESIGN),
            modern_standby: duration(FIELD_MODERN_STANDBY),
            modern_standby_at_design_capacity: duration(FIELD_MODERN_STANDBY_AT_DESIGN),
        }
    }
}
