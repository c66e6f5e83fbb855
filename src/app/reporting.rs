use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::adapters::management_store::StoreError;
use crate::adapters::sqlite_store::SqliteStore;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::domain::duration::{format_seconds, to_seconds};
use crate::domain::models::BatteryRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAverage {
    pub system_manufacturer: Option<String>,
    pub system_product_name: Option<String>,
    pub machine_count: usize,
    pub average_design_capacity: f64,
    pub average_full_charge_capacity: f64,
    pub average_cycle_count: f64,
    pub average_active_runtime: String,
    pub average_active_runtime_at_design_capacity: String,
    pub average_modern_standby: String,
    pub average_modern_standby_at_design_capacity: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportDocument {
    generated_at: String,
    namespace: String,
    class_name: String,
    machines: Vec<BatteryRecord>,
    models: Vec<ModelAverage>,
}

pub fn list_battery_records(
    store: &SqliteStore,
    namespace: &str,
    class: &str,
) -> Result<Vec<BatteryRecord>, StoreError> {
    Ok(store
        .list_records(namespace, class)?
        .iter()
        .map(|(key, values)| BatteryRecord::from_field_values(key, values))
        .collect())
}

pub fn model_averages(records: &[BatteryRecord]) -> Vec<ModelAverage> {
    let mut groups: BTreeMap<(Option<String>, Option<String>), Vec<&BatteryRecord>> =
        BTreeMap::new();
    for record in records {
        groups
            .entry((
                record.system_manufacturer.clone(),
                record.system_product_name.clone(),
            ))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .map(|((manufacturer, product_name), members)| ModelAverage {
            system_manufacturer: manufacturer,
            system_product_name: product_name,
            machine_count: members.len(),
            average_design_capacity: mean(&members, |record| record.design_capacity),
            average_full_charge_capacity: mean(&members, |record| record.full_charge_capacity),
            average_cycle_count: mean(&members, |record| record.cycle_count),
            average_active_runtime: mean_duration(&members, |record| record.active_runtime.as_str()),
            average_active_runtime_at_design_capacity: mean_duration(&members, |record| {
                record.active_runtime_at_design_capacity.as_str()
            }),
            average_modern_standby: mean_duration(&members, |record| record.modern_standby.as_str()),
            average_modern_standby_at_design_capacity: mean_duration(&members, |record| {
                record.modern_standby_at_design_capacity.as_str()
            }),
        })
        .collect()
}

fn mean(members: &[&BatteryRecord], value: impl Fn(&BatteryRecord) -> u32) -> f64 {
    let total: f64 = members.iter().map(|&record| f64::from(value(record))).sum();
    total / members.len() as f64
}

fn mean_duration(members: &[&BatteryRecord], value: impl Fn(&BatteryRecord) -> &str) -> String {
    let total: u64 = members
        .iter()
        .map(|&record| to_seconds(value(record)).unwrap_or(0))
        .sum();
    let count = members.len() as u64;
    format_seconds((total + count / 2) / count)
}

pub fn run(config: AppConfig) -> Result<(), AppError> {
    let store = SqliteStore::open_read_only(&config.store_path).map_err(AppError::store)?;

    let machines = list_battery_records(&store, &config.namespace, &config.class_name)
        .map_err(AppError::report)?;
    let models = model_averages(&machines);

    tracing::info!(
        machines = machines.len(),
        models = models.len(),
        "battery report assembled"
    );

    let document = ReportDocument {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        namespace: config.namespace,
        class_name: config.class_name,
        machines,
        models,
    };
    let rendered = serde_json::to_string_pretty(&document).map_err(AppError::report)?;
    println!("{rendered}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{list_battery_records, model_averages};
    use crate::app::services::{ensure_schema, upsert_record};
    use crate::domain::models::BatteryRecord;
    use crate::domain::schema::BATTERY_FIELDS;
    use crate::test_support::{TEST_CLASS, TEST_NAMESPACE, open_test_store};

    fn record(name: &str, product: &str, cycles: u32, runtime: &str) -> BatteryRecord {
        BatteryRecord {
            computer_name: name.to_string(),
            system_manufacturer: Some("LENOVO".to_string()),
            system_product_name: Some(product.to_string()),
            design_capacity: 50_000,
            full_charge_capacity: 40_000 + cycles,
            cycle_count: cycles,
            active_runtime: runtime.to_string(),
            active_runtime_at_design_capacity: "06:00:00".to_string(),
            modern_standby: "1:00:00:00".to_string(),
            modern_standby_at_design_capacity: "00:00:00".to_string(),
        }
    }

    #[test]
    fn averages_numbers_and_durations_per_model() {
        let records = vec![
            record("A", "T14", 100, "05:00:00"),
            record("B", "T14", 201, "06:00:01"),
            record("C", "X1", 10, "01:00:00"),
        ];

        let averages = model_averages(&records);

        assert_eq!(averages.len(), 2);
        let t14 = &averages[0];
        assert_eq!(t14.system_product_name.as_deref(), Some("T14"));
        assert_eq!(t14.machine_count, 2);
        assert_eq!(t14.average_cycle_count, 150.5);
        assert_eq!(t14.average_full_charge_capacity, 40_150.5);
        assert_eq!(t14.average_active_runtime, "05:30:01");
        assert_eq!(t14.average_modern_standby, "24:00:00");
        assert_eq!(averages[1].machine_count, 1);
    }

    #[test]
    fn lists_persisted_records_by_computer_name() {
        let store = open_test_store("reporting-list");
        ensure_schema(&store, TEST_NAMESPACE, TEST_CLASS, BATTERY_FIELDS)
            .expect("provisioning should succeed");
        for entry in [
            record("HOST-02", "T14", 3, "04:00:00"),
            record("HOST-01", "T14", 5, "05:00:00"),
        ] {
            upsert_record(
                &store,
                TEST_NAMESPACE,
                TEST_CLASS,
                &entry.computer_name,
                &entry.to_field_values(),
            )
            .expect("upsert should succeed");
        }

        let listed = list_battery_records(&store, TEST_NAMESPACE, TEST_CLASS)
            .expect("listing should work");

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], record("HOST-01", "T14", 5, "05:00:00"));
        assert_eq!(listed[1].computer_name, "HOST-02");
    }
}
