//! Datasource rewriting
//!
//! Points every datasource of a [`SimulatorConfig`] at the local DynamoDB
//! simulator.

use super::processor::SimulatorConfig;

/// Token separating the model name from the rest of a generated datasource name
const TABLE_TOKEN: &str = "Table";

/// Where rewritten datasources point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTarget {
    /// DynamoDB endpoint, e.g. `http://localhost:62226`
    pub endpoint: String,
    pub region: String,
    /// Table prefix, e.g. `notespulumi_local`
    pub table_prefix: String,
}

/// Local table name for a generated datasource name
///
/// The model part is everything before the first `"Table"`; a name without
/// the token is used whole. This intentionally differs from the Amplify
/// simulator scripts, which slice up to the missing index and end up with an
/// empty model part (`"<prefix>."`).
///
/// ```
/// use nuage_local::appsync::local_table_name;
///
/// assert_eq!(local_table_name("notespulumi_local", "NoteTable"), "notespulumi_local.Note");
/// assert_eq!(local_table_name("notespulumi_local", "Notes"), "notespulumi_local.Notes");
/// ```
pub fn local_table_name(table_prefix: &str, data_source_name: &str) -> String {
    let model = match data_source_name.find(TABLE_TOKEN) {
        Some(idx) => &data_source_name[..idx],
        None => {
            log::warn!(
                "Datasource '{}' has no '{}' suffix, using the full name",
                data_source_name,
                TABLE_TOKEN
            );
            data_source_name
        }
    };
    format!("{}.{}", table_prefix, model)
}

/// Rewrite endpoint, region and table name of every datasource
pub fn rewrite_data_sources(config: &mut SimulatorConfig, target: &LocalTarget) {
    for data_source in &mut config.data_sources {
        let table_name = local_table_name(&target.table_prefix, &data_source.name);
        log::debug!(
            "Datasource {} -> table {} at {}",
            data_source.name,
            table_name,
            target.endpoint
        );

        data_source.config.endpoint = Some(target.endpoint.clone());
        data_source.config.region = Some(target.region.clone());
        data_source.config.table_name = table_name;
    }
}
