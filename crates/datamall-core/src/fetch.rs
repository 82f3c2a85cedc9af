use serde_json::Value;
use tracing::{debug, info};

use crate::client::{PageSource, Record};
use crate::error::DataMallError;
use crate::period::ReportPeriod;

const SKIP_PARAM: &str = "$skip";
const DATE_PARAM: &str = "Date";
const LINK_FIELD: &str = "Link";

/// Fetch every record of a resource, advancing `$skip` until a page comes back empty.
///
/// There is no upper bound on the number of requests: an endpoint that never returns an
/// empty page keeps this loop running.
pub fn fetch_all<S: PageSource>(
    source: &S,
    sub_path: &str,
    extra: &[(&str, String)],
) -> Result<Vec<Record>, DataMallError> {
    let mut results: Vec<Record> = Vec::new();
    let mut pages = 0usize;

    loop {
        let mut query = Vec::with_capacity(extra.len() + 1);
        query.push((SKIP_PARAM, results.len().to_string()));
        query.extend(extra.iter().cloned());

        let page = source.fetch_page(sub_path, &query)?;
        pages += 1;
        debug!(sub_path, skip = results.len(), size = page.len(), "page received");

        if page.is_empty() {
            break;
        }
        results.extend(page);
    }

    info!(sub_path, records = results.len(), requests = pages, "fetch complete");
    Ok(results)
}

/// Fetch a single page for a report-style resource and return the first record's `Link`.
pub fn fetch_report_link<S: PageSource>(
    source: &S,
    sub_path: &str,
    dataset: &'static str,
    period: Option<ReportPeriod>,
) -> Result<String, DataMallError> {
    let mut query = vec![(SKIP_PARAM, "0".to_string())];
    if let Some(period) = period {
        query.push((DATE_PARAM, period.stamp()));
    }

    let records = source.fetch_page(sub_path, &query)?;
    let first = records.first().ok_or_else(|| DataMallError::EmptyResult {
        dataset,
        period: period.map(|p| p.stamp()),
    })?;

    match first.get(LINK_FIELD) {
        Some(Value::String(link)) if !link.trim().is_empty() => {
            info!(dataset, link = %link, "report link received");
            Ok(link.clone())
        }
        _ => Err(DataMallError::malformed(
            &source.resource_url(sub_path),
            format!("first record of {dataset} has no '{LINK_FIELD}' string"),
        )),
    }
}
