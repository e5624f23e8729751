//! Feed access: download ([`fetch`]) and flattening into a table ([`xml`]).

pub mod fetch;
pub mod xml;

pub use fetch::{FeedSource, HttpFeedSource};
pub use xml::{extract_table, extract_table_from_bytes};

use crate::error::{PipelineError, PipelineResult};

/// Dataset name used for output files: the last non-empty path segment of the feed URL.
///
/// `https://api.nanaimo.ca/dataservice/v1/sql/BusinessLicences/` gives `BusinessLicences`.
pub fn dataset_name_from_url(feed_url: &str) -> PipelineResult<String> {
    let parsed = url::Url::parse(feed_url)
        .map_err(|e| PipelineError::config(format!("invalid feed url '{feed_url}': {e}")))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_owned)
        .ok_or_else(|| PipelineError::config(format!("feed url '{feed_url}' has no path to name the dataset")))
}

#[cfg(test)]
mod tests {
    use super::dataset_name_from_url;

    #[test]
    fn dataset_name_ignores_trailing_slash() {
        assert_eq!(
            dataset_name_from_url("https://api.nanaimo.ca/dataservice/v1/sql/BusinessLicences/").unwrap(),
            "BusinessLicences"
        );
        assert_eq!(
            dataset_name_from_url("http://api.nanaimo.ca/dataservice/v1/sql/Construction").unwrap(),
            "Construction"
        );
    }

    #[test]
    fn dataset_name_requires_a_path() {
        assert!(dataset_name_from_url("https://api.nanaimo.ca/").is_err());
        assert!(dataset_name_from_url("not a url").is_err());
    }
}
