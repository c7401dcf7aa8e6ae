//! Locator construction for storage resources.

use reqwest::Url;

use super::Database;
use crate::error::DmsError;

/// `{server}/{db}/{id}`. Design documents keep their `_design/` prefix as a
/// path segment.
pub fn document(db: &Database, id: &str) -> Result<Url, DmsError> {
    validate_id(id)?;
    let mut segments = vec![db.name()];
    match id.strip_prefix("_design/") {
        Some(name) => segments.extend(["_design", name]),
        None => segments.push(id),
    }
    join(db.server().url(), &segments)
}

/// `{server}/{db}/{doc}/{name}?rev={rev}`.
pub fn attachment(db: &Database, doc: &str, name: &str, rev: Option<&str>) -> Result<Url, DmsError> {
    if name.is_empty() {
        return Err(DmsError::locator(doc, "attachment name must not be empty"));
    }
    let mut url = document(db, doc)?;
    url.path_segments_mut()
        .map_err(|_| DmsError::locator(doc, "document locator cannot be a base"))?
        .push(name);
    if let Some(rev) = rev {
        url.query_pairs_mut().append_pair("rev", rev);
    }
    Ok(url)
}

/// `{server}/{db}/_design/{design}/_view/{view}`.
pub fn view(db: &Database, design: &str, view: &str) -> Result<Url, DmsError> {
    if design.is_empty() || view.is_empty() {
        return Err(DmsError::locator(
            format!("{design}/{view}"),
            "design and view names must not be empty",
        ));
    }
    join(
        db.server().url(),
        &[db.name(), "_design", design, "_view", view],
    )
}

pub(crate) fn join(base: &Url, segments: &[&str]) -> Result<Url, DmsError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DmsError::locator(base.as_str(), "URL cannot be a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn validate_id(id: &str) -> Result<(), DmsError> {
    if id.is_empty() {
        return Err(DmsError::locator(id, "document id must not be empty"));
    }
    if id.starts_with('_') && !id.starts_with("_design/") {
        return Err(DmsError::locator(id, "document ids starting with `_` are reserved"));
    }
    Ok(())
}
