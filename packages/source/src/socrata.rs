//! Paginated Socrata SODA CSV fetcher.
//!
//! Pages through a dataset with `$limit`, `$offset`, and a stable
//! `$order`, and concatenates the pages into one CSV file with a single
//! header row.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use crash_hotspots_config::paths::ensure_parent;
use crash_hotspots_config::progress::ProgressCallback;

use crate::{SourceError, io_error, partial_path, retry};

/// Configuration for a Socrata CSV fetch.
pub struct SocrataConfig<'a> {
    /// Resource URL (e.g. `"https://data.cityofchicago.org/resource/85ca-t3if.csv"`).
    pub api_url: &'a str,
    /// Column ordered on so offsets are stable between pages.
    pub order_column: &'a str,
    /// Label for log messages.
    pub label: &'a str,
    /// Rows per request.
    pub page_size: u64,
    /// Upper bound on rows fetched; `None` for the whole dataset.
    pub limit: Option<u64>,
}

/// Appends one CSV page to `writer`.
///
/// The first page's header is written and remembered; later pages must
/// carry the same header, which is then skipped. Returns the number of
/// data rows appended.
///
/// # Errors
///
/// Returns [`SourceError`] if the page is malformed or its header differs
/// from the first page's.
pub fn append_page<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    page: &str,
    header: &mut Option<csv::StringRecord>,
) -> Result<u64, SourceError> {
    if page.trim().is_empty() {
        return Ok(0);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(page.as_bytes());
    let page_header = reader.headers()?.clone();

    match header {
        Some(expected) if *expected != page_header => {
            return Err(SourceError::Normalization {
                message: format!(
                    "Socrata page header changed: expected {} columns, got {}",
                    expected.len(),
                    page_header.len()
                ),
            });
        }
        Some(_) => {}
        None => {
            writer.write_record(&page_header)?;
            *header = Some(page_header);
        }
    }

    let mut count = 0u64;
    for record in reader.records() {
        writer.write_record(&record?)?;
        count += 1;
    }
    Ok(count)
}

/// Fetches a dataset page by page into `dest`.
///
/// Pages are written to a `.part` sibling that is renamed to `dest` only
/// after the last page, so a failed fetch never leaves a truncated table
/// that a later run would take as complete.
///
/// Returns the number of data rows written.
///
/// # Errors
///
/// Returns [`SourceError`] if any request, page parse, or write fails.
pub async fn fetch_socrata_csv(
    client: &reqwest::Client,
    config: &SocrataConfig<'_>,
    dest: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<u64, SourceError> {
    ensure_parent(dest).map_err(io_error(dest))?;
    let part = partial_path(dest);

    let rows = match write_pages(client, config, &part, progress).await {
        Ok(rows) => rows,
        Err(e) => {
            if let Err(remove) = std::fs::remove_file(&part) {
                log::warn!("Could not remove {}: {remove}", part.display());
            }
            progress.finish_and_clear();
            return Err(e);
        }
    };

    std::fs::rename(&part, dest).map_err(io_error(dest))?;

    log::info!(
        "Downloaded {rows} {} records to {}",
        config.label,
        dest.display()
    );
    progress.finish(format!("{} download complete -- {rows} records", config.label));
    Ok(rows)
}

/// Pages through the dataset into `part`, returning the row count.
async fn write_pages(
    client: &reqwest::Client,
    config: &SocrataConfig<'_>,
    part: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<u64, SourceError> {
    let file = File::create(part).map_err(io_error(part))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));

    let fetch_limit = config.limit.unwrap_or(u64::MAX);
    if let Some(limit) = config.limit {
        progress.set_total(limit);
    }
    progress.set_message(format!("{} download", config.label));

    let mut header = None;
    let mut offset: u64 = 0;

    loop {
        let remaining = fetch_limit.saturating_sub(offset);
        if remaining == 0 {
            break;
        }
        let page_limit = remaining.min(config.page_size);

        log::info!(
            "Fetching {} data: offset={offset}, limit={page_limit}",
            config.label
        );

        let params = [
            ("$limit", page_limit.to_string()),
            ("$offset", offset.to_string()),
            ("$order", config.order_column.to_string()),
        ];
        let page = retry::send_text(|| client.get(config.api_url).query(&params)).await?;

        let count = append_page(&mut writer, &page, &mut header)?;
        offset += count;
        progress.inc(count);

        if count < page_limit {
            break;
        }
    }

    writer.flush().map_err(io_error(part))?;
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use crash_hotspots_config::progress::null_progress;

    use super::*;
    use crate::tests::{NOT_FOUND, ok_response, serve};

    const FIRST_PAGE: &str = "crash_record_id,crash_date\n\
                              a,2024-01-01T08:00:00.000\n\
                              b,2024-01-02T09:30:00.000\n";

    fn two_row_pages(url: &str) -> SocrataConfig<'_> {
        SocrataConfig {
            api_url: url,
            order_column: "crash_record_id",
            label: "crashes",
            page_size: 2,
            limit: None,
        }
    }

    #[tokio::test]
    async fn failed_later_page_leaves_no_table() {
        let url = format!(
            "{}/resource/85ca-t3if.csv",
            serve(vec![ok_response("text/csv", FIRST_PAGE), NOT_FOUND.to_string()]).await
        );
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("raw").join("chicago_crashes.csv");

        let result = fetch_socrata_csv(
            &reqwest::Client::new(),
            &two_row_pages(&url),
            &dest,
            &null_progress(),
        )
        .await;

        assert!(matches!(result, Err(SourceError::Status { .. })));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn complete_fetch_is_renamed_into_place() {
        let url = format!(
            "{}/resource/85ca-t3if.csv",
            serve(vec![
                ok_response("text/csv", FIRST_PAGE),
                ok_response("text/csv", "crash_record_id,crash_date\nc,2024-01-03T10:00:00.000\n"),
            ])
            .await
        );
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("raw").join("chicago_crashes.csv");

        let rows = fetch_socrata_csv(
            &reqwest::Client::new(),
            &two_row_pages(&url),
            &dest,
            &null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(rows, 3);
        assert!(!partial_path(&dest).exists());
        let text = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.ends_with("c,2024-01-03T10:00:00.000\n"));
    }

    #[test]
    fn concatenates_pages_under_one_header() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = None;

        let first = "crash_record_id,crash_date,latitude\n\
                     a,2024-01-01T08:00:00.000,41.88\n\
                     b,2024-01-02T09:30:00.000,41.89\n";
        let second = "crash_record_id,crash_date,latitude\n\
                      c,2024-01-03T10:00:00.000,\n";

        assert_eq!(append_page(&mut writer, first, &mut header).unwrap(), 2);
        assert_eq!(append_page(&mut writer, second, &mut header).unwrap(), 1);

        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text.matches("crash_record_id").count(), 1);
        assert_eq!(text.lines().count(), 4);
        assert!(text.ends_with("c,2024-01-03T10:00:00.000,\n"));
    }

    #[test]
    fn keeps_quoted_fields_intact() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = None;
        let page = "id,location\n1,\"POINT (-87.6 41.8), extra\"\n";
        append_page(&mut writer, page, &mut header).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(text.contains("\"POINT (-87.6 41.8), extra\""));
    }

    #[test]
    fn rejects_changed_header() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = None;
        append_page(&mut writer, "a,b\n1,2\n", &mut header).unwrap();
        assert!(append_page(&mut writer, "a,b,c\n1,2,3\n", &mut header).is_err());
    }

    #[test]
    fn empty_page_after_header_adds_nothing() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = None;
        append_page(&mut writer, "a,b\n1,2\n", &mut header).unwrap();
        assert_eq!(append_page(&mut writer, "a,b\n", &mut header).unwrap(), 0);
    }
}
