//! Labeled rows for retraining the classifier
//!
//! Every finalized decision is appended to a CSV file: the reviewed text
//! followed by one 0/1 column per category. The header is written when the
//! file is first created.

use flagbot_common::categories::Category;
use flagbot_common::db::Decision;
use flagbot_common::{Error, Result};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Header of the text column
pub const TEXT_COLUMN: &str = "comment_text";

/// Append one decision to the export file, off the async runtime
pub async fn append_training_row(path: &Path, decision: &Decision) -> Result<()> {
    let path: PathBuf = path.to_path_buf();
    let row = training_row(decision);
    let review_item_id = decision.review_item_id;

    tokio::task::spawn_blocking(move || write_row(&path, &row))
        .await
        .map_err(|e| Error::Internal(format!("Training export task failed: {}", e)))??;

    debug!(review_item_id, "Training row appended");
    Ok(())
}

fn training_row(decision: &Decision) -> Vec<String> {
    let mut row = Vec::with_capacity(Category::ALL.len() + 1);
    row.push(decision.content.clone());
    for category in Category::ALL {
        row.push(decision.outcome.get(&category).copied().unwrap_or(0).to_string());
    }
    row
}

fn write_row(path: &Path, row: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let is_new = match std::fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => return Err(e.into()),
    };

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::Writer::from_writer(file);
    if is_new {
        let header: Vec<&str> = std::iter::once(TEXT_COLUMN)
            .chain(Category::ALL.iter().map(Category::as_str))
            .collect();
        writer.write_record(&header).map_err(io::Error::from)?;
    }
    writer.write_record(row).map_err(io::Error::from)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagbot_common::VoteVector;

    fn decision(id: i64, content: &str, insult: i64) -> Decision {
        let mut outcome: VoteVector = Category::ALL.iter().map(|c| (*c, 0)).collect();
        outcome.insert(Category::Insult, insult);
        Decision {
            review_item_id: id,
            content: content.to_string(),
            outcome,
        }
    }

    #[tokio::test]
    async fn test_rows_append_under_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export").join("train.csv");

        append_training_row(&path, &decision(1, "you are an idiot", 1))
            .await
            .unwrap();
        append_training_row(&path, &decision(2, "fine, \"quoted\" text", 0))
            .await
            .unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header[0], TEXT_COLUMN);
        assert_eq!(header.len(), Category::ALL.len() + 1);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "you are an idiot");
        assert_eq!(&rows[1][0], "fine, \"quoted\" text");

        let insult_column = header.iter().position(|h| h == "insult").unwrap();
        assert_eq!(&rows[0][insult_column], "1");
        assert_eq!(&rows[1][insult_column], "0");
    }
}
