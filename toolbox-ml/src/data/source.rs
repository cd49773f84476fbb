//! Building datasets from CSV files and from folders of files.

use crate::data::dataset::{Dataset, SplitOptions};
use crate::data::split::Split;
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One CSV row, keyed by column header.
pub type CsvRecord = Map<String, Value>;

/// How to read a CSV file into a dataset.
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// Field delimiter, `,` when unset.
    pub delimiter: Option<char>,
    /// Read at most this many data rows.
    pub limit: Option<usize>,
    /// Split applied after loading.
    pub split: Option<Split>,
    pub split_options: SplitOptions,
}

/// Which files to collect from a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extensions {
    /// Any visible file with an extension (`*.*`).
    #[default]
    Any,
    /// Files whose name ends with one of these suffixes, e.g. `".png"`.
    List(Vec<String>),
}

impl Extensions {
    pub fn list<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(suffixes.into_iter().map(Into::into).collect())
    }

    /// An empty list means any extension.
    pub fn from_suffixes(suffixes: &[String]) -> Self {
        if suffixes.is_empty() {
            Self::Any
        } else {
            Self::List(suffixes.to_vec())
        }
    }

    fn matches(&self, file_name: &str) -> bool {
        if file_name.starts_with('.') {
            return false;
        }
        match self {
            Self::Any => file_name.contains('.'),
            Self::List(suffixes) => {
                let lower = file_name.to_lowercase();
                suffixes
                    .iter()
                    .any(|s| lower.ends_with(&s.to_lowercase()))
            }
        }
    }
}

impl Dataset<CsvRecord> {
    /// Load a CSV file with a header row. Values are typed as integer,
    /// float, bool or string.
    pub fn from_csv(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        options: &CsvOptions,
    ) -> Result<Self, MlError> {
        let path = path.as_ref();
        let delimiter = options.delimiter.unwrap_or(',');
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines();

        let columns: Vec<String> = lines
            .next()
            .filter(|header| !header.trim().is_empty())
            .ok_or_else(|| MlError::dataset(format!("Empty CSV file: {}", path.display())))?
            .split(delimiter)
            .map(|s| s.trim().trim_matches('"').to_string())
            .collect();

        let mut records = Vec::new();
        for (line_no, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if options.limit.is_some_and(|max| records.len() >= max) {
                break;
            }
            let fields: Vec<&str> = line.split(delimiter).collect();
            if fields.len() != columns.len() {
                return Err(MlError::dataset(format!(
                    "{}:{}: expected {} fields, found {}",
                    path.display(),
                    line_no + 2,
                    columns.len(),
                    fields.len()
                )));
            }
            let record: CsvRecord = columns
                .iter()
                .zip(fields)
                .map(|(column, raw)| (column.clone(), infer_value(raw)))
                .collect();
            records.push(record);
        }

        tracing::info!(
            path = %path.display(),
            rows = records.len(),
            columns = columns.len(),
            "Loaded CSV dataset"
        );

        let mut dataset = Dataset::new(name, records);
        if let Some(split) = &options.split {
            dataset.split_with(split, &options.split_options)?;
        }
        Ok(dataset)
    }
}

impl Dataset<PathBuf> {
    /// Collect the files directly inside each folder whose names match
    /// `extensions`. Folders are visited in order; files within a folder
    /// are sorted by path.
    pub fn from_files<P: AsRef<Path>>(
        name: impl Into<String>,
        folders: &[P],
        extensions: &Extensions,
    ) -> Result<Self, MlError> {
        let files = collect_files(folders, extensions)?;
        Ok(Dataset::new(name, files))
    }
}

/// Paths of matching regular files directly inside `folders`.
pub fn collect_files<P: AsRef<Path>>(
    folders: &[P],
    extensions: &Extensions,
) -> Result<Vec<PathBuf>, MlError> {
    let mut files = Vec::new();
    for folder in folders {
        let folder = folder.as_ref();
        if !folder.is_dir() {
            return Err(MlError::not_found(format!(
                "folder {}",
                folder.display()
            )));
        }
        let mut found: Vec<PathBuf> = WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| extensions.matches(&e.file_name().to_string_lossy()))
            .map(|e| e.into_path())
            .collect();
        found.sort();
        tracing::debug!(folder = %folder.display(), files = found.len(), "Collected files");
        files.extend(found);
    }
    Ok(files)
}

fn infer_value(raw: &str) -> Value {
    let s = raw.trim().trim_matches('"');
    if let Ok(i) = s.parse::<i64>() {
        Value::Number(i.into())
    } else if let Ok(f) = s.parse::<f64>() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(s.to_string()))
    } else if s == "true" || s == "false" {
        Value::Bool(s == "true")
    } else {
        Value::String(s.to_string())
    }
}
