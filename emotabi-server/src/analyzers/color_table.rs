//! Color → emotion lookup table
//!
//! CSV with a header row containing `R`, `G`, `B` and one or more `word*`
//! columns:
//!
//! ```text
//! R,G,B,word1,word2,word3
//! 255,0,0,情熱的な,激しい,
//! 135,206,235,爽やかな,穏やかな,開放的な
//! ```
//!
//! Lookups return the words of the nearest row by Euclidean distance in RGB
//! space.

use crate::types::FAILURE_SENTINEL;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ColorTableError {
    #[error("Color table not found. Tried paths: {0:?}")]
    NotFound(Vec<PathBuf>),

    #[error("Color table is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("Color table line {line}: {message}")]
    InvalidRow { line: usize, message: String },

    #[error("Color table has no rows")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
struct ColorRow {
    rgb: [f64; 3],
    words: Vec<String>,
}

/// Parsed lookup table
#[derive(Debug, Clone)]
pub struct ColorTable {
    rows: Vec<ColorRow>,
}

impl ColorTable {
    /// Parse CSV content
    pub fn parse(content: &str) -> Result<Self, ColorTableError> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines.next().ok_or(ColorTableError::Empty)?;
        let columns: Vec<String> = split_fields(header.trim_start_matches('\u{feff}'));

        let index_of = |name: &'static str| {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or(ColorTableError::MissingColumn(name))
        };
        let (r, g, b) = (index_of("R")?, index_of("G")?, index_of("B")?);
        let word_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.starts_with("word"))
            .map(|(i, _)| i)
            .collect();

        let mut rows = Vec::new();
        for (idx, line) in lines {
            let fields = split_fields(line);
            let channel = |i: usize| -> Result<f64, ColorTableError> {
                fields
                    .get(i)
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(|| ColorTableError::InvalidRow {
                        line: idx + 1,
                        message: format!("bad channel value in column {}", i + 1),
                    })
            };

            let words = word_columns
                .iter()
                .filter_map(|&i| fields.get(i))
                .filter(|w| !w.is_empty())
                .cloned()
                .collect();

            rows.push(ColorRow {
                rgb: [channel(r)?, channel(g)?, channel(b)?],
                words,
            });
        }

        if rows.is_empty() {
            return Err(ColorTableError::Empty);
        }
        Ok(Self { rows })
    }

    /// Load the first readable table among `paths`
    pub async fn load_first(paths: &[PathBuf]) -> Result<Self, ColorTableError> {
        for path in paths {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    let table = Self::parse(&content)?;
                    info!("Color table loaded from {} ({} rows)", path.display(), table.len());
                    return Ok(table);
                }
                Err(e) => {
                    debug!("Color table {} not readable: {}. Trying next path...", path.display(), e);
                }
            }
        }
        Err(ColorTableError::NotFound(paths.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Words of the nearest row; the sentinel when that row has none
    pub fn nearest_emotions(&self, rgb: [u8; 3]) -> Vec<String> {
        let target = rgb.map(f64::from);
        let nearest = self.rows.iter().min_by(|a, b| {
            distance(&a.rgb, &target).total_cmp(&distance(&b.rgb, &target))
        });

        match nearest {
            Some(row) if !row.words.is_empty() => row.words.clone(),
            _ => vec![FAILURE_SENTINEL.to_string()],
        }
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn split_fields(line: &str) -> Vec<String> {
    line.split(',')
        .map(|f| f.trim().trim_matches('"').trim().to_string())
        .collect()
}

/// Candidate table locations, first readable wins
pub fn candidate_paths(configured: Option<&Path>, root_folder: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = configured {
        paths.push(path.to_path_buf());
    }
    paths.push(root_folder.join("output_emo.csv"));
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join("output_emo.csv"));
    }
    paths
}
