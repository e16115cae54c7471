//! Bulk puzzle import from a directory of JSON files, one puzzle per file.
//!
//! Files carry `grid_size`, `difficulty`, `usage_type`, `puzzle_data` and
//! `solution_data`. `puzzle_hash` and `estimated_duration` are derived when
//! absent. Puzzles whose hash is already stored are skipped.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Deserialize;
use slither_db::Database;
use slither_db::models::NewPuzzle;
use slither_db::puzzles::{estimate_duration, puzzle_hash};
use slither_types::models::{Difficulty, MAX_GRID_SIZE, MIN_GRID_SIZE, UsageType};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct PuzzleFile {
    puzzle_hash: Option<String>,
    grid_size: u32,
    difficulty: Difficulty,
    usage_type: UsageType,
    puzzle_data: serde_json::Value,
    solution_data: serde_json::Value,
    #[serde(default, alias = "java_seed")]
    seed: i64,
    estimated_duration: Option<u32>,
}

impl PuzzleFile {
    fn into_new_puzzle(self) -> Result<NewPuzzle> {
        if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&self.grid_size) {
            bail!(
                "grid_size {} outside {}..={}",
                self.grid_size,
                MIN_GRID_SIZE,
                MAX_GRID_SIZE
            );
        }

        Ok(NewPuzzle {
            puzzle_hash: self
                .puzzle_hash
                .unwrap_or_else(|| puzzle_hash(&self.puzzle_data)),
            grid_size: self.grid_size,
            difficulty: self.difficulty,
            usage_type: self.usage_type,
            estimated_duration: Some(
                self.estimated_duration
                    .unwrap_or_else(|| estimate_duration(self.difficulty, self.grid_size)),
            ),
            puzzle_data: self.puzzle_data,
            solution_data: self.solution_data,
            seed: self.seed,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: u32,
    pub skipped: u32,
    pub failed: u32,
}

pub fn import_dir(db: &Database, dir: &Path) -> Result<ImportSummary> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    info!("Found {} JSON files in {}", files.len(), dir.display());

    let mut summary = ImportSummary::default();
    for path in &files {
        match import_file(db, path) {
            Ok(Some(id)) => {
                info!("Imported {} as puzzle {}", path.display(), id);
                summary.imported += 1;
            }
            Ok(None) => {
                info!("Already stored, skipping {}", path.display());
                summary.skipped += 1;
            }
            Err(e) => {
                warn!("Failed to import {}: {:#}", path.display(), e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn import_file(db: &Database, path: &Path) -> Result<Option<i64>> {
    let raw = fs::read_to_string(path)?;
    let file: PuzzleFile = serde_json::from_str(&raw)?;
    db.insert_puzzle(&file.into_new_puzzle()?, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "slither-import-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn derives_missing_fields() {
        let file: PuzzleFile = serde_json::from_str(
            r#"{"grid_size": 7, "difficulty": "medium", "usage_type": "daily",
                "puzzle_data": {"clues": [[1, 2]]}, "solution_data": {}, "java_seed": 99}"#,
        )
        .unwrap();
        let puzzle = file.into_new_puzzle().unwrap();

        assert_eq!(puzzle.seed, 99);
        assert_eq!(puzzle.puzzle_hash, puzzle_hash(&serde_json::json!({"clues": [[1, 2]]})));
        assert_eq!(puzzle.estimated_duration, Some(147));
    }

    #[test]
    fn rejects_out_of_range_grid() {
        let file: PuzzleFile = serde_json::from_str(
            r#"{"grid_size": 20, "difficulty": "easy", "usage_type": "regular",
                "puzzle_data": {}, "solution_data": {}}"#,
        )
        .unwrap();
        assert!(file.into_new_puzzle().is_err());
    }

    #[test]
    fn imports_directory_and_skips_duplicates() {
        let dir = scratch_dir("dedupe");
        let puzzle = r#"{"grid_size": 5, "difficulty": "easy", "usage_type": "regular",
                         "puzzle_data": {"clues": [[3]]}, "solution_data": {}}"#;
        fs::write(dir.join("a.json"), puzzle).unwrap();
        fs::write(dir.join("b.json"), puzzle).unwrap();
        fs::write(dir.join("c.json"), "not json").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let db = Database::open_in_memory().unwrap();
        let summary = import_dir(&db, &dir).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 1,
                skipped: 1,
                failed: 1
            }
        );
        assert_eq!(db.stock_levels().unwrap().regular.easy, 1);

        let _ = fs::remove_dir_all(&dir);
    }
}
