//! Batch input: the catalog entries to search for.
//!
//! ```toml
//! [[jobs]]
//! code = "NX-003-G"
//! name = "NexGard Spectra Cão Grande CX 3 Comprimidos"
//! brand = "NexGard"
//! category = "Antipulgas"
//!
//! [[jobs]]
//! code = "GD-015"
//! name = "Ração Golden Special Frango Filhote 15kg"
//! term = "golden special filhote"   # overrides the derived search term
//! ```

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::models::SearchJob;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation pattern"));

#[derive(Debug, Deserialize)]
struct JobsFile {
    #[serde(default)]
    jobs: Vec<JobEntry>,
}

#[derive(Debug, Deserialize)]
struct JobEntry {
    code: String,
    name: String,
    #[serde(default)]
    term: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Search term for a catalog name: punctuation becomes spaces and whitespace
/// is collapsed.
pub fn search_term(name: &str) -> String {
    PUNCTUATION
        .replace_all(name, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn load_jobs(path: &Path) -> Result<Vec<SearchJob>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read jobs file: {}", path.display()))?;
    parse_jobs(&content).with_context(|| format!("Invalid jobs file: {}", path.display()))
}

pub fn parse_jobs(content: &str) -> Result<Vec<SearchJob>> {
    let file: JobsFile = toml::from_str(content)?;

    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(file.jobs.len());
    for (i, entry) in file.jobs.into_iter().enumerate() {
        let code = entry.code.trim().to_string();
        if code.is_empty() {
            bail!("jobs[{}]: code must not be empty", i);
        }
        if !seen.insert(code.clone()) {
            bail!("jobs[{}]: duplicate code '{}'", i, code);
        }
        let term = match entry.term {
            Some(term) => search_term(&term),
            None => search_term(&entry.name),
        };
        if term.is_empty() {
            bail!("jobs[{}] ({}): empty search term", i, code);
        }
        jobs.push(SearchJob {
            code,
            term,
            brand: entry.brand.filter(|b| !b.trim().is_empty()),
            category: entry.category.filter(|c| !c.trim().is_empty()),
        });
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_strips_punctuation() {
        assert_eq!(
            search_term("Ração Golden (Special) - Frango, 15kg!"),
            "Ração Golden Special Frango 15kg"
        );
        assert_eq!(search_term("Simparic 10,1-20kg"), "Simparic 10 1 20kg");
    }

    #[test]
    fn parses_jobs_in_order() {
        let jobs = parse_jobs(
            r#"
[[jobs]]
code = "NX-003-G"
name = "NexGard Spectra Cão Grande CX 3 Comprimidos"
brand = "NexGard"
category = "Antipulgas"

[[jobs]]
code = "GD-015"
name = "Ração Golden Special Frango Filhote 15kg"
term = "golden special: filhote"
brand = ""
"#,
        )
        .unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].term, "NexGard Spectra Cão Grande CX 3 Comprimidos");
        assert_eq!(jobs[0].brand.as_deref(), Some("NexGard"));
        assert_eq!(jobs[1].term, "golden special filhote");
        assert_eq!(jobs[1].brand, None);
    }

    #[test]
    fn rejects_duplicate_codes() {
        let err = parse_jobs(
            "[[jobs]]\ncode = \"A\"\nname = \"x\"\n[[jobs]]\ncode = \"A\"\nname = \"y\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_name_without_words() {
        assert!(parse_jobs("[[jobs]]\ncode = \"A\"\nname = \"--\"\n").is_err());
    }

    #[test]
    fn empty_file_has_no_jobs() {
        assert!(parse_jobs("").unwrap().is_empty());
    }
}
