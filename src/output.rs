//! Human-readable rendering of a search report.

use std::fmt::Write;

use crate::semantic::SearchReport;

/// Greedy word wrap. Words longer than `width` get a line of their own.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let needed = if line.is_empty() {
            word.chars().count()
        } else {
            line.chars().count() + 1 + word.chars().count()
        };

        if needed > width && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }

        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }

    if !line.is_empty() {
        lines.push(line);
    }

    lines
}

pub fn render_report(report: &SearchReport, wrap_width: usize) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Index saved to {}", report.index_path.display());
    let _ = writeln!(
        out,
        "{} paragraphs indexed, {} files skipped",
        report.paragraph_count,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        let _ = writeln!(out, "  skipped {}: {}", skipped.path.display(), skipped.error);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Query: '{}'", report.query);
    let _ = writeln!(out, "Nearest neighbors:");

    for (rank, hit) in report.hits.iter().enumerate() {
        let source = hit
            .paragraph
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "#{} distance={:.4} source={} paragraph={}",
            rank + 1,
            hit.distance,
            source,
            hit.position
        );
        for line in wrap(&hit.paragraph.text, wrap_width) {
            let _ = writeln!(out, "    {line}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;
    use crate::semantic::pipeline::{Paragraph, SearchHit, SkippedFile};
    use std::path::PathBuf;

    #[test]
    fn test_wrap_breaks_on_words() {
        let lines = wrap("the quick brown fox jumps over the lazy dog", 10);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps over", "the lazy", "dog"]);
    }

    #[test]
    fn test_wrap_long_word() {
        let lines = wrap("a supercalifragilistic b", 5);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }

    #[test]
    fn test_wrap_empty() {
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn test_render_report() {
        let report = SearchReport {
            query: "covid impact".into(),
            hits: vec![SearchHit {
                position: 2,
                distance: 0.125,
                paragraph: Paragraph {
                    text: "COVID delayed the plan".into(),
                    source: PathBuf::from("/corpus/plan.txt"),
                },
            }],
            index_path: PathBuf::from("results/index.bin"),
            paragraph_count: 3,
            skipped: vec![],
        };

        let rendered = render_report(&report, 80);
        assert!(rendered.contains("Query: 'covid impact'"));
        assert!(rendered.contains("#1 distance=0.1250 source=plan.txt paragraph=2"));
        assert!(rendered.contains("    COVID delayed the plan"));
        assert!(rendered.contains("3 paragraphs indexed, 0 files skipped"));
        assert!(!rendered.contains("skipped /"));
    }

    #[test]
    fn test_render_report_lists_skipped_files() {
        let report = SearchReport {
            query: "q".into(),
            hits: vec![],
            index_path: PathBuf::from("results/index.bin"),
            paragraph_count: 1,
            skipped: vec![
                SkippedFile {
                    path: PathBuf::from("/corpus/notes.csv"),
                    error: ExtractError::UnsupportedFormat {
                        path: PathBuf::from("/corpus/notes.csv"),
                        extension: "csv".into(),
                    },
                },
                SkippedFile {
                    path: PathBuf::from("/corpus/broken.pdf"),
                    error: ExtractError::Parse {
                        path: PathBuf::from("/corpus/broken.pdf"),
                        message: "invalid file header".into(),
                    },
                },
            ],
        };

        let rendered = render_report(&report, 80);
        assert!(rendered.contains("1 paragraphs indexed, 2 files skipped"));
        assert!(rendered.contains(
            "  skipped /corpus/notes.csv: no extractor registered for 'csv' (/corpus/notes.csv)"
        ));
        assert!(rendered.contains(
            "  skipped /corpus/broken.pdf: failed to parse /corpus/broken.pdf: invalid file header"
        ));
    }
}
