//! Dump and failure report formatting
//!
//! The dump goes to stdout on every run:
//!
//! ```text
//! --- DUMP: fixture.nix ---
//!    1 | a = '' echo hi '';
//!      scopes: ["source.nix.embedded","source.bash.embedded.nix"]
//! --- END DUMP: fixture.nix ---
//! ```

use super::driver::LineRecord;
use super::evaluator::Failure;
use crate::config::DumpConfig;
use std::io::{self, Write};
use std::path::Path;

/// Write the per-line scope dump for one fixture.
pub fn write_dump<W: Write>(
    out: &mut W,
    fixture: &Path,
    records: &[LineRecord],
    config: &DumpConfig,
) -> io::Result<()> {
    let fixture = fixture.display();
    writeln!(out, "--- DUMP: {fixture} ---")?;
    for record in records {
        let sample = &record.scopes[..record.scopes.len().min(config.scope_sample)];
        let sample = serde_json::to_string(sample).map_err(io::Error::other)?;
        writeln!(
            out,
            "{:>width$} | {}",
            record.line_number,
            record.text,
            width = config.line_number_width
        )?;
        writeln!(out, "     scopes: {sample}")?;
    }
    writeln!(out, "--- END DUMP: {fixture} ---")
}

/// Write the failure list, one `- ` item per failed check.
pub fn write_failures<W: Write>(out: &mut W, failures: &[Failure]) -> io::Result<()> {
    writeln!(out, "FAILURES:")?;
    for failure in failures {
        writeln!(out, "- {failure}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::evaluator::CheckError;

    fn dump(records: &[LineRecord], config: &DumpConfig) -> String {
        let mut out = Vec::new();
        write_dump(&mut out, Path::new("fixture.nix"), records, config).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn records() -> Vec<LineRecord> {
        vec![
            LineRecord {
                line_number: 1,
                text: "a = '' echo hi '';".into(),
                scopes: vec!["source.nix.embedded".into(), "source.bash.embedded.nix".into()],
            },
            LineRecord {
                line_number: 2,
                text: "b = 1;".into(),
                scopes: Vec::new(),
            },
        ]
    }

    #[test]
    fn dump_lists_every_line() {
        let config = DumpConfig {
            scope_sample: 25,
            line_number_width: 4,
        };
        insta::assert_snapshot!(dump(&records(), &config), @r###"
        --- DUMP: fixture.nix ---
           1 | a = '' echo hi '';
             scopes: ["source.nix.embedded","source.bash.embedded.nix"]
           2 | b = 1;
             scopes: []
        --- END DUMP: fixture.nix ---
        "###);
    }

    #[test]
    fn dump_honours_sample_size_and_width() {
        let config = DumpConfig {
            scope_sample: 1,
            line_number_width: 2,
        };
        let text = dump(&records(), &config);
        assert!(text.contains("\n 1 | a = "));
        assert!(text.contains("     scopes: [\"source.nix.embedded\"]\n"));
    }

    #[test]
    fn failures_are_itemized() {
        let failures = vec![
            Failure {
                index: 0,
                fixture: "fixture.nix".into(),
                target: None,
                note: None,
                scope_sample: Vec::new(),
                error: CheckError::Unresolved,
            },
            Failure {
                index: 3,
                fixture: "fixture.nix".into(),
                target: None,
                note: None,
                scope_sample: Vec::new(),
                error: CheckError::NoLineAfterLine(9),
            },
        ];
        let mut out = Vec::new();
        write_failures(&mut out, &failures).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "FAILURES:\n- check[0]: could not resolve target line\n- check[3]: no non-empty line after afterLine: 9\n"
        );
    }
}
