//! Printing of extracted notes, as text lines or as JSON.

use std::io::Write;

use anyhow::Result;
use dance_core::NoteEvent;
use dance_core::chroma::pitch_class_name;
use dance_core::clip::Sheet;

/// One line per note: time, pitch class, duration if any, energy.
pub fn format_note(note: &NoteEvent) -> String {
    let name = pitch_class_name(note.note);
    match note.duration() {
        Some(duration) => format!(
            "{:>9.3}s  {:<2}  {:>7.3}s  energy {:.3}",
            note.onset, name, duration, note.energy
        ),
        None => format!("{:>9.3}s  {:<2}  {:>8}  energy {:.3}", note.onset, name, "-", note.energy),
    }
}

/// Writes every sheet, either as a JSON array or as one text block per sheet.
pub fn write_sheets(out: &mut impl Write, sheets: &[Sheet], json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, sheets)?;
        writeln!(out)?;
        return Ok(());
    }

    for sheet in sheets {
        writeln!(out, "sheet {} ({} notes)", sheet.index, sheet.notes.len())?;
        for note in &sheet.notes {
            writeln!(out, "{}", format_note(note))?;
        }
    }
    Ok(())
}

/// Writes a single live note; JSON output is one object per line.
pub fn write_note(out: &mut impl Write, note: &NoteEvent, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, note)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", format_note(note))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a_note(conclusion: Option<f64>) -> NoteEvent {
        NoteEvent {
            note: 9,
            onset: 1.5,
            conclusion,
            energy: 0.8,
        }
    }

    #[test]
    fn text_lines_name_the_pitch_class() {
        let line = format_note(&a_note(Some(2.0)));
        assert!(line.contains("A "));
        assert!(line.contains("1.500s"));
        assert!(line.contains("0.500s"));

        let line = format_note(&a_note(None));
        assert!(line.contains(" - "));
    }

    #[test]
    fn json_sheets_round_trip() {
        let sheets = vec![Sheet {
            index: 0,
            notes: vec![a_note(None)],
        }];
        let mut out = Vec::new();
        write_sheets(&mut out, &sheets, true).unwrap();
        let parsed: Vec<Sheet> = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, sheets);
    }

    #[test]
    fn live_json_is_one_object_per_line() {
        let mut out = Vec::new();
        write_note(&mut out, &a_note(Some(2.0)), true).unwrap();
        write_note(&mut out, &a_note(None), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().all(|line| line.starts_with('{')));
    }
}
