use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Result;
use csv::{Writer, WriterBuilder};

use crate::matching::OutputShape;
use crate::models::{MatchOutputRow, RecordFields};

pub fn write_csv(path: &Path, shape: OutputShape, rows: &[MatchOutputRow]) -> Result<()> {
    let file = File::create(path)?;
    let buf_writer = BufWriter::with_capacity(512 * 1024, file);
    let mut w = WriterBuilder::new().from_writer(buf_writer);
    w.write_record(shape.columns())?;
    for row in rows {
        write_row(&mut w, shape, row)?;
    }
    w.flush()?;
    Ok(())
}

fn write_row<W: std::io::Write>(
    w: &mut Writer<W>,
    shape: OutputShape,
    row: &MatchOutputRow,
) -> Result<()> {
    // Pre-format owned fields so the record slices borrow uniformly
    let id_a = row.id_a.to_string();
    let id_b = row.id_b.map(|v| v.to_string()).unwrap_or_default();
    let label = row.decision.label();
    match shape {
        OutputShape::Key => {
            w.write_record([id_a.as_str(), id_b.as_str(), label.as_str()])?;
        }
        OutputShape::Full => {
            let empty = RecordFields::default();
            let a = row.a.as_ref().unwrap_or(&empty);
            let b = row.b.as_ref().unwrap_or(&empty);
            let a_dob = a.dob.map(|d| d.to_string()).unwrap_or_default();
            let b_dob = b.dob.map(|d| d.to_string()).unwrap_or_default();
            let record: Vec<&str> = vec![
                &id_a,
                a.forename.as_deref().unwrap_or(""),
                a.surname.as_deref().unwrap_or(""),
                &a_dob,
                a.postcode.as_deref().unwrap_or(""),
                &id_b,
                b.forename.as_deref().unwrap_or(""),
                b.surname.as_deref().unwrap_or(""),
                &b_dob,
                b.postcode.as_deref().unwrap_or(""),
                &label,
            ];
            w.write_record(&record)?;
        }
    }
    Ok(())
}
