use std::fs;
use std::path::Path;

use anyhow::Result;
use rust_xlsxwriter::{Format, FormatAlign, Workbook, Worksheet};

use crate::matching::OutputShape;
use crate::models::{MatchOutputRow, RecordFields};

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn header_format() -> Format {
    Format::new().set_bold().set_align(FormatAlign::Center)
}

pub fn write_xlsx(path: &Path, shape: OutputShape, rows: &[MatchOutputRow]) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name("Linkage_Results")?;

    let hfmt = header_format();
    for (c, h) in shape.columns().iter().enumerate() {
        ws.write_string_with_format(0, c as u16, *h, &hfmt)?;
    }
    ws.set_freeze_panes(1, 0)?;

    for (i, row) in rows.iter().enumerate() {
        write_row(ws, (i + 1) as u32, shape, row)?;
    }

    workbook.save(path)?;
    Ok(())
}

fn write_row(ws: &mut Worksheet, r: u32, shape: OutputShape, row: &MatchOutputRow) -> Result<()> {
    match shape {
        OutputShape::Key => {
            ws.write_number(r, 0, row.id_a as f64)?;
            if let Some(id_b) = row.id_b {
                ws.write_number(r, 1, id_b as f64)?;
            }
            ws.write_string(r, 2, row.decision.label())?;
        }
        OutputShape::Full => {
            let empty = RecordFields::default();
            let a = row.a.as_ref().unwrap_or(&empty);
            let b = row.b.as_ref().unwrap_or(&empty);
            let mut col: u16 = 0;
            ws.write_number(r, col, row.id_a as f64)?;
            col += 1;
            col = write_fields(ws, r, col, a)?;
            if let Some(id_b) = row.id_b {
                ws.write_number(r, col, id_b as f64)?;
            }
            col += 1;
            col = write_fields(ws, r, col, b)?;
            ws.write_string(r, col, row.decision.label())?;
        }
    }
    Ok(())
}

fn write_fields(ws: &mut Worksheet, r: u32, mut col: u16, fields: &RecordFields) -> Result<u16> {
    ws.write_string(r, col, fields.forename.as_deref().unwrap_or(""))?;
    col += 1;
    ws.write_string(r, col, fields.surname.as_deref().unwrap_or(""))?;
    col += 1;
    ws.write_string(r, col, fields.dob.map(|d| d.to_string()).unwrap_or_default())?;
    col += 1;
    ws.write_string(r, col, fields.postcode.as_deref().unwrap_or(""))?;
    col += 1;
    Ok(col)
}
