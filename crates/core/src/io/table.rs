//! Tabular artifacts as CSV

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};

use crate::error::Result;
use crate::vector::{RegionRow, RegionTable};

/// Write any serializable rows as CSV with a header row.
///
/// `None` fields are written as empty cells.
pub fn write_csv_rows<W, S>(writer: W, rows: &[S]) -> Result<()>
where
    W: Write,
    S: Serialize,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read CSV rows written by [`write_csv_rows`]
pub fn read_csv_rows<R, S>(reader: R) -> Result<Vec<S>>
where
    R: Read,
    S: DeserializeOwned,
{
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Write a region table: `region_id,attribute,mean_value`
pub fn write_region_table<W: Write>(writer: W, table: &RegionTable) -> Result<()> {
    if table.rows.is_empty() {
        // serde only emits the header alongside the first record
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["region_id", "attribute", "mean_value"])?;
        wtr.flush()?;
        return Ok(());
    }
    write_csv_rows(writer, &table.rows)
}

/// Read a region table; empty `mean_value` cells become `None`
pub fn read_region_table<R: Read>(reader: R) -> Result<RegionTable> {
    let rows: Vec<RegionRow> = read_csv_rows(reader)?;
    Ok(RegionTable { rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_table_keeps_absent_means() {
        let table = RegionTable {
            rows: vec![
                RegionRow { region_id: "55025000100".into(), attribute: 0.12, mean_value: Some(4.5) },
                RegionRow { region_id: "55025000200".into(), attribute: 0.3, mean_value: None },
            ],
        };

        let mut buf = Vec::new();
        write_region_table(&mut buf, &table).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("region_id,attribute,mean_value\n"));
        assert!(text.contains("55025000200,0.3,\n"));

        let back = read_region_table(buf.as_slice()).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_empty_table_has_header() {
        let mut buf = Vec::new();
        write_region_table(&mut buf, &RegionTable::default()).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "region_id,attribute,mean_value\n");
        let back = read_region_table(&b"region_id,attribute,mean_value\n"[..]).unwrap();
        assert!(back.is_empty());
    }
}
