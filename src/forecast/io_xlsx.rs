// Reading the streams from the worksheets of an Excel workbook.

use calamine::DataType;

use crate::forecast::{
    io_common::{clean_cell, StreamTable},
    *,
};

/// Text of a cell. Whole numbers are written without decimals, since keys and
/// ballot numbers are often stored as numbers.
pub fn cell_text(cell: &DataType) -> Option<String> {
    match cell {
        DataType::Empty => None,
        DataType::String(s) => clean_cell(s),
        DataType::Int(i) => Some(i.to_string()),
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
            Some(format!("{}", *f as i64))
        }
        DataType::Float(f) => Some(f.to_string()),
        DataType::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn read_xlsx_table(path: &str, sheet: &str, stream: StreamName) -> ForecastResult<StreamTable> {
    info!("Reading stream {} from {:?}, worksheet {:?}", stream, path, sheet);
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = workbook
        .worksheet_range(sheet)
        .context(MissingSheetSnafu { path, sheet })?
        .context(OpeningExcelSnafu { path })?;

    let mut iter = wrange.rows();
    let header_row = iter.next().context(EmptyStreamSnafu { stream, path })?;
    let header: Vec<String> = header_row
        .iter()
        .map(|c| cell_text(c).unwrap_or_default())
        .collect();
    debug!("read_xlsx_table: header: {:?}", header);

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for (idx, row) in iter.enumerate() {
        let mut cells: Vec<Option<String>> = Vec::with_capacity(row.len());
        for c in row.iter() {
            if let DataType::Error(e) = c {
                return Err(ForecastError::WrongCellType {
                    stream,
                    lineno: idx + 2,
                    column: String::new(),
                    content: format!("{:?}", e),
                });
            }
            cells.push(cell_text(c));
        }
        rows.push(cells);
    }
    debug!("read_xlsx_table: {} rows in {:?}", rows.len(), sheet);
    Ok(StreamTable {
        stream,
        header,
        rows,
        first_line: 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_as_text() {
        assert_eq!(cell_text(&DataType::Empty), None);
        assert_eq!(cell_text(&DataType::Int(2014)), Some("2014".to_string()));
        assert_eq!(
            cell_text(&DataType::Float(250000012345.0)),
            Some("250000012345".to_string())
        );
        assert_eq!(cell_text(&DataType::Float(10.5)), Some("10.5".to_string()));
        assert_eq!(cell_text(&DataType::String(" #NE# ".to_string())), None);
        assert_eq!(
            cell_text(&DataType::String("ELEITO POR QP".to_string())),
            Some("ELEITO POR QP".to_string())
        );
    }

    #[test]
    fn missing_workbook() {
        assert!(matches!(
            read_xlsx_table("/nonexistent/data.xlsx", "results", StreamName::Results),
            Err(ForecastError::OpeningExcel { .. })
        ));
    }
}
