// Primitives for reading CSV files.

use crate::forecast::{
    io_common::{clean_cell, StreamTable},
    *,
};

fn decode(bytes: &[u8], encoding: TextEncoding) -> Option<String> {
    match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(|s| s.to_string()),
        // Latin-1 bytes are the first 256 code points.
        TextEncoding::Latin1 => Some(bytes.iter().map(|b| *b as char).collect()),
    }
}

pub fn read_csv_table(
    path: &str,
    stream: StreamName,
    delimiter: u8,
    encoding: TextEncoding,
) -> ForecastResult<StreamTable> {
    info!("Reading stream {} from {:?}", stream, path);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;

    let mut records = rdr.byte_records();
    let header_record = records
        .next()
        .context(EmptyStreamSnafu { stream, path })?
        .context(CsvLineParseSnafu { path, lineno: 1_usize })?;
    let header: Vec<String> = header_record
        .iter()
        .map(|b| decode(b, encoding).map(|s| s.trim().trim_start_matches('\u{feff}').to_string()))
        .collect::<Option<Vec<String>>>()
        .context(WrongEncodingSnafu { path, lineno: 1_usize })?;
    debug!("read_csv_table: header: {:?}", header);

    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        // The header is on line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        let mut row: Vec<Option<String>> = Vec::with_capacity(header.len());
        for field in line.iter() {
            let s = decode(field, encoding).context(WrongEncodingSnafu { path, lineno })?;
            row.push(clean_cell(&s));
        }
        rows.push(row);
    }
    debug!("read_csv_table: {} rows in {:?}", rows.len(), path);
    Ok(StreamTable {
        stream,
        header,
        rows,
        first_line: 2,
    })
}
