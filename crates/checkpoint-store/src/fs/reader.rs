use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Reads the raw record; `Ok(None)` when the file does not exist.
pub fn read_record(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(Some(buf))
}
