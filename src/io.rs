use std::io::Read;
use ndarray::{Array4, Ix4};
use serde::{Serialize, Deserialize};




// ============================================================================
#[derive(thiserror::Error, Debug)]
pub enum Error {

    #[cfg(feature = "serde_cbor")]
    #[error("{0}")]
    SerdeCbor(#[from] serde_cbor::Error),

    #[error("{0}")]
    IO(#[from] std::io::Error),

    #[error("input file is compressed, but snap is not enabled")]
    CannotReadSnappy,

    #[error("input file {0} given, but serde_cbor is not enabled")]
    SerdeCborNotEnabled(String),

    #[error("{path}: expected {expected} header tokens, found {actual}")]
    HeaderTokenCount {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: malformed header token '{token}'")]
    HeaderToken {
        path: String,
        token: String,
    },

    #[error("{path}: payload holds {actual} bytes after the header, not a whole number of {expected}-byte values")]
    PayloadAlignment {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: payload holds {actual} values, expected {expected}")]
    PayloadSize {
        path: String,
        expected: usize,
        actual: usize,
    },

    #[error("{path}: payload implies {actual} per-cell columns, supported counts are {supported}")]
    UnsupportedFieldCount {
        path: String,
        supported: String,
        actual: usize,
    },
}




/**
 * The stream identifier frame emitted by the snappy framing format; used to
 * sniff whether a checkpoint on disk was written compressed.
 */
#[cfg(feature = "snap")]
static SNAPPY_STREAM_IDENTIFIER: [u8; 10] = [0xff, 0x06, 0x00, 0x00, 0x73, 0x4e, 0x61, 0x50, 0x70, 0x59];




// ============================================================================
/**
 * Serialize a value to CBOR at the given path. The bytes are staged in a
 * sibling temporary file and moved into place with an atomic rename, so a
 * killed process never leaves a partially written file under the final name.
 */
#[cfg(feature = "serde_cbor")]
pub fn write_cbor<T: Serialize>(value: &T, path_str: &str) -> Result<(), Error> {
    println!("write {}", path_str);
    let temp_str = format!("{}.tmp", path_str);
    let file = std::fs::File::create(&temp_str)?;
    let buffer = std::io::BufWriter::new(file);

    serde_cbor::to_writer(buffer, &value)?;
    std::fs::rename(&temp_str, &path_str)?;
    Ok(())
}

#[cfg(not(feature = "serde_cbor"))]
pub fn write_cbor<T: Serialize>(_: &T, path_str: &str) -> Result<(), Error> {
    println!("skip writing {} (serde_cbor is not enabled)", path_str);
    Ok(())
}

#[cfg(feature = "serde_cbor")]
pub fn read_cbor<T: for<'de> Deserialize<'de>>(path_str: &str) -> Result<T, Error> {
    let file = std::fs::File::open(path_str)?;
    let mut buffer = std::io::BufReader::new(file);
    let mut bytes = Vec::new();
    buffer.read_to_end(&mut bytes)?;

    #[cfg(feature = "snap")]
    {
        if bytes.starts_with(&SNAPPY_STREAM_IDENTIFIER) {
            let mut decoder = snap::read::FrameDecoder::new(&bytes[..]);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            return Ok(serde_cbor::from_slice(&decompressed)?)
        }
    }

    #[cfg(not(feature = "snap"))]
    {
        if bytes.starts_with(&[0xff, 0x06, 0x00, 0x00]) {
            return Err(Error::CannotReadSnappy)
        }
    }

    Ok(serde_cbor::from_slice(&bytes)?)
}

#[cfg(not(feature = "serde_cbor"))]
pub fn read_cbor<T: for<'de> Deserialize<'de>>(path_str: &str) -> Result<T, Error> {
    Err(Error::SerdeCborNotEnabled(path_str.to_string()))
}




/**
 * Read the single ASCII header line at the top of a grid or snapshot file.
 * Returns the whitespace-separated tokens parsed as floats, together with the
 * byte offset where the binary payload begins (one past the first newline).
 */
pub fn read_header_line(path_str: &str) -> Result<(Vec<f64>, usize), Error> {
    let file = std::fs::File::open(path_str)?;
    let mut reader = std::io::BufReader::new(file);
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = reader.read(&mut byte)?;
        if n == 0 || byte[0] == b'\n' {
            break
        }
        line.push(byte[0]);
    }
    let offset = line.len() + 1;
    let text = String::from_utf8_lossy(&line);
    let mut tokens = Vec::new();

    for token in text.split_whitespace() {
        match token.parse::<f64>() {
            Ok(value) => tokens.push(value),
            Err(_) => return Err(Error::HeaderToken {
                path: path_str.to_string(),
                token: token.to_string(),
            }),
        }
    }
    Ok((tokens, offset))
}


/**
 * Map the binary payload following the header and return it as a vector of
 * f32 values (the snapshot payload encoding; little-endian).
 */
pub fn read_f32_payload(path_str: &str, offset: usize) -> Result<Vec<f32>, Error> {
    let bytes = map_payload(path_str, offset, 4)?;
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}


/**
 * Same as [`read_f32_payload`], for the f64-encoded grid payload.
 */
pub fn read_f64_payload(path_str: &str, offset: usize) -> Result<Vec<f64>, Error> {
    let bytes = map_payload(path_str, offset, 8)?;
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

fn map_payload(path_str: &str, offset: usize, value_size: usize) -> Result<Vec<u8>, Error> {
    let file = std::fs::File::open(path_str)?;
    let mmap = unsafe { memmap2::Mmap::map(&file)? };

    if mmap.len() < offset || (mmap.len() - offset) % value_size != 0 {
        return Err(Error::PayloadAlignment {
            path: path_str.to_string(),
            expected: value_size,
            actual: mmap.len().saturating_sub(offset),
        })
    }
    Ok(mmap[offset..].to_vec())
}




/**
 * The ASCII header shared by the grid and snapshot formats: time, the three
 * grid dimensions, the internal cell sizes, the polytropic index, the spin
 * parameter, and the inner/outer boundary radii. Eleven positional tokens.
 */
#[derive(Clone, Debug)]
pub struct FileHeader {
    pub time: f64,
    pub dims: [usize; 3],
    pub cell_size: [f64; 3],
    pub gamma_law: f64,
    pub spin: f64,
    pub r_inner: f64,
    pub r_outer: f64,
}

pub static HEADER_TOKEN_COUNT: usize = 11;

impl FileHeader {
    pub fn parse(tokens: &[f64], path_str: &str) -> Result<Self, Error> {
        if tokens.len() != HEADER_TOKEN_COUNT {
            return Err(Error::HeaderTokenCount {
                path: path_str.to_string(),
                expected: HEADER_TOKEN_COUNT,
                actual: tokens.len(),
            })
        }
        Ok(Self {
            time: tokens[0],
            dims: [tokens[1] as usize, tokens[2] as usize, tokens[3] as usize],
            cell_size: [tokens[4], tokens[5], tokens[6]],
            gamma_law: tokens[7],
            spin: tokens[8],
            r_inner: tokens[9],
            r_outer: tokens[10],
        })
    }

    pub fn num_cells(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }
}




/**
 * Reshape a flat payload into [field, axis1, axis2, axis3]. The file is
 * field-major: one full grid block per field, and within each block axis 1
 * varies fastest (Fortran order). The result is in standard layout.
 */
pub fn reshape_field_major(flat: Vec<f64>, num_fields: usize, dims: [usize; 3]) -> Array4<f64> {
    let fortran = Array4::from_shape_vec((num_fields, dims[2], dims[1], dims[0]), flat)
        .expect("payload length was checked against the header dimensions");
    let view = fortran.permuted_axes([0, 3, 2, 1]);
    let mut out = Array4::zeros(view.raw_dim());
    out.assign(&view);
    out
}


/**
 * Inverse of [`reshape_field_major`]: flatten an array back into the on-disk
 * order. Used when writing synthetic fixtures.
 */
pub fn flatten_field_major(data: &ndarray::ArrayView<f64, Ix4>) -> Vec<f64> {
    let (nf, n1, n2, n3) = data.dim();
    let mut flat = Vec::with_capacity(nf * n1 * n2 * n3);

    for f in 0..nf {
        for k in 0..n3 {
            for j in 0..n2 {
                for i in 0..n1 {
                    flat.push(data[[f, i, j, k]]);
                }
            }
        }
    }
    flat
}




// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_file(name: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("diskdiag_io_{}_{}", std::process::id(), name));
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn header_line_parses_and_reports_payload_offset() {
        let path = scratch_file("header.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "10.5 8 4 2\n").unwrap();
        file.write_all(&1.0f32.to_le_bytes()).unwrap();
        drop(file);

        let (tokens, offset) = read_header_line(&path).unwrap();
        assert_eq!(tokens, vec![10.5, 8.0, 4.0, 2.0]);

        let payload = read_f32_payload(&path, offset).unwrap();
        assert_eq!(payload, vec![1.0]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn malformed_header_token_is_an_error() {
        let path = scratch_file("badheader.bin");
        std::fs::write(&path, "1.0 two 3\n").unwrap();
        assert!(matches!(read_header_line(&path), Err(Error::HeaderToken{..})));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn ragged_payload_is_an_error() {
        let path = scratch_file("ragged.bin");
        std::fs::write(&path, b"1.0\n\x00\x00\x00").unwrap();
        assert!(matches!(read_f32_payload(&path, 4), Err(Error::PayloadAlignment{..})));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn field_major_reshape_puts_axis1_fastest() {
        // two fields on a 2x2x1 grid; axis 1 varies fastest on disk
        let flat = vec![
            0.0, 1.0, 2.0, 3.0, // field 0: (i=0,j=0) (i=1,j=0) (i=0,j=1) (i=1,j=1)
            4.0, 5.0, 6.0, 7.0, // field 1
        ];
        let data = reshape_field_major(flat.clone(), 2, [2, 2, 1]);
        assert_eq!(data[[0, 1, 0, 0]], 1.0);
        assert_eq!(data[[0, 0, 1, 0]], 2.0);
        assert_eq!(data[[1, 1, 1, 0]], 7.0);
        assert_eq!(flatten_field_major(&data.view()), flat);
    }

    #[test]
    fn header_parse_rejects_wrong_token_count() {
        let tokens = vec![0.0; 10];
        assert!(matches!(
            FileHeader::parse(&tokens, "x"),
            Err(Error::HeaderTokenCount{expected: 11, actual: 10, ..})
        ));
    }

    #[cfg(feature = "serde_cbor")]
    #[test]
    fn cbor_round_trip_preserves_value() {
        let path = scratch_file("roundtrip.cbor");
        let value: Vec<f64> = vec![1.0, 2.5, -3.0];
        write_cbor(&value, &path).unwrap();
        let loaded: Vec<f64> = read_cbor(&path).unwrap();
        assert_eq!(value, loaded);
        std::fs::remove_file(&path).unwrap();
    }
}
