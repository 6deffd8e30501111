//! Fixtures shared by unit tests: scratch directories, synthetic MAT files,
//! zip bundles and an in-memory transport.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use crate::data::fetch::Transport;
use crate::{Result, SvhnError};

/// Fresh, empty directory under the system temp dir
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("svhn-test-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Real part of a MAT variable
pub(crate) enum MatData<'a> {
    UInt8(&'a [u8]),
    Double(&'a [f64]),
}

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;
const MX_UINT8_CLASS: u32 = 9;

fn push_element(buf: &mut Vec<u8>, data_type: u32, payload: &[u8]) {
    buf.extend_from_slice(&data_type.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}

/// Write an uncompressed little-endian MATLAB v5 file
pub(crate) fn write_mat(path: &Path, variables: &[(&str, &[usize], MatData<'_>)]) {
    let mut text = b"MATLAB 5.0 MAT-file, written by svhn unit tests".to_vec();
    text.resize(116, b' ');

    let mut file = text;
    file.extend_from_slice(&[0u8; 8]);
    file.extend_from_slice(&0x0100u16.to_le_bytes());
    file.extend_from_slice(b"IM");

    for (name, dims, data) in variables {
        let mut matrix = Vec::new();

        let class = match data {
            MatData::UInt8(_) => MX_UINT8_CLASS,
            MatData::Double(_) => MX_DOUBLE_CLASS,
        };
        let mut flags = class.to_le_bytes().to_vec();
        flags.extend_from_slice(&0u32.to_le_bytes());
        push_element(&mut matrix, MI_UINT32, &flags);

        let dim_bytes: Vec<u8> = dims
            .iter()
            .flat_map(|d| (*d as i32).to_le_bytes())
            .collect();
        push_element(&mut matrix, MI_INT32, &dim_bytes);
        push_element(&mut matrix, MI_INT8, name.as_bytes());

        match data {
            MatData::UInt8(values) => push_element(&mut matrix, MI_UINT8, values),
            MatData::Double(values) => {
                let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                push_element(&mut matrix, MI_DOUBLE, &bytes);
            }
        }

        push_element(&mut file, MI_MATRIX, &matrix);
    }

    std::fs::write(path, file).unwrap();
}

/// Write a small SVHN-style file: `X` is `[h, w, c, n]` uint8, `y` is
/// `[n, 1]` double with labels cycling through 1..=10.
///
/// Pixel values encode their position so layout bugs show up in asserts.
pub(crate) fn write_svhn_mat(path: &Path, n: usize, h: usize, w: usize, c: usize) {
    let mut pixels = vec![0u8; h * w * c * n];
    for s in 0..n {
        for ch in 0..c {
            for col in 0..w {
                for row in 0..h {
                    // column-major: row varies fastest
                    let idx = row + h * (col + w * (ch + c * s));
                    pixels[idx] = ((s * 7 + row * 3 + col * 5 + ch * 11) % 256) as u8;
                }
            }
        }
    }
    let labels: Vec<f64> = (0..n).map(|s| (s % 10 + 1) as f64).collect();

    write_mat(
        path,
        &[
            ("X", &[h, w, c, n], MatData::UInt8(&pixels)),
            ("y", &[n, 1], MatData::Double(&labels)),
        ],
    );
}

/// Zip archive held in memory
pub(crate) fn zip_bundle(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Transport answering from a fixed URL → body map, recording every request
#[derive(Default)]
pub(crate) struct MapTransport {
    responses: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl MapTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), body);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Transport for MapTransport {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        self.requests.borrow_mut().push(url.to_string());
        match self.responses.get(url) {
            Some(body) => {
                sink.write_all(body)?;
                Ok(body.len() as u64)
            }
            None => Err(SvhnError::Network {
                url: url.to_string(),
                message: "server returned 404 Not Found".to_string(),
            }),
        }
    }
}
