use sift_flow::{Feature, FeatureSet, FlowField, ParameterRecord};
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Tag opening every Middlebury `.flo` file.
pub const FLO_TAG: f32 = 202021.25;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: expected two coordinates, found {found:?}")]
    FeatureLine { line: usize, found: String },
    #[error("parameter file: {0}")]
    Parameters(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Parse 1-based `x y` pairs, one per line, separated by whitespace or a
/// comma. Blank lines and everything after `#` are ignored.
pub fn parse_features(text: &str) -> Result<FeatureSet, CliError> {
    let mut features = vec![];
    for (index, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        let fields: Vec<&str> = content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .collect();
        let bad_line = || CliError::FeatureLine {
            line: index + 1,
            found: content.to_owned(),
        };
        match fields[..] {
            [x, y] => {
                let x: f32 = x.parse().map_err(|_| bad_line())?;
                let y: f32 = y.parse().map_err(|_| bad_line())?;
                features.push(Feature::from_one_based(x, y));
            }
            _ => return Err(bad_line()),
        }
    }
    Ok(FeatureSet::new(features))
}

pub fn read_features(path: &Path) -> Result<FeatureSet, CliError> {
    let text = std::fs::read_to_string(path).map_err(io_error(path))?;
    parse_features(&text)
}

/// Read a complete parameter record. Every one of the nine fields must be
/// present and no other field is accepted.
pub fn read_parameters(reader: impl Read) -> Result<ParameterRecord, CliError> {
    Ok(serde_json::from_reader(reader)?)
}

pub fn read_parameters_path(path: &Path) -> Result<ParameterRecord, CliError> {
    let file = std::fs::File::open(path).map_err(io_error(path))?;
    read_parameters(io::BufReader::new(file))
}

/// Write `flow` in the Middlebury `.flo` layout: tag, width, height, then
/// `(vx, vy)` per pixel in row-major order, all little endian.
pub fn write_flo(mut writer: impl Write, flow: &FlowField) -> io::Result<()> {
    writer.write_all(&FLO_TAG.to_le_bytes())?;
    writer.write_all(&(flow.width() as u32).to_le_bytes())?;
    writer.write_all(&(flow.height() as u32).to_le_bytes())?;
    for value in flow.interleaved() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()
}

pub fn write_flo_path(path: &Path, flow: &FlowField) -> Result<(), CliError> {
    std::fs::File::create(path)
        .map(io::BufWriter::new)
        .and_then(|file| write_flo(file, flow))
        .map_err(io_error(path))
}
