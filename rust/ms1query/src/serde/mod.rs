use crate::errors::DataReadingError;
use crate::models::peak::Peak;
use crate::models::spectrum::{
    IsolationWindow,
    Spectrum,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Read,
    Write,
};
use std::path::Path;
use tracing::info;
use zstd::stream::read::Decoder;
use zstd::stream::write::Encoder;

/// On-disk layout of a run: peaks are stored as `[mz, intensity]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerRun {
    pub spectra: Vec<SerSpectrum>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerSpectrum {
    scan_number: u32,
    #[serde(default = "default_ms_level")]
    ms_level: u8,
    peaks: Vec<(f64, f64)>,
    #[serde(default)]
    isolation_window: Option<IsolationWindow>,
}

fn default_ms_level() -> u8 {
    1
}

impl From<SerSpectrum> for Spectrum {
    fn from(x: SerSpectrum) -> Self {
        Spectrum {
            scan_number: x.scan_number,
            ms_level: x.ms_level,
            peaks: x.peaks.into_iter().map(Peak::from).collect(),
            isolation_window: x.isolation_window,
        }
    }
}

impl From<&Spectrum> for SerSpectrum {
    fn from(x: &Spectrum) -> Self {
        SerSpectrum {
            scan_number: x.scan_number,
            ms_level: x.ms_level,
            peaks: x.peaks.iter().map(|p| (p.mz, p.intensity)).collect(),
            isolation_window: x.isolation_window,
        }
    }
}

fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> DataReadingError + '_ {
    move |source| DataReadingError::Io {
        source,
        path: Some(path.to_path_buf()),
    }
}

/// Read spectra from a JSON run file, zstd-decoding `*.zst` files.
pub fn read_spectra(path: impl AsRef<Path>) -> Result<Vec<Spectrum>, DataReadingError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;
    let reader: Box<dyn Read> = if is_zstd(path) {
        Box::new(Decoder::new(file).map_err(io_error(path))?)
    } else {
        Box::new(BufReader::new(file))
    };
    let run: SerRun = serde_json::from_reader(reader)?;
    info!(
        "Read {} spectra from {}",
        run.spectra.len(),
        path.display()
    );
    Ok(run.spectra.into_iter().map(Spectrum::from).collect())
}

/// Write spectra as a JSON run file, zstd-compressing `*.zst` files.
pub fn write_spectra(path: impl AsRef<Path>, spectra: &[Spectrum]) -> Result<(), DataReadingError> {
    let path = path.as_ref();
    let run = SerRun {
        spectra: spectra.iter().map(SerSpectrum::from).collect(),
    };
    let file = File::create(path).map_err(io_error(path))?;
    if is_zstd(path) {
        let mut encoder = Encoder::new(file, 3).map_err(io_error(path))?;
        serde_json::to_writer(&mut encoder, &run)?;
        encoder.finish().map_err(io_error(path))?;
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &run)?;
        writer.flush().map_err(io_error(path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_layout() {
        let data = r#"{"spectra": [
            {"scan_number": 3, "peaks": [[500.0, 10.0], [501.0, 2.0]]},
            {"scan_number": 4, "ms_level": 2, "peaks": [],
             "isolation_window": {"target_mz": 500.5, "lower_offset": 1.0, "upper_offset": 1.0}}
        ]}"#;
        let run: SerRun = serde_json::from_str(data).unwrap();
        let spectra: Vec<Spectrum> = run.spectra.into_iter().map(Spectrum::from).collect();
        assert_eq!(spectra[0].ms_level, 1);
        assert_eq!(spectra[0].peaks[1], Peak::new(501.0, 2.0));
        assert!(spectra[1].isolation_window.unwrap().contains(501.2));
    }
}
