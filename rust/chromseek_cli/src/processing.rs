use chromseek::models::{
    ChromatogramPeakFeature,
    MatchResultContainer,
};
use chromseek::pipeline::{
    ProgressEvent,
    StageTimings,
};
use chromseek::{
    BatchOutcome,
    BatchResult,
    CancellationToken,
    FileResult,
    Libraries,
    ProcessingParameters,
    RawFilePaths,
    ReferenceLibrary,
    RunContext,
    process_batch,
    read_msp_library,
    read_text_library,
    write_msdec_store,
};
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use serde::Serialize;
use std::path::{
    Path,
    PathBuf,
};
use std::time::Instant;
use tracing::info;

use super::config::{
    InputConfig,
    OutputConfig,
};
use crate::errors::CliError;

pub fn load_libraries(input: &InputConfig) -> Result<Libraries, CliError> {
    let spectral = match &input.msp_library {
        Some(path) => read_msp_library(path)?,
        None => ReferenceLibrary::default(),
    };
    let text = match &input.text_library {
        Some(path) => read_text_library(path)?,
        None => ReferenceLibrary::default(),
    };
    info!(
        "Loaded libraries: {} spectral entries, {} text entries",
        spectral.len(),
        text.len()
    );
    Ok(Libraries { spectral, text })
}

/// Per file output next to the MSDec store.
#[derive(Serialize)]
struct FileReport<'a> {
    file_name: &'a str,
    features: &'a [ChromatogramPeakFeature],
    matches: &'a [MatchResultContainer],
    timings: StageTimings,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    files: Vec<&'a str>,
    failed_files: &'a [String],
    num_alignment_spots: usize,
    timings: StageTimings,
}

fn file_stem(file: &FileResult) -> String {
    Path::new(&file.file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("file_{}", file.file_id))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CliError> {
    let file = std::fs::File::create(path).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    Ok(())
}

fn write_outputs(batch: &BatchResult, output: &OutputConfig) -> Result<(), CliError> {
    for file in batch.files.iter() {
        let stem = file_stem(file);
        let store_path = output.directory.join(format!("{}.msdec", stem));
        write_msdec_store(&store_path, &file.msdec_results)?;
        write_json(
            &output.directory.join(format!("{}.features.json", stem)),
            &FileReport {
                file_name: &file.file_name,
                features: &file.features,
                matches: &file.matches,
                timings: file.timings,
            },
        )?;
        info!("Wrote results of {} to {}", file.file_name, store_path.display());
    }

    write_json(&output.directory.join("alignment.json"), &batch.alignment)?;
    write_json(
        &output.directory.join("batch.json"),
        &BatchReport {
            files: batch.files.iter().map(|f| f.file_name.as_str()).collect(),
            failed_files: &batch.failed_files,
            num_alignment_spots: batch.alignment.spots.len(),
            timings: batch.timings,
        },
    )?;
    Ok(())
}

pub fn process_raw_files(
    raw_files: Vec<PathBuf>,
    libraries: &Libraries,
    params: &ProcessingParameters,
    output: &OutputConfig,
) -> Result<(), CliError> {
    let start = Instant::now();
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {msg:>28} [{wide_bar:.cyan/blue}] {pos}/{len}",
        )
        .map_err(|e| CliError::Config {
            source: e.to_string(),
        })?,
    );
    let names: Vec<String> = raw_files
        .iter()
        .map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default())
        .collect();
    // `event.file` is the alignment slot, not the position in `raw_files`.
    let on_progress = |event: ProgressEvent| {
        bar.set_length(event.total as u64);
        bar.set_position(event.done as u64);
        bar.set_message(format!("{:?} (file {})", event.stage, event.file));
    };

    let token = CancellationToken::new();
    let ctx = RunContext::new(&token).with_progress(&on_progress);
    info!("Processing {} raw files: {:?}", raw_files.len(), names);
    let outcome = process_batch(&RawFilePaths(raw_files), params, libraries, &ctx)?;
    bar.finish_and_clear();

    let batch = match outcome {
        BatchOutcome::Completed(batch) => batch,
        BatchOutcome::Cancelled => return Err(CliError::Cancelled),
    };
    write_outputs(&batch, output)?;
    println!(
        "Processed {} files ({} failed), {} alignment spots",
        batch.files.len(),
        batch.failed_files.len(),
        batch.alignment.spots.len()
    );
    println!("Finished in {:?}", start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromquery::serde::{
        RawDataFormat,
        write_raw_spectra,
    };
    use chromquery::{
        RawSpectrum,
        SpectrumPeak,
    };

    #[test]
    fn test_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("sample.ndjson");
        let spectra: Vec<RawSpectrum> = (0..=100)
            .map(|i| {
                let rt = 4.5 + i as f64 * 0.01;
                RawSpectrum {
                    index: i,
                    rt_minutes: rt,
                    drift_time: None,
                    ms_level: 1,
                    precursor: None,
                    peaks: vec![SpectrumPeak::new(
                        300.1,
                        1000.0 * (-0.5 * ((rt - 5.0) / 0.03f64).powi(2)).exp() + 1.0,
                    )],
                }
            })
            .collect();
        write_raw_spectra(&raw, &spectra, RawDataFormat::NdJson).unwrap();
        let output = OutputConfig {
            directory: dir.path().join("out"),
        };
        std::fs::create_dir_all(&output.directory).unwrap();

        process_raw_files(
            vec![raw],
            &Libraries::default(),
            &ProcessingParameters::default(),
            &output,
        )
        .unwrap();

        assert!(output.directory.join("sample.ndjson.msdec").exists());
        assert!(output.directory.join("sample.ndjson.features.json").exists());
        let alignment: chromseek::AlignmentResult = serde_json::from_reader(
            std::fs::File::open(output.directory.join("alignment.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(alignment.file_names, vec!["sample.ndjson"]);
    }
}
