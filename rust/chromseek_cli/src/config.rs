use chromseek::ProcessingParameters;
use serde::{
    Deserialize,
    Serialize,
};
use std::path::{
    Path,
    PathBuf,
};

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub analysis: ProcessingParameters,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct InputConfig {
    /// Alignment slot order follows this list.
    #[serde(default)]
    pub raw_files: Vec<PathBuf>,
    pub msp_library: Option<PathBuf>,
    pub text_library: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let file = std::fs::File::open(path).map_err(|e| CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        })?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Command line values take precedence over the file.
    pub fn with_cli_args(mut self, args: &Cli) -> Self {
        let input = self.input.get_or_insert_with(InputConfig::default);
        if let Some(raw_files) = &args.raw_files {
            input.raw_files = raw_files.clone();
        }
        if let Some(msp) = &args.msp_library {
            input.msp_library = Some(msp.clone());
        }
        if let Some(text) = &args.text_library {
            input.text_library = Some(text.clone());
        }
        if let Some(output_dir) = &args.output_dir {
            self.output = Some(OutputConfig {
                directory: output_dir.clone(),
            });
        }
        if let Some(num_threads) = args.num_threads {
            self.analysis.num_threads = num_threads;
        }
        self
    }

    /// Checks that there is something to process and somewhere to write it.
    pub fn validated(self) -> Result<(InputConfig, ProcessingParameters, OutputConfig), CliError> {
        let input = match self.input {
            Some(x) if !x.raw_files.is_empty() => x,
            _ => {
                return Err(CliError::Config {
                    source: "No raw files provided, please provide them in either the config file or with the --raw-files flag".to_string(),
                });
            }
        };
        let output = self.output.ok_or_else(|| CliError::Config {
            source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
        })?;
        Ok((input, self.analysis, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const SAMPLE: &str = r#"{
        "input": {
            "raw_files": ["a.ndjson", "b.ndjson"],
            "msp_library": "lib.msp"
        },
        "analysis": {
            "peak_picking": {"mass_slice_width": 0.05},
            "num_threads": 4
        },
        "output": {"directory": "out"}
    }"#;

    #[test]
    fn test_cli_overrides_config() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        let args = Cli::parse_from([
            "chromseek",
            "--config",
            "x.json",
            "--raw-files",
            "c.ndjson",
            "d.ndjson",
            "e.ndjson",
            "--num-threads",
            "2",
        ]);
        let (input, params, output) = config.with_cli_args(&args).validated().unwrap();
        assert_eq!(input.raw_files.len(), 3);
        assert_eq!(input.msp_library, Some(PathBuf::from("lib.msp")));
        assert_eq!(input.text_library, None);
        assert_eq!(params.num_threads, 2);
        assert_eq!(params.peak_picking.mass_slice_width, 0.05);
        assert_eq!(output.directory, PathBuf::from("out"));
    }

    #[test]
    fn test_sample_config_parses() {
        let config: Config = serde_json::from_str(include_str!("../config.sample.json")).unwrap();
        let (input, params, _) = config.validated().unwrap();
        assert_eq!(input.raw_files.len(), 3);
        assert_eq!(params.alignment.rt_tolerance, 0.05);
        assert_eq!(params.peak_picking.smoothing_level, 3);
    }

    #[test]
    fn test_missing_sections() {
        let config: Config = serde_json::from_str(r#"{"output": {"directory": "out"}}"#).unwrap();
        assert!(matches!(config.validated(), Err(CliError::Config { .. })));

        let config: Config = serde_json::from_str(r#"{"input": {"raw_files": ["a.ndjson"]}}"#).unwrap();
        assert!(matches!(config.validated(), Err(CliError::Config { .. })));
    }
}
