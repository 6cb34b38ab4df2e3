//! OpenMS command line tool backend
//!
//! Each operation maps to one TOPP tool invocation. Stage parameters are
//! passed as `-<section>:<key> <value>` arguments; list values expand to
//! several arguments after one flag.

use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BackendError, BackendResult, ProcessingBackend, StageConfig};
use crate::consensus::{LinkParams, link_feature_maps};

const EMPTY_ID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<IdXML version="1.5" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
</IdXML>
"#;

/// Settings of the tool backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory holding the TOPP executables; PATH lookup when unset
    pub bin_dir: Option<PathBuf>,
    /// Kill a tool after this many seconds
    pub timeout_secs: Option<u64>,
    /// Value for each tool's `-threads` option
    pub threads: Option<usize>,
    /// Link features in process instead of calling the KD linker
    pub native_linking: bool,
}

/// Backend running OpenMS TOPP executables
#[derive(Debug, Clone, Default)]
pub struct ToppBackend {
    config: ToolsConfig,
}

impl ToppBackend {
    pub fn new(config: ToolsConfig) -> Self {
        Self { config }
    }

    fn call(&self, tool: &'static str) -> ToolCall {
        let mut call = ToolCall::new(tool);
        if let Some(threads) = self.config.threads {
            call = call.arg("-threads", threads.to_string());
        }
        call
    }

    fn executable(&self, tool: &str) -> PathBuf {
        match &self.config.bin_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        }
    }

    /// Run a tool and verify its outputs exist
    fn run(&self, call: ToolCall, outputs: &[&Path]) -> BackendResult<()> {
        let program = self.executable(call.tool);
        debug!(tool = call.tool, args = ?call.args, "Running tool");

        let mut child = Command::new(&program)
            .args(&call.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::ToolNotFound {
                tool: call.tool.to_string(),
                source: e,
            })?;

        // Drain stderr on a separate thread so a chatty tool never blocks
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let status = match self.config.timeout_secs {
            Some(seconds) => {
                let limit = Duration::from_secs(seconds);
                let start = Instant::now();
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if start.elapsed() >= limit {
                        warn!(tool = call.tool, seconds, "Tool timed out, killing it");
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(BackendError::Timeout {
                            tool: call.tool.to_string(),
                            seconds,
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
            None => child.wait()?,
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(BackendError::ToolFailed {
                tool: call.tool.to_string(),
                exit_code: status.code(),
                stderr: last_lines(&stderr, 20),
            });
        }

        for output in outputs {
            if !output.exists() {
                return Err(BackendError::MissingOutput(output.to_path_buf()));
            }
        }
        Ok(())
    }
}

impl ProcessingBackend for ToppBackend {
    fn name(&self) -> &str {
        "openms"
    }

    fn detect_features(
        &self,
        run: &Path,
        output: &Path,
        config: &StageConfig,
    ) -> BackendResult<()> {
        let call = self
            .call("FeatureFinderMetabo")
            .arg("-in", run)
            .arg("-out", output)
            .params(
                "algorithm:",
                config,
                &[
                    ("noise_threshold_int", "common:noise_threshold_int"),
                    ("mass_error_ppm", "mtd:mass_error_ppm"),
                    ("remove_single_traces", "ffm:remove_single_traces"),
                ],
            );
        self.run(call, &[output])
    }

    fn align_maps(
        &self,
        maps: &[PathBuf],
        aligned: &[PathBuf],
        transformations: &[PathBuf],
        config: &StageConfig,
    ) -> BackendResult<()> {
        if maps.len() != aligned.len() || maps.len() != transformations.len() {
            return Err(BackendError::invalid_param(
                "in",
                "alignment needs one output and one transformation per map",
            ));
        }
        let call = self
            .call("MapAlignerPoseClustering")
            .paths("-in", maps)
            .paths("-out", aligned)
            .paths("-trafo_out", transformations)
            .params("algorithm:", config, &[]);
        let outputs: Vec<&Path> = aligned
            .iter()
            .chain(transformations)
            .map(PathBuf::as_path)
            .collect();
        self.run(call, &outputs)
    }

    fn apply_transformation(
        &self,
        run: &Path,
        transformation: &Path,
        output: &Path,
    ) -> BackendResult<()> {
        let call = self
            .call("MapRTTransformer")
            .arg("-in", run)
            .arg("-trafo_in", transformation)
            .arg("-out", output);
        self.run(call, &[output])
    }

    fn decharge(&self, map: &Path, output: &Path, config: &StageConfig) -> BackendResult<()> {
        let call = self
            .call("MetaboliteAdductDecharger")
            .arg("-in", map)
            .arg("-out_fm", output)
            .params("algorithm:MetaboliteFeatureDeconvolution:", config, &[]);
        self.run(call, &[output])
    }

    fn map_identifications(&self, run: &Path, map: &Path, output: &Path) -> BackendResult<()> {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let id_file = output.with_file_name(format!(".{stem}.empty.idXML"));
        std::fs::write(&id_file, EMPTY_ID_XML)?;

        let call = self
            .call("IDMapper")
            .arg("-id", &id_file)
            .arg("-in", map)
            .arg("-spectra:in", run)
            .arg("-out", output);
        let result = self.run(call, &[output]);
        let _ = std::fs::remove_file(&id_file);
        result
    }

    fn link_features(
        &self,
        maps: &[PathBuf],
        output: &Path,
        config: &StageConfig,
    ) -> BackendResult<()> {
        if self.config.native_linking {
            return link_feature_maps(maps, output, &LinkParams::from_config(config)?);
        }
        let call = self
            .call("FeatureLinkerUnlabeledKD")
            .paths("-in", maps)
            .arg("-out", output)
            .params("algorithm:", config, &[]);
        self.run(call, &[output])
    }

    fn requantify(
        &self,
        run: &Path,
        library: &Path,
        output: &Path,
        config: &StageConfig,
    ) -> BackendResult<()> {
        let call = self
            .call("FeatureFinderMetaboIdent")
            .arg("-in", run)
            .arg("-id", library)
            .arg("-out", output)
            .params("", config, &[]);
        self.run(call, &[output])
    }

    fn export_sirius(
        &self,
        runs: &[PathBuf],
        maps: &[PathBuf],
        output_dir: &Path,
    ) -> BackendResult<()> {
        for (run, map) in runs.iter().zip(maps) {
            let stem = run
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let output = output_dir.join(format!("{stem}.ms"));
            let call = self
                .call("SiriusExport")
                .arg("-in", run)
                .arg("-in_featureinfo", map)
                .arg("-out", &output)
                .flag("-feature_only");
            self.run(call, &[&output])?;
        }
        Ok(())
    }

    fn export_gnps(
        &self,
        consensus: &Path,
        runs: &[PathBuf],
        output_dir: &Path,
    ) -> BackendResult<()> {
        let mgf = output_dir.join("MS2.mgf");
        let quantification = output_dir.join("FeatureQuantificationTable.txt");
        let call = self
            .call("GNPSExport")
            .arg("-in_cm", consensus)
            .paths("-in_mzml", runs)
            .arg("-out", &mgf)
            .arg("-out_quantification", &quantification)
            .arg("-out_pairs", output_dir.join("SupplementaryPairsTable.csv"))
            .arg("-out_meta_values", output_dir.join("MetaValues.tsv"));
        self.run(call, &[&mgf, &quantification])
    }
}

/// Arguments of one tool invocation
#[derive(Debug, Clone)]
struct ToolCall {
    tool: &'static str,
    args: Vec<OsString>,
}

impl ToolCall {
    fn new(tool: &'static str) -> Self {
        Self {
            tool,
            args: Vec::new(),
        }
    }

    fn flag(mut self, name: &str) -> Self {
        self.args.push(name.into());
        self
    }

    fn arg(mut self, name: &str, value: impl AsRef<OsStr>) -> Self {
        self.args.push(name.into());
        self.args.push(value.as_ref().to_os_string());
        self
    }

    fn paths(mut self, name: &str, values: &[PathBuf]) -> Self {
        self.args.push(name.into());
        self.args
            .extend(values.iter().map(|p| p.as_os_str().to_os_string()));
        self
    }

    /// Append every parameter as `-<prefix><name> <value...>`
    fn params(mut self, prefix: &str, config: &StageConfig, renames: &[(&str, &str)]) -> Self {
        for (key, value) in config.iter() {
            let name = renames
                .iter()
                .find(|(from, _)| *from == key)
                .map(|(_, to)| *to)
                .unwrap_or(key);
            self.args.push(format!("-{prefix}{name}").into());
            self.args.extend(value.to_args().into_iter().map(OsString::from));
        }
        self
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
