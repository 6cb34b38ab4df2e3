//! Processing backend abstraction
//!
//! Every numerical operation of the pipeline is an opaque call with a file
//! contract: inputs are read from the given paths, the output is written to
//! the given path, nothing else is touched. The production implementation
//! runs OpenMS command line tools ([`super::ToppBackend`]); tests plug in an
//! in-process fake.

use std::path::{Path, PathBuf};

use super::{BackendResult, StageConfig};
use crate::consensus::{LinkParams, link_feature_maps};

/// External processing operations
pub trait ProcessingBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Detect features of one run
    fn detect_features(&self, run: &Path, output: &Path, config: &StageConfig)
    -> BackendResult<()>;

    /// Align feature maps to a common reference.
    ///
    /// Writes one aligned map and one transformation per input, in order.
    fn align_maps(
        &self,
        maps: &[PathBuf],
        aligned: &[PathBuf],
        transformations: &[PathBuf],
        config: &StageConfig,
    ) -> BackendResult<()>;

    /// Apply a previously computed transformation to a raw run
    fn apply_transformation(
        &self,
        run: &Path,
        transformation: &Path,
        output: &Path,
    ) -> BackendResult<()>;

    /// Group adducts of one feature map
    fn decharge(&self, map: &Path, output: &Path, config: &StageConfig) -> BackendResult<()>;

    /// Attach MS2 spectra of a run to its features
    fn map_identifications(&self, run: &Path, map: &Path, output: &Path) -> BackendResult<()>;

    /// Link feature maps into one consensus map.
    ///
    /// The default links in process by nearest neighbour.
    fn link_features(
        &self,
        maps: &[PathBuf],
        output: &Path,
        config: &StageConfig,
    ) -> BackendResult<()> {
        let params = LinkParams::from_config(config)?;
        link_feature_maps(maps, output, &params)
    }

    /// Targeted extraction of library compounds from one run
    fn requantify(
        &self,
        run: &Path,
        library: &Path,
        output: &Path,
        config: &StageConfig,
    ) -> BackendResult<()>;

    /// Write SIRIUS input files, one per run, into `output_dir`
    fn export_sirius(
        &self,
        runs: &[PathBuf],
        maps: &[PathBuf],
        output_dir: &Path,
    ) -> BackendResult<()>;

    /// Write GNPS feature based molecular networking files into `output_dir`
    fn export_gnps(&self, consensus: &Path, runs: &[PathBuf], output_dir: &Path)
    -> BackendResult<()>;
}
