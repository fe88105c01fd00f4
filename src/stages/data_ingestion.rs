//! Stage 01: download the dataset archive and extract its images

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DataIngestionConfig;
use crate::utils::common::get_size;
use crate::utils::error::Result;
use crate::utils::http::{download_to_file, validate_source_url};

/// Counts of what one extraction pass did with the archive entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Entries written to disk by this pass
    pub extracted: usize,
    /// Entries whose target file already existed
    pub already_present: usize,
    /// Entries without an image extension, or with an unsafe path
    pub filtered: usize,
}

pub struct DataIngestion {
    config: DataIngestionConfig,
}

impl DataIngestion {
    pub fn new(config: DataIngestionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataIngestionConfig {
        &self.config
    }

    /// Fetch `source_url` into `local_data_file`, overwriting any previous download
    pub fn download_file(&self) -> Result<()> {
        let url = validate_source_url(&self.config.source_url)?;
        info!(
            "Downloading {} into {}",
            url,
            self.config.local_data_file.display()
        );

        let bytes = download_to_file(&url, &self.config.local_data_file)?;
        info!(
            "{} downloaded with size: {} ({} bytes)",
            self.config.local_data_file.display(),
            get_size(&self.config.local_data_file)?,
            bytes
        );
        Ok(())
    }

    fn is_wanted(&self, name: &str) -> bool {
        self.config
            .image_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }

    /// Extract image entries of the archive into `unzip_dir`
    ///
    /// Entries whose target already exists are left untouched, so running
    /// this twice leaves the same files as running it once.
    pub fn unzip_and_clean(&self) -> Result<ExtractionSummary> {
        let file = File::open(&self.config.local_data_file)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
        fs::create_dir_all(&self.config.unzip_dir)?;

        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let mut summary = ExtractionSummary::default();
        let wanted: Vec<String> = names
            .into_iter()
            .filter(|name| {
                let keep = self.is_wanted(name);
                if !keep {
                    summary.filtered += 1;
                }
                keep
            })
            .collect();

        let pb = ProgressBar::new(wanted.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );

        for name in &wanted {
            pb.inc(1);
            let mut entry = archive.by_name(name)?;
            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping archive entry with unsafe path: {}", name);
                summary.filtered += 1;
                continue;
            };
            let target = self.config.unzip_dir.join(relative);

            if target.exists() {
                summary.already_present += 1;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut writer = BufWriter::new(File::create(&target)?);
            let copied = io::copy(&mut entry, &mut writer).and_then(|_| writer.flush());
            if let Err(e) = copied {
                drop(writer);
                let _ = fs::remove_file(&target);
                return Err(e.into());
            }
            summary.extracted += 1;
        }
        pb.finish_and_clear();

        info!(
            "Extracted {} files into {} ({} already present, {} filtered)",
            summary.extracted,
            self.config.unzip_dir.display(),
            summary.already_present,
            summary.filtered
        );
        Ok(summary)
    }
}
